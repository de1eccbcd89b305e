//! Spinner shown on stderr while an operation is polled

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::IsTerminal;
use std::time::Duration;

pub struct OperationSpinner {
    bar: ProgressBar,
    label: String,
}

impl OperationSpinner {
    /// Start spinning with "Waiting for <label>"; hidden when stderr is not a terminal
    pub fn start(label: &str) -> Self {
        let target = if std::io::stderr().is_terminal() {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };

        let bar = ProgressBar::with_draw_target(None, target);
        bar.set_style(
            ProgressStyle::default_spinner()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                .template("{spinner:.cyan} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("Waiting for {}", label));
        bar.enable_steady_tick(Duration::from_millis(80));

        Self {
            bar,
            label: label.to_string(),
        }
    }

    /// Show the poll count next to the label
    pub fn attempt(&self, attempt: u32, max_attempts: u32) {
        self.bar.set_message(format!(
            "Waiting for {} [{}/{}]",
            self.label, attempt, max_attempts
        ));
    }

    pub fn succeed(self) {
        let message = format!("{} completed", self.label);
        self.finish("{prefix:.green} {msg}", "✓", message);
    }

    pub fn fail(self, outcome: &str) {
        let message = format!("{} {}", self.label, outcome);
        self.finish("{prefix:.red} {msg}", "✗", message);
    }

    fn finish(self, template: &str, symbol: &'static str, message: String) {
        self.bar.set_style(
            ProgressStyle::default_spinner()
                .template(template)
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        self.bar.set_prefix(symbol);
        self.bar.finish_with_message(message);
    }

    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}
