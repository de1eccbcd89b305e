//! Command usage telemetry
//!
//! Events are structured `tracing` records under the `m365::telemetry` target.
//! Nothing leaves the machine; a subscriber decides where they end up.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::debug;

/// Option usage reported by a command, e.g. `{"id": true, "force": false}`
pub type TelemetryProperties = BTreeMap<String, Value>;

fn session_id() -> &'static str {
    static SESSION: OnceLock<String> = OnceLock::new();
    SESSION.get_or_init(|| uuid::Uuid::new_v4().to_string())
}

/// Record that a command ran with the given option usage
pub fn track(command: &str, mut properties: TelemetryProperties, disabled: bool) {
    if disabled {
        return;
    }

    properties
        .entry("session".to_string())
        .or_insert_with(|| Value::String(session_id().to_string()));

    let properties = serde_json::to_string(&properties).unwrap_or_default();
    debug!(target: "m365::telemetry", command, properties = %properties, "command executed");
}

/// Helper for the common "was this option passed" property
pub fn used<T>(option: &Option<T>) -> Value {
    Value::Bool(option.is_some())
}

/// Collects formatted `tracing` output in memory so tests can assert on emitted events
#[cfg(test)]
pub(crate) mod capture {
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tracing::Subscriber;

    #[derive(Clone, Default)]
    pub struct Events(Arc<Mutex<Vec<u8>>>);

    impl Write for Events {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| std::io::Error::other("poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Events {
        pub fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        pub fn subscriber(&self) -> impl Subscriber + Send + Sync + 'static {
            let writer = self.clone();
            tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capture::Events;

    #[test]
    fn test_session_id_is_stable() {
        assert_eq!(session_id(), session_id());
        assert_eq!(session_id().len(), 36);
    }

    #[test]
    fn test_used() {
        assert_eq!(used(&Some("x")), Value::Bool(true));
        assert_eq!(used::<String>(&None), Value::Bool(false));
    }

    #[test]
    fn test_track_emits_event() {
        let events = Events::default();
        tracing::subscriber::with_default(events.subscriber(), || {
            track(
                "entra remove-group",
                TelemetryProperties::from([("force".to_string(), Value::Bool(true))]),
                false,
            );
        });

        let output = events.contents();
        assert!(output.contains("m365::telemetry"));
        assert!(output.contains("entra remove-group"));
        assert!(output.contains(r#""force":true"#));
        assert!(output.contains(session_id()));
    }

    #[test]
    fn test_track_when_disabled_emits_nothing() {
        let events = Events::default();
        tracing::subscriber::with_default(events.subscriber(), || {
            track("entra get-user", TelemetryProperties::new(), true);
        });
        assert!(!events.contents().contains("m365::telemetry"));
    }
}
