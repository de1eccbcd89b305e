//! Long-running operation polling
//!
//! Submit a request, get a handle back (Location header, async operation id,
//! CSOM object identity), then poll at a fixed interval until the status is
//! terminal.

use crate::api::RestClient;
use crate::error::{M365Error, Result};
use crate::progress::OperationSpinner;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Where an operation stands after one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Running,
    Succeeded,
    Failed(String),
}

/// Maps an API-specific status payload to an [`OperationState`]
pub trait OperationStatus {
    fn state(&self) -> OperationState;

    /// Server-requested wait before the next poll, overriding the fixed interval
    fn next_interval(&self) -> Option<Duration> {
        None
    }
}

/// Fixed-interval polling settings
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSettings {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

impl Default for PollSettings {
    /// 5 seconds between polls, give up after 10 minutes
    fn default() -> Self {
        Self::new(Duration::from_secs(5), 120)
    }
}

/// Call `check` until it reports a terminal state, sleeping `settings.interval` between calls
/// unless the last status asked for a different wait
///
/// `label` names the operation in the spinner and in the timeout error.
pub async fn poll_until<T, F, Fut>(settings: PollSettings, label: &str, mut check: F) -> Result<T>
where
    T: OperationStatus,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let spinner = OperationSpinner::start(label);

    for attempt in 1..=settings.max_attempts {
        spinner.attempt(attempt, settings.max_attempts);
        let status = match check().await {
            Ok(status) => status,
            Err(e) => {
                spinner.fail("failed");
                return Err(e);
            }
        };

        match status.state() {
            OperationState::Succeeded => {
                spinner.succeed();
                return Ok(status);
            }
            OperationState::Failed(message) => {
                spinner.fail("failed");
                return Err(M365Error::OperationFailed(message));
            }
            OperationState::Running => {
                debug!(label, attempt, "Operation still running");
                if attempt < settings.max_attempts {
                    let interval = status.next_interval().unwrap_or(settings.interval);
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    spinner.fail("timed out");
    Err(M365Error::OperationTimeout {
        url: label.to_string(),
        attempts: settings.max_attempts,
    })
}

impl RestClient {
    /// Poll an operation URL with GET until its status is terminal
    pub async fn poll_operation<T>(
        &self,
        url: &str,
        settings: PollSettings,
        headers: &[(&str, &str)],
    ) -> Result<T>
    where
        T: DeserializeOwned + OperationStatus,
    {
        poll_until(settings, url, || self.get_with_headers::<T>(url, headers)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Fake(OperationState);

    impl OperationStatus for Fake {
        fn state(&self) -> OperationState {
            self.0.clone()
        }
    }

    fn fast(max_attempts: u32) -> PollSettings {
        PollSettings::new(Duration::from_millis(1), max_attempts)
    }

    #[tokio::test]
    async fn test_stops_on_first_success() {
        let calls = Cell::new(0);
        let result = poll_until(fast(10), "export", || {
            calls.set(calls.get() + 1);
            let state = if calls.get() < 3 {
                OperationState::Running
            } else {
                OperationState::Succeeded
            };
            async move { Ok(Fake(state)) }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_failure_surfaces_message() {
        let result = poll_until(fast(10), "export", || async {
            Ok(Fake(OperationState::Failed("Solution is locked".into())))
        })
        .await;

        match result {
            Err(M365Error::OperationFailed(message)) => assert_eq!(message, "Solution is locked"),
            _ => panic!("expected operation failure"),
        }
    }

    #[tokio::test]
    async fn test_times_out_after_max_attempts() {
        let calls = Cell::new(0);
        let result = poll_until(fast(4), "export", || {
            calls.set(calls.get() + 1);
            async { Ok(Fake(OperationState::Running)) }
        })
        .await;

        assert!(matches!(
            result,
            Err(M365Error::OperationTimeout { attempts: 4, .. })
        ));
        assert_eq!(calls.get(), 4);
    }

    struct Hinted(OperationState, Duration);

    impl OperationStatus for Hinted {
        fn state(&self) -> OperationState {
            self.0.clone()
        }

        fn next_interval(&self) -> Option<Duration> {
            Some(self.1)
        }
    }

    #[tokio::test]
    async fn test_status_interval_overrides_settings() {
        let calls = Cell::new(0);
        let polled = poll_until(
            PollSettings::new(Duration::from_secs(60), 5),
            "removal",
            || {
                calls.set(calls.get() + 1);
                let state = if calls.get() < 3 {
                    OperationState::Running
                } else {
                    OperationState::Succeeded
                };
                async move { Ok(Hinted(state, Duration::from_millis(1))) }
            },
        );

        let result = tokio::time::timeout(Duration::from_secs(5), polled).await;
        assert!(matches!(result, Ok(Ok(_))));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn test_check_error_stops_polling() {
        let calls = Cell::new(0);
        let result: Result<Fake> = poll_until(fast(5), "export", || {
            calls.set(calls.get() + 1);
            async {
                Err(M365Error::ApiError {
                    status: 404,
                    message: "gone".into(),
                })
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
