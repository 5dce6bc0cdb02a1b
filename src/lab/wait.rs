//! Bounded polling over a task's status.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::PollingSettings;
use crate::error::{LabError, LabResult};

/// Default pause between status fetches while the server guesses settings.
pub const GUESS_POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Default pause between status fetches while a session trains.
pub const TRAIN_POLL_INTERVAL: Duration = Duration::from_secs(2);

const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(50);

/// Shared flag a caller flips to abandon a wait from another thread.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// How a wait polls: interval, optional deadline, optional cancellation.
///
/// Without a timeout or token, a wait lasts as long as the server reports
/// the task busy.
#[derive(Clone, Debug)]
pub struct WaitOptions {
    pub interval: Duration,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl WaitOptions {
    pub fn guess() -> Self {
        Self::every(GUESS_POLL_INTERVAL)
    }

    pub fn train() -> Self {
        Self::every(TRAIN_POLL_INTERVAL)
    }

    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: None,
        }
    }

    /// Guess and train options from the configured polling section.
    pub fn from_settings(settings: &PollingSettings) -> (Self, Self) {
        let guess = Self {
            timeout: settings.timeout(),
            ..Self::every(Duration::from_millis(settings.guess_interval_ms))
        };
        let train = Self {
            timeout: settings.timeout(),
            ..Self::every(Duration::from_millis(settings.train_interval_ms))
        };
        (guess, train)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// Fetch status until its `flag` field is exactly `false`, returning that status.
///
/// A missing or non-boolean flag counts as still busy.
pub(crate) fn poll_until_false<F>(options: &WaitOptions, flag: &str, mut fetch: F) -> LabResult<Value>
where
    F: FnMut() -> LabResult<Value>,
{
    let started = Instant::now();
    let mut polls = 0u64;
    loop {
        if options.cancelled() {
            tracing::info!(flag, polls, "Wait cancelled");
            return Err(LabError::Cancelled);
        }
        let status = fetch()?;
        polls += 1;
        if status.get(flag) == Some(&Value::Bool(false)) {
            tracing::debug!(flag, polls, elapsed = ?started.elapsed(), "Wait complete");
            return Ok(status);
        }
        if let Some(timeout) = options.timeout {
            let waited = started.elapsed();
            if waited >= timeout {
                tracing::warn!(flag, polls, ?waited, "Wait timed out");
                return Err(LabError::WaitTimeout { waited });
            }
        }
        tracing::trace!(flag, polls, "Still busy");
        pause(options, started);
    }
}

fn pause(options: &WaitOptions, started: Instant) {
    let mut remaining = options.interval;
    if let Some(timeout) = options.timeout {
        remaining = remaining.min(timeout.saturating_sub(started.elapsed()));
    }
    while !remaining.is_zero() {
        if options.cancelled() {
            return;
        }
        let slice = remaining.min(CANCEL_CHECK_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scripted(states: Vec<Value>) -> impl FnMut() -> LabResult<Value> {
        let mut states = states.into_iter();
        let mut last = json!({});
        move || {
            if let Some(next) = states.next() {
                last = next;
            }
            Ok(last.clone())
        }
    }

    #[test]
    fn returns_once_flag_turns_false() {
        let mut calls = 0;
        let mut fetch = scripted(vec![
            json!({"training": true}),
            json!({"training": true}),
            json!({"training": false, "fullModelIds": []}),
        ]);
        let status = poll_until_false(&WaitOptions::every(Duration::ZERO), "training", || {
            calls += 1;
            fetch()
        })
        .unwrap();
        assert_eq!(calls, 3);
        assert_eq!(status["fullModelIds"], json!([]));
    }

    #[test]
    fn missing_or_non_bool_flag_keeps_waiting() {
        let mut calls = 0;
        let mut fetch = scripted(vec![json!({}), json!({"guessing": "no"}), json!({"guessing": false})]);
        poll_until_false(&WaitOptions::every(Duration::ZERO), "guessing", || {
            calls += 1;
            fetch()
        })
        .unwrap();
        assert_eq!(calls, 3);
    }

    #[test]
    fn times_out_when_flag_never_clears() {
        let options = WaitOptions::every(Duration::from_millis(5)).with_timeout(Duration::from_millis(30));
        let err = poll_until_false(&options, "training", scripted(vec![json!({"training": true})]))
            .unwrap_err();
        match err {
            LabError::WaitTimeout { waited } => assert!(waited >= Duration::from_millis(30)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pre_cancelled_token_skips_fetching() {
        let token = CancellationToken::new();
        token.cancel();
        let options = WaitOptions::train().with_cancellation(token);
        let mut calls = 0;
        let err = poll_until_false(&options, "training", || {
            calls += 1;
            Ok(json!({"training": false}))
        })
        .unwrap_err();
        assert!(matches!(err, LabError::Cancelled));
        assert_eq!(calls, 0);
    }

    #[test]
    fn cancellation_from_another_thread_interrupts_sleep() {
        let token = CancellationToken::new();
        let options = WaitOptions::every(Duration::from_secs(60)).with_cancellation(token.clone());
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            token.cancel();
        });
        let started = Instant::now();
        let err = poll_until_false(&options, "training", scripted(vec![json!({"training": true})]))
            .unwrap_err();
        canceller.join().unwrap();
        assert!(matches!(err, LabError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn fetch_errors_abort_the_wait() {
        let err = poll_until_false(&WaitOptions::every(Duration::ZERO), "training", || {
            Err(LabError::Transport("connection refused".to_string()))
        })
        .unwrap_err();
        assert!(matches!(err, LabError::Transport(_)));
    }

    #[test]
    fn options_follow_polling_settings() {
        let (guess, train) = WaitOptions::from_settings(&PollingSettings {
            guess_interval_ms: 100,
            train_interval_ms: 1500,
            timeout_secs: 60,
        });
        assert_eq!(guess.interval, Duration::from_millis(100));
        assert_eq!(train.interval, Duration::from_millis(1500));
        assert_eq!(train.timeout, Some(Duration::from_secs(60)));
        assert_eq!(WaitOptions::guess().interval, GUESS_POLL_INTERVAL);
        assert_eq!(WaitOptions::train().timeout, None);
    }
}
