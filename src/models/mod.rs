//! Model Registry Client: which models are installed, and on-demand installs.

pub mod ollama;

use serde::Serialize;
use std::collections::BTreeSet;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub use ollama::OllamaClient;

/// Default number of registry checks after a pull request.
pub const DEFAULT_PULL_ATTEMPTS: u32 = 30;
/// Default delay between registry checks.
pub const DEFAULT_PULL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PullOutcome {
    /// The model was already installed; nothing was downloaded.
    pub cached: bool,
}

/// Registry of locally installed models.
pub trait ModelRegistry: Send + Sync {
    fn list_installed(&self) -> Result<BTreeSet<String>>;

    /// Ask the registry to install `name`. Returning does not imply the
    /// model is listed yet.
    fn request_pull(&self, name: &str) -> Result<PullOutcome>;
}

/// Whether `name` is in the installed set. A name without a tag also matches
/// its `:latest` entry.
pub fn is_installed(installed: &BTreeSet<String>, name: &str) -> bool {
    installed.contains(name) || (!name.contains(':') && installed.contains(&format!("{name}:latest")))
}

/// Check the registry until `name` appears, at most `max_attempts` times.
///
/// A failed listing counts as an attempt. Returns false once the budget is
/// spent; the caller decides what that means.
pub fn poll_until_registered(
    registry: &dyn ModelRegistry,
    name: &str,
    max_attempts: u32,
    interval: Duration,
) -> bool {
    for attempt in 1..=max_attempts {
        match registry.list_installed() {
            Ok(installed) if is_installed(&installed, name) => {
                debug!("Model {name} registered after {attempt} attempt(s)");
                return true;
            }
            Ok(_) => debug!("Model {name} not registered yet ({attempt}/{max_attempts})"),
            Err(e) => warn!("Listing models failed ({attempt}/{max_attempts}): {e}"),
        }
        if attempt < max_attempts {
            thread::sleep(interval);
        }
    }
    false
}

/// Make sure `name` is installed: pull it if needed and wait for it to show
/// up in the registry.
pub fn ensure_model(
    registry: &dyn ModelRegistry,
    name: &str,
    max_attempts: u32,
    interval: Duration,
) -> Result<PullOutcome> {
    let outcome = registry.request_pull(name)?;
    if outcome.cached {
        info!("Model {name} already installed");
        return Ok(outcome);
    }

    info!("Waiting for {name} to be registered");
    if poll_until_registered(registry, name, max_attempts, interval) {
        Ok(outcome)
    } else {
        Err(Error::PullTimeout {
            name: name.to_string(),
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Registry whose model appears after a number of listings.
    struct SlowRegistry {
        calls: AtomicU32,
        visible_after: Option<u32>,
        fail_first: bool,
    }

    impl SlowRegistry {
        fn new(visible_after: Option<u32>) -> Self {
            SlowRegistry {
                calls: AtomicU32::new(0),
                visible_after,
                fail_first: false,
            }
        }
    }

    impl ModelRegistry for SlowRegistry {
        fn list_installed(&self) -> Result<BTreeSet<String>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_first && call == 1 {
                return Err(Error::Other("connection refused".into()));
            }
            let mut installed = BTreeSet::from(["nomic-embed-text:latest".to_string()]);
            if self.visible_after.is_some_and(|n| call >= n) {
                installed.insert("llama3.2:3b".to_string());
            }
            Ok(installed)
        }

        fn request_pull(&self, _name: &str) -> Result<PullOutcome> {
            Ok(PullOutcome { cached: false })
        }
    }

    #[test]
    fn gives_up_after_exactly_the_budget() {
        let registry = SlowRegistry::new(None);
        assert!(!poll_until_registered(&registry, "llama3.2:3b", 3, Duration::ZERO));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn stops_as_soon_as_the_model_appears() {
        let registry = SlowRegistry::new(Some(2));
        assert!(poll_until_registered(&registry, "llama3.2:3b", 30, Duration::ZERO));
        assert_eq!(registry.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listing_errors_use_up_attempts() {
        let mut registry = SlowRegistry::new(Some(1));
        registry.fail_first = true;
        assert!(!poll_until_registered(&registry, "llama3.2:3b", 1, Duration::ZERO));

        registry.calls.store(0, Ordering::SeqCst);
        assert!(poll_until_registered(&registry, "llama3.2:3b", 2, Duration::ZERO));
    }

    #[test]
    fn ensure_model_reports_timeout() {
        let registry = SlowRegistry::new(None);
        match ensure_model(&registry, "llama3.2:3b", 2, Duration::ZERO) {
            Err(Error::PullTimeout { name, attempts }) => {
                assert_eq!(name, "llama3.2:3b");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn untagged_names_match_latest() {
        let installed = BTreeSet::from(["mistral:latest".to_string(), "llama3.2:3b".to_string()]);
        assert!(is_installed(&installed, "mistral"));
        assert!(is_installed(&installed, "llama3.2:3b"));
        assert!(!is_installed(&installed, "llama3.2"));
    }
}
