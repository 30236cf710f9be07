pub mod base;
pub mod browser;
pub mod detail;
pub mod listing;

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::time::sleep;

use crate::config::HarvestConfig;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("page load timed out after {secs}s: {url}")]
    Timeout { url: String, secs: u64 },
    #[error("browser command failed: {0}")]
    Command(String),
    #[error("no page is open in this session")]
    NoPage,
}

/// One live browser. Dropping a session without [`BrowserSession::close`]
/// leaks the browser process, so callers always close explicitly.
#[allow(async_fn_in_trait)]
pub trait BrowserSession {
    async fn open(&mut self, url: &str) -> Result<(), SessionError>;
    async fn scroll_by(&mut self, pixels: u32) -> Result<(), SessionError>;
    async fn page_source(&mut self) -> Result<String, SessionError>;
    async fn close(self) -> Result<(), SessionError>;
}

#[allow(async_fn_in_trait)]
pub trait SessionLauncher {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, SessionError>;
}

/// Randomized scroll distances and pauses between browser actions.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub scroll_px: RangeInclusive<u32>,
    pub pause_ms: RangeInclusive<u64>,
}

impl Pacing {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            scroll_px: ordered(config.scroll_min_px, config.scroll_max_px),
            pause_ms: ordered(config.pause_min_ms, config.pause_max_ms),
        }
    }

    /// No waiting and a fixed scroll step.
    pub fn immediate() -> Self {
        Self {
            scroll_px: 700..=700,
            pause_ms: 0..=0,
        }
    }

    pub fn scroll_increment(&self) -> u32 {
        rand::rng().random_range(self.scroll_px.clone())
    }

    pub async fn pause(&self) {
        let millis = rand::rng().random_range(self.pause_ms.clone());
        if millis > 0 {
            sleep(Duration::from_millis(millis)).await;
        }
    }
}

fn ordered<T: PartialOrd + Copy>(a: T, b: T) -> RangeInclusive<T> {
    if a <= b {
        a..=b
    } else {
        b..=a
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted browser used by the crawler and harvester tests.

    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use super::{BrowserSession, SessionError, SessionLauncher};

    #[derive(Default)]
    pub struct Script {
        /// Successive snapshots served for a URL; the last one repeats.
        pub pages: HashMap<String, Vec<String>>,
        pub failing_urls: Vec<String>,
        pub fail_launch: bool,
    }

    #[derive(Default, Debug)]
    pub struct Journal {
        pub launched: usize,
        pub closed: usize,
        pub opened: Vec<String>,
        pub scrolls: usize,
    }

    #[derive(Clone, Default)]
    pub struct ScriptedLauncher {
        pub script: Arc<Script>,
        pub journal: Arc<Mutex<Journal>>,
    }

    impl ScriptedLauncher {
        pub fn new(script: Script) -> Self {
            Self {
                script: Arc::new(script),
                journal: Arc::default(),
            }
        }

        pub fn journal(&self) -> std::sync::MutexGuard<'_, Journal> {
            self.journal.lock().expect("journal lock")
        }
    }

    pub struct ScriptedSession {
        script: Arc<Script>,
        journal: Arc<Mutex<Journal>>,
        current: Option<String>,
        reads: usize,
    }

    impl SessionLauncher for ScriptedLauncher {
        type Session = ScriptedSession;

        async fn launch(&self) -> Result<ScriptedSession, SessionError> {
            if self.script.fail_launch {
                return Err(SessionError::Launch("chrome not found".into()));
            }
            self.journal().launched += 1;
            Ok(ScriptedSession {
                script: Arc::clone(&self.script),
                journal: Arc::clone(&self.journal),
                current: None,
                reads: 0,
            })
        }
    }

    impl BrowserSession for ScriptedSession {
        async fn open(&mut self, url: &str) -> Result<(), SessionError> {
            self.journal.lock().expect("journal lock").opened.push(url.to_string());
            if self.script.failing_urls.iter().any(|u| u == url) {
                return Err(SessionError::Navigation {
                    url: url.to_string(),
                    reason: "connection reset".into(),
                });
            }
            self.current = Some(url.to_string());
            self.reads = 0;
            Ok(())
        }

        async fn scroll_by(&mut self, _pixels: u32) -> Result<(), SessionError> {
            self.journal.lock().expect("journal lock").scrolls += 1;
            Ok(())
        }

        async fn page_source(&mut self) -> Result<String, SessionError> {
            let url = self.current.as_ref().ok_or(SessionError::NoPage)?;
            let snapshots = self.script.pages.get(url).ok_or(SessionError::NoPage)?;
            let index = self.reads.min(snapshots.len().saturating_sub(1));
            self.reads += 1;
            snapshots.get(index).cloned().ok_or(SessionError::NoPage)
        }

        async fn close(self) -> Result<(), SessionError> {
            self.journal.lock().expect("journal lock").closed += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_stays_inside_configured_ranges() {
        let pacing = Pacing {
            scroll_px: 500..=1000,
            pause_ms: 0..=0,
        };
        for _ in 0..50 {
            let step = pacing.scroll_increment();
            assert!((500..=1000).contains(&step));
        }
    }

    #[test]
    fn reversed_bounds_are_reordered() {
        assert_eq!(ordered(3000u64, 1000u64), 1000..=3000);
    }
}
