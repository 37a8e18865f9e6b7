use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info};

/// Neutral page loaded after a failed or timed out navigation.
pub const BLANK_PAGE: &str = "about:blank";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageReadiness {
    pub is_ready: bool,
    pub timeout_armed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing loaded yet.
    Idle,
    /// Navigation in progress; the watchdog of this generation is armed.
    Loading { generation: u64 },
    Ready,
    /// Abandoned after an error or timeout. Only a new navigation leaves this state.
    Failed,
}

/// Tracks page readiness and the load-timeout watchdog of each navigation.
#[derive(Debug)]
pub struct LoadSupervisor {
    state: LoadState,
    generation: u64,
    timeout: Duration,
}

impl LoadSupervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: LoadState::Idle,
            generation: 0,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn readiness(&self) -> PageReadiness {
        PageReadiness {
            is_ready: self.state == LoadState::Ready,
            timeout_armed: matches!(self.state, LoadState::Loading { .. }),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoadState::Ready
    }

    /// Starts a navigation cycle. Returns the generation the new watchdog must carry.
    pub fn begin_navigation(&mut self) -> u64 {
        self.generation += 1;
        self.state = LoadState::Loading {
            generation: self.generation,
        };
        debug!("Navigation started, watchdog generation {}", self.generation);
        self.generation
    }

    /// Returns true when this load made the page ready.
    pub fn on_load_finished(&mut self) -> bool {
        match self.state {
            LoadState::Loading { .. } => {
                info!("Page ready");
                self.state = LoadState::Ready;
                true
            }
            _ => false,
        }
    }

    /// Returns true when the failure transition must run.
    pub fn on_load_error(&mut self, description: &str) -> bool {
        match self.state {
            LoadState::Loading { .. } | LoadState::Ready => {
                error!("Page load failed: {}", description);
                self.state = LoadState::Failed;
                true
            }
            LoadState::Idle | LoadState::Failed => false,
        }
    }

    /// Returns true when the watchdog of `generation` is still the live one.
    pub fn on_timeout(&mut self, generation: u64) -> bool {
        match self.state {
            LoadState::Loading { generation: live } if live == generation => {
                error!("Connection timeout after {:?}", self.timeout);
                self.state = LoadState::Failed;
                true
            }
            _ => {
                debug!("Ignoring stale watchdog generation {}", generation);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn supervisor() -> LoadSupervisor {
        LoadSupervisor::new(Duration::from_secs(30))
    }

    #[test]
    fn test_navigation_arms_and_load_readies() {
        let mut sup = supervisor();
        sup.begin_navigation();
        assert_eq!(
            sup.readiness(),
            PageReadiness {
                is_ready: false,
                timeout_armed: true
            }
        );
        assert!(sup.on_load_finished());
        assert_eq!(
            sup.readiness(),
            PageReadiness {
                is_ready: true,
                timeout_armed: false
            }
        );
        assert!(!sup.on_load_finished(), "Second finish is not a transition");
    }

    #[test]
    fn test_timeout_fires_once_per_navigation() {
        let mut sup = supervisor();
        let generation = sup.begin_navigation();
        assert!(sup.on_timeout(generation));
        assert!(!sup.on_timeout(generation));
        assert_eq!(sup.state(), LoadState::Failed);
    }

    #[test]
    fn test_stale_timeout_ignored_after_reload() {
        let mut sup = supervisor();
        let first = sup.begin_navigation();
        let second = sup.begin_navigation();
        assert!(!sup.on_timeout(first));
        assert!(sup.readiness().timeout_armed);
        assert!(sup.on_timeout(second));
    }

    #[test]
    fn test_failed_page_does_not_become_ready() {
        let mut sup = supervisor();
        sup.begin_navigation();
        assert!(sup.on_load_error("net::ERR_NAME_NOT_RESOLVED"));
        assert!(!sup.on_load_finished(), "Blank page load must not mark ready");
        assert!(!sup.is_ready());
        assert!(!sup.on_load_error("again"));
    }

    #[test]
    fn test_timeout_after_ready_is_ignored() {
        let mut sup = supervisor();
        let generation = sup.begin_navigation();
        sup.on_load_finished();
        assert!(!sup.on_timeout(generation));
        assert!(sup.is_ready());
    }
}
