//! Online/offline pill.

use std::time::{Duration, Instant};

use pwakit_core::PageConfig;
use tracing::debug;

pub const OFFLINE_LABEL: &str = "You're offline";
pub const ONLINE_LABEL: &str = "Back online";

/// What the pill currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PillState {
    Hidden,
    Offline,
    BackOnline,
}

impl PillState {
    pub fn label(&self) -> Option<&'static str> {
        match self {
            PillState::Hidden => None,
            PillState::Offline => Some(OFFLINE_LABEL),
            PillState::BackOnline => Some(ONLINE_LABEL),
        }
    }
}

/// Tracks connectivity changes for the status pill.
///
/// Offline is sticky. "Back online" hides itself after `hide_after`; going
/// offline again cancels that pending hide.
#[derive(Debug)]
pub struct NetworkIndicator {
    state: PillState,
    hide_after: Duration,
    hide_at: Option<Instant>,
}

impl NetworkIndicator {
    pub fn new(initially_online: bool, hide_after: Duration) -> Self {
        Self {
            state: if initially_online {
                PillState::Hidden
            } else {
                PillState::Offline
            },
            hide_after,
            hide_at: None,
        }
    }

    /// Indicator using the configured "Back online" delay.
    pub fn from_config(initially_online: bool, config: &PageConfig) -> Self {
        Self::new(initially_online, config.back_online_hide())
    }

    pub fn state(&self) -> PillState {
        self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state != PillState::Hidden
    }

    pub fn set_offline(&mut self) {
        debug!("Connection lost");
        self.state = PillState::Offline;
        self.hide_at = None;
    }

    pub fn set_online(&mut self, now: Instant) {
        debug!("Connection restored");
        self.state = PillState::BackOnline;
        self.hide_at = Some(now + self.hide_after);
    }

    /// Advance the clock; hides "Back online" once its time is up.
    pub fn tick(&mut self, now: Instant) -> PillState {
        if let Some(deadline) = self.hide_at {
            if now >= deadline {
                self.hide_at = None;
                self.state = PillState::Hidden;
            }
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIDE: Duration = Duration::from_millis(2200);

    #[test]
    fn test_initial_state() {
        assert_eq!(NetworkIndicator::new(true, HIDE).state(), PillState::Hidden);

        let offline = NetworkIndicator::new(false, HIDE);
        assert_eq!(offline.state(), PillState::Offline);
        assert_eq!(offline.state().label(), Some(OFFLINE_LABEL));
    }

    #[test]
    fn test_from_config_uses_hide_delay() {
        let start = Instant::now();
        let config = PageConfig {
            back_online_hide_ms: 100,
            ..Default::default()
        };
        let mut pill = NetworkIndicator::from_config(false, &config);
        pill.set_online(start);
        assert_eq!(pill.tick(start + Duration::from_millis(100)), PillState::Hidden);
    }

    #[test]
    fn test_offline_is_sticky() {
        let start = Instant::now();
        let mut pill = NetworkIndicator::new(true, HIDE);
        pill.set_offline();
        assert_eq!(pill.tick(start + Duration::from_secs(3600)), PillState::Offline);
    }

    #[test]
    fn test_back_online_hides_after_delay() {
        let start = Instant::now();
        let mut pill = NetworkIndicator::new(false, HIDE);
        pill.set_online(start);

        assert_eq!(pill.tick(start + Duration::from_millis(2199)), PillState::BackOnline);
        assert_eq!(pill.state().label(), Some(ONLINE_LABEL));
        assert_eq!(pill.tick(start + HIDE), PillState::Hidden);
        assert!(!pill.is_visible());
    }

    #[test]
    fn test_going_offline_cancels_pending_hide() {
        let start = Instant::now();
        let mut pill = NetworkIndicator::new(false, HIDE);
        pill.set_online(start);
        pill.set_offline();

        assert_eq!(pill.tick(start + Duration::from_secs(10)), PillState::Offline);
    }

    #[test]
    fn test_second_online_restarts_timer() {
        let start = Instant::now();
        let mut pill = NetworkIndicator::new(false, HIDE);
        pill.set_online(start);
        pill.set_online(start + Duration::from_millis(2000));

        assert_eq!(pill.tick(start + Duration::from_millis(2500)), PillState::BackOnline);
        assert_eq!(pill.tick(start + Duration::from_millis(4200)), PillState::Hidden);
    }
}
