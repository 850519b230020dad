//! "Add to home screen" prompt state.
//!
//! Timestamps are milliseconds since the Unix epoch, the format the
//! dismissal is persisted in.

use std::time::Duration;

use pwakit_core::PageConfig;
use tracing::{debug, trace};

/// Storage key for the dismissal timestamp.
pub const DISMISSED_AT_KEY: &str = "ggenre-pwa-install-dismissed-at";

/// Text shown on the install sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallCopy {
    pub title: &'static str,
    pub text: &'static str,
    pub dismiss: &'static str,
}

const IOS_COPY: InstallCopy = InstallCopy {
    title: "Install On iPhone",
    text: "In Safari, tap Share and choose Add to Home Screen.",
    dismiss: "Got it",
};

const DEFAULT_COPY: InstallCopy = InstallCopy {
    title: "Install Genre Genius",
    text: "Open faster, work offline, and use it like a native mobile app.",
    dismiss: "Not now",
};

/// Computed visibility of the install UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallVisibility {
    /// Header install buttons.
    pub show_button: bool,
    /// Bottom install sheet.
    pub show_sheet: bool,
    /// Sheet's primary action is rendered.
    pub action_visible: bool,
    /// Sheet's primary action can be clicked.
    pub action_enabled: bool,
    pub copy: InstallCopy,
}

/// True for iPhone, iPad and iPod user agents running WebKit.
pub fn is_ios_installable(user_agent: &str) -> bool {
    let ua = user_agent.to_ascii_lowercase();
    let ios = ["iphone", "ipad", "ipod"].iter().any(|d| ua.contains(d));
    ios && ua.contains("webkit")
}

#[derive(Debug)]
pub struct InstallPrompt {
    deferred_prompt: bool,
    standalone: bool,
    ios: bool,
    dismissed_at: Option<u64>,
    dismiss_window: Duration,
}

impl InstallPrompt {
    pub fn new(user_agent: &str, standalone: bool, dismiss_window: Duration) -> Self {
        Self {
            deferred_prompt: false,
            standalone,
            ios: is_ios_installable(user_agent),
            dismissed_at: None,
            dismiss_window,
        }
    }

    /// Prompt using the configured dismissal window.
    pub fn from_config(user_agent: &str, standalone: bool, config: &PageConfig) -> Self {
        Self::new(user_agent, standalone, config.install_dismiss_window())
    }

    /// Restore a persisted dismissal. Unparseable values are ignored.
    pub fn with_stored_dismissal(mut self, raw: Option<&str>) -> Self {
        self.dismissed_at = raw.and_then(|value| value.trim().parse::<u64>().ok());
        self
    }

    /// Value to persist under [`DISMISSED_AT_KEY`]; `None` means remove it.
    pub fn stored_dismissal(&self) -> Option<String> {
        self.dismissed_at.map(|at| at.to_string())
    }

    pub fn has_deferred_prompt(&self) -> bool {
        self.deferred_prompt
    }

    fn suppressed(&self, now_ms: u64) -> bool {
        let window = u64::try_from(self.dismiss_window.as_millis()).unwrap_or(u64::MAX);
        self.dismissed_at
            .is_some_and(|at| now_ms.saturating_sub(at) < window)
    }

    pub fn visibility(&self, now_ms: u64) -> InstallVisibility {
        let can_install = self.deferred_prompt && !self.standalone;
        let ios_hint = self.ios && !self.standalone && !can_install;
        let show = (can_install || ios_hint) && !self.suppressed(now_ms);

        InstallVisibility {
            show_button: can_install && show,
            show_sheet: show,
            action_visible: !ios_hint,
            action_enabled: can_install,
            copy: if ios_hint { IOS_COPY } else { DEFAULT_COPY },
        }
    }

    /// The browser offered a deferred install prompt.
    pub fn on_before_install_prompt(&mut self) {
        trace!("Install prompt deferred");
        self.deferred_prompt = true;
        self.dismissed_at = None;
    }

    pub fn on_app_installed(&mut self) {
        debug!("App installed");
        self.deferred_prompt = false;
        self.dismissed_at = None;
    }

    /// "Not now" / "Got it".
    pub fn dismiss(&mut self, now_ms: u64) {
        self.dismissed_at = Some(now_ms);
    }

    /// Consume the deferred prompt to show it. Returns false when there is none.
    pub fn take_prompt(&mut self) -> bool {
        std::mem::take(&mut self.deferred_prompt)
    }

    /// Outcome of a shown prompt. Declined or failed prompts count as a dismissal.
    pub fn prompt_outcome(&mut self, accepted: bool, now_ms: u64) {
        if accepted {
            self.dismissed_at = None;
        } else {
            debug!("Install prompt declined");
            self.dismiss(now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60 * 60 * 24 * 5);
    const DAY_MS: u64 = 24 * 60 * 60 * 1000;
    const ANDROID: &str = "Mozilla/5.0 (Linux; Android 14) AppleWebKit/537.36 Chrome/120.0";
    const IPHONE: &str =
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 Safari/604.1";

    #[test]
    fn test_ios_detection() {
        assert!(is_ios_installable(IPHONE));
        assert!(is_ios_installable("Mozilla/5.0 (iPad; CPU OS 16_0) AppleWebKit/605.1.15"));
        assert!(!is_ios_installable(ANDROID));
        assert!(!is_ios_installable("iPhone without an engine"));
    }

    #[test]
    fn test_hidden_without_prompt() {
        let prompt = InstallPrompt::new(ANDROID, false, WINDOW);
        let vis = prompt.visibility(0);
        assert!(!vis.show_sheet);
        assert!(!vis.show_button);
        assert!(!vis.action_enabled);
    }

    #[test]
    fn test_deferred_prompt_shows_install() {
        let mut prompt = InstallPrompt::new(ANDROID, false, WINDOW);
        prompt.on_before_install_prompt();

        let vis = prompt.visibility(0);
        assert!(vis.show_sheet && vis.show_button && vis.action_enabled && vis.action_visible);
        assert_eq!(vis.copy, DEFAULT_COPY);
    }

    #[test]
    fn test_standalone_never_shows() {
        let mut prompt = InstallPrompt::new(IPHONE, true, WINDOW);
        prompt.on_before_install_prompt();
        assert!(!prompt.visibility(0).show_sheet);
    }

    #[test]
    fn test_ios_hint() {
        let prompt = InstallPrompt::new(IPHONE, false, WINDOW);
        let vis = prompt.visibility(0);
        assert!(vis.show_sheet);
        assert!(!vis.show_button);
        assert!(!vis.action_visible);
        assert_eq!(vis.copy.title, "Install On iPhone");
        assert_eq!(vis.copy.dismiss, "Got it");
    }

    #[test]
    fn test_dismissal_window() {
        let now = 100 * DAY_MS;
        let mut prompt = InstallPrompt::new(IPHONE, false, WINDOW);
        prompt.dismiss(now);

        assert!(!prompt.visibility(now + 4 * DAY_MS).show_sheet);
        assert!(prompt.visibility(now + 5 * DAY_MS).show_sheet);
        assert_eq!(prompt.stored_dismissal(), Some(now.to_string()));
    }

    #[test]
    fn test_default_window_is_five_days() {
        let now = 100 * DAY_MS;
        let mut prompt = InstallPrompt::from_config(IPHONE, false, &PageConfig::default());
        prompt.dismiss(now);
        assert!(!prompt.visibility(now + 5 * DAY_MS - 1).show_sheet);
        assert!(prompt.visibility(now + 5 * DAY_MS).show_sheet);
    }

    #[test]
    fn test_stored_dismissal_parsing() {
        let now = 100 * DAY_MS;
        let prompt = InstallPrompt::new(IPHONE, false, WINDOW)
            .with_stored_dismissal(Some(&(now - DAY_MS).to_string()));
        assert!(!prompt.visibility(now).show_sheet);

        let garbage = InstallPrompt::new(IPHONE, false, WINDOW).with_stored_dismissal(Some("soon"));
        assert!(garbage.visibility(now).show_sheet);
        assert_eq!(garbage.stored_dismissal(), None);
    }

    #[test]
    fn test_prompt_outcomes() {
        let now = 100 * DAY_MS;
        let mut prompt = InstallPrompt::new(ANDROID, false, WINDOW);
        prompt.on_before_install_prompt();

        assert!(prompt.take_prompt());
        assert!(!prompt.take_prompt());
        prompt.prompt_outcome(false, now);
        assert_eq!(prompt.stored_dismissal(), Some(now.to_string()));

        // A fresh offer clears the old dismissal.
        prompt.on_before_install_prompt();
        assert!(prompt.visibility(now).show_sheet);
        assert!(prompt.take_prompt());
        prompt.prompt_outcome(true, now);
        assert_eq!(prompt.stored_dismissal(), None);
    }

    #[test]
    fn test_app_installed_hides_button() {
        let mut prompt = InstallPrompt::new(ANDROID, false, WINDOW);
        prompt.on_before_install_prompt();
        prompt.on_app_installed();
        assert!(!prompt.visibility(0).show_button);
        assert!(!prompt.has_deferred_prompt());
    }
}
