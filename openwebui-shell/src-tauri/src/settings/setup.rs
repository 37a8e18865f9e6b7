use tracing::info;

use super::config::{SettingsStore, ShellSettings};
use crate::error::{Result, ShellError};

/// Which screen the shell opens with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupRoute {
    /// First launch, nothing configured yet.
    Welcome,
    /// Onboarding seen but no usable server URL.
    ServerEntry,
    Shell(String),
}

pub fn startup_route(settings: &ShellSettings) -> StartupRoute {
    match (&settings.server_url, settings.setup_complete) {
        (Some(url), true) => StartupRoute::Shell(url.clone()),
        (Some(_), false) | (None, true) => StartupRoute::ServerEntry,
        (None, false) => StartupRoute::Welcome,
    }
}

/// Stores the server URL entered during onboarding and marks setup done.
pub fn complete_setup(store: &dyn SettingsStore, url: &str) -> Result<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ShellError::InvalidUrl("Please enter a URL".into()));
    }

    store.save_server_url(url)?;
    store.mark_setup_complete()?;
    info!("Setup complete, server URL: {}", url);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettingsStore;

    #[test]
    fn test_startup_route() {
        let mut settings = ShellSettings::default();
        assert_eq!(startup_route(&settings), StartupRoute::Welcome);

        settings.setup_complete = true;
        assert_eq!(startup_route(&settings), StartupRoute::ServerEntry);

        settings.server_url = Some("https://chat.example.com".into());
        assert_eq!(
            startup_route(&settings),
            StartupRoute::Shell("https://chat.example.com".into())
        );
    }

    #[test]
    fn test_complete_setup_trims_and_saves() {
        let store = MemorySettingsStore::default();
        let url = complete_setup(&store, "  https://chat.example.com  ").unwrap();
        assert_eq!(url, "https://chat.example.com");
        assert_eq!(
            startup_route(&store.settings()),
            StartupRoute::Shell("https://chat.example.com".into())
        );
    }

    #[test]
    fn test_complete_setup_rejects_blank() {
        let store = MemorySettingsStore::default();
        assert!(complete_setup(&store, "   ").is_err());
        assert!(!store.settings().setup_complete);
    }
}
