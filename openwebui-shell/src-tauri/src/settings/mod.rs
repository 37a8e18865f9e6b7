mod config;
mod setup;

pub use config::{JsonSettingsStore, MemorySettingsStore, SettingsStore, ShellSettings};
pub use setup::{complete_setup, startup_route, StartupRoute};
