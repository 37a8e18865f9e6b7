pub mod bridge;
pub mod controller;
pub mod downloads;
pub mod error;
pub mod gesture;
pub mod lifecycle;
pub mod media;
pub mod navigation;
pub mod settings;
pub mod share;

#[cfg(feature = "tauri-host")]
mod host;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use controller::{spawn_controller, BridgeController, HostCommand, ShellEvent, ShellHandle};
pub use error::{Result, ShellError};
pub use settings::{JsonSettingsStore, MemorySettingsStore, SettingsStore, ShellSettings};

#[cfg(feature = "tauri-host")]
pub use host::run;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openwebui_shell_lib=debug,page=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
