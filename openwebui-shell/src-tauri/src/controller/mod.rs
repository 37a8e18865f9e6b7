pub mod events;
pub mod runtime;

pub use events::{FileChooserRequest, HostCommand, ShellEvent, WebResource};
pub use runtime::{post_event, spawn_controller, BridgeController, NavigationGuard, ShellHandle};
