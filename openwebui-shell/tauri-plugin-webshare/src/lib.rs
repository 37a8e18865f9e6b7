use tauri::{
    plugin::{Builder, TauriPlugin},
    Manager, Runtime,
};

pub use models::*;

#[cfg(desktop)]
mod desktop;
#[cfg(mobile)]
mod mobile;

mod commands;
mod error;
mod models;

pub use error::{Error, Result};

#[cfg(desktop)]
use desktop::Webshare;
#[cfg(mobile)]
use mobile::Webshare;

/// Extensions to [`tauri::App`], [`tauri::AppHandle`] and [`tauri::Window`] to access the webshare APIs.
pub trait WebshareExt<R: Runtime> {
    fn webshare(&self) -> &Webshare<R>;
}

impl<R: Runtime, T: Manager<R>> crate::WebshareExt<R> for T {
    fn webshare(&self) -> &Webshare<R> {
        self.state::<Webshare<R>>().inner()
    }
}

/// Initializes the webshare plugin.
///
/// The Android side registers the activity as a target for `ACTION_SEND`
/// (text and images) and `ACTION_SEND_MULTIPLE` (images) and buffers every
/// intent until the shell drains it.
pub fn init<R: Runtime>() -> TauriPlugin<R> {
    Builder::new("webshare")
        .invoke_handler(tauri::generate_handler![
            commands::get_pending_share,
            commands::clear_pending_share,
        ])
        .setup(|app, api| {
            #[cfg(mobile)]
            let webshare = mobile::init(app, api)?;
            #[cfg(desktop)]
            let webshare = desktop::init(app, api)?;
            app.manage(webshare);
            Ok(())
        })
        .build()
}
