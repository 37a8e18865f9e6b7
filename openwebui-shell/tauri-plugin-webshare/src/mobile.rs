use serde::de::DeserializeOwned;
use tauri::{
    plugin::{PluginApi, PluginHandle},
    AppHandle, Runtime,
};

use crate::models::*;

pub fn init<R: Runtime, C: DeserializeOwned>(
    _app: &AppHandle<R>,
    api: PluginApi<R, C>,
) -> crate::Result<Webshare<R>> {
    #[cfg(target_os = "android")]
    let handle = api.register_android_plugin("com.openwebui.shell.webshare", "WebsharePlugin")?;
    #[cfg(target_os = "ios")]
    let handle: PluginHandle<R> = {
        drop(api);
        return Err(crate::Error::Unsupported);
    };
    Ok(Webshare(handle))
}

/// Access to the share intents buffered by the Android activity.
pub struct Webshare<R: Runtime>(PluginHandle<R>);

impl<R: Runtime> Webshare<R> {
    /// Intents that arrived through `onCreate` or `onNewIntent` and have not
    /// been cleared yet.
    pub fn get_pending_share(&self) -> crate::Result<PendingShareResponse> {
        self.0
            .run_mobile_plugin("getPendingShare", ())
            .map_err(Into::into)
    }

    pub fn clear_pending_share(&self) -> crate::Result<()> {
        // Kotlin resolves with an empty JSObject
        self.0
            .run_mobile_plugin::<serde_json::Value>("clearPendingShare", ())
            .map(|_| ())
            .map_err(Into::into)
    }
}
