use serde::de::DeserializeOwned;
use tauri::{plugin::PluginApi, AppHandle, Runtime};

use crate::models::*;

pub fn init<R: Runtime, C: DeserializeOwned>(
    app: &AppHandle<R>,
    _api: PluginApi<R, C>,
) -> crate::Result<Webshare<R>> {
    Ok(Webshare(app.clone()))
}

/// Desktop stub. There is no share sheet, so nothing is ever pending.
pub struct Webshare<R: Runtime>(AppHandle<R>);

impl<R: Runtime> Webshare<R> {
    pub fn get_pending_share(&self) -> crate::Result<PendingShareResponse> {
        Ok(PendingShareResponse::default())
    }

    pub fn clear_pending_share(&self) -> crate::Result<()> {
        Ok(())
    }
}
