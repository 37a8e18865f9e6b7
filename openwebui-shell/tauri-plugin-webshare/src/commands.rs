use tauri::{command, AppHandle, Runtime};

use crate::models::*;
use crate::Result;
use crate::WebshareExt;

/// Share intents received since the last call to `clear_pending_share`.
#[command]
pub(crate) async fn get_pending_share<R: Runtime>(
    app: AppHandle<R>,
) -> Result<PendingShareResponse> {
    app.webshare().get_pending_share()
}

#[command]
pub(crate) async fn clear_pending_share<R: Runtime>(app: AppHandle<R>) -> Result<()> {
    app.webshare().clear_pending_share()
}
