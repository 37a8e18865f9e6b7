//! Tauri host: a webview window driven by the bridge controller.
//!
//! The window forwards what it observes (navigations, page loads, downloads,
//! page messages, touches) as [`ShellEvent`]s and carries out the
//! [`HostCommand`]s the controller sends back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tauri::webview::{DownloadEvent, PageLoadEvent};
use tauri::{
    AppHandle, Emitter, Manager, RunEvent, State, WebviewUrl, WebviewWindow,
    WebviewWindowBuilder, WindowEvent,
};
use tauri_plugin_opener::OpenerExt;
use tauri_plugin_webshare::{SharedAction, SharedIntent, WebshareExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::bridge::{PageEvent, PageTransport, ScriptTransport};
use crate::controller::{
    post_event, spawn_controller, HostCommand, NavigationGuard, ShellEvent, ShellHandle,
};
use crate::downloads::DownloadRequest;
use crate::error::{Result, ShellError};
use crate::gesture::TouchEvent;
use crate::lifecycle::BLANK_PAGE;
use crate::media::PermissionSnapshot;
use crate::navigation::NavigationDecision;
use crate::settings::{startup_route, JsonSettingsStore, SettingsStore, StartupRoute};
use crate::share::{IncomingShare, ShareAction, SharePayload};

const MAIN_WINDOW: &str = "main";
const SETTINGS_FILE: &str = "settings.json";

/// Touch forwarding and the gesture progress bar, installed before any page script runs.
const TOUCH_SCRIPT: &str = r#"(function() {
  if (window.__openwebuiShell) return;
  var invoke = function(cmd, args) {
    if (window.__TAURI_INTERNALS__) window.__TAURI_INTERNALS__.invoke(cmd, args);
  };
  var forward = function(kind) {
    return function(e) {
      for (var i = 0; i < e.changedTouches.length; i++) {
        invoke('touch_event', { kind: kind, pointer: e.changedTouches[i].identifier });
      }
    };
  };
  var opts = { capture: true, passive: true };
  window.addEventListener('touchstart', forward('down'), opts);
  window.addEventListener('touchend', forward('up'), opts);
  window.addEventListener('touchcancel', function() {
    invoke('touch_event', { kind: 'cancel', pointer: 0 });
  }, opts);

  var bar = null;
  window.__openwebuiShell = {
    progress: function(p) {
      if (!document.body) return;
      if (!bar) {
        bar = document.createElement('div');
        bar.style.cssText = 'position:fixed;top:0;left:0;height:4px;background:#4a90d9;z-index:2147483647;';
        document.body.appendChild(bar);
      }
      bar.style.display = p < 0 ? 'none' : 'block';
      bar.style.width = Math.max(p, 0) + '%';
    }
  };
})();"#;

/// Shared between the controller task and tauri commands.
#[derive(Default)]
pub struct HostState {
    events: RwLock<Option<mpsc::Sender<ShellEvent>>>,
    downloads: Mutex<HashMap<String, Uuid>>,
}

impl HostState {
    async fn send(&self, event: ShellEvent) -> Result<()> {
        let tx = self.events.read().await;
        match tx.as_ref() {
            Some(tx) => tx.send(event).await.map_err(|_| ShellError::ChannelSend),
            None => Err(ShellError::NotInitialized),
        }
    }

    fn track_download(&self, url: &str, download_id: Uuid) {
        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.insert(url.to_string(), download_id);
        }
    }

    fn finish_download(&self, url: &str) -> Option<Uuid> {
        self.downloads.lock().ok()?.remove(url)
    }
}

pub fn run(context: tauri::Context<tauri::Wry>) {
    crate::init_tracing();
    info!("Starting Open WebUI shell...");

    let app = tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_webshare::init())
        .manage(HostState::default())
        .setup(|app| {
            let app_handle = app.handle().clone();
            let settings = open_settings(&app_handle)?;

            tauri::async_runtime::spawn(async move {
                if let Err(e) = initialize_shell(app_handle, settings).await {
                    error!("Failed to initialize shell: {}", e);
                }
            });

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            page_message,
            touch_event,
            settings_submitted,
        ])
        .build(context);

    let app = match app {
        Ok(app) => app,
        Err(e) => {
            error!("Error while building tauri application: {}", e);
            return;
        }
    };

    app.run(|app_handle, event| {
        if let RunEvent::Exit = event {
            let state = app_handle.state::<HostState>();
            if let Err(e) = tauri::async_runtime::block_on(state.send(ShellEvent::Shutdown)) {
                debug!("Controller already gone at exit: {}", e);
            }
        }
    });
}

fn open_settings(app: &AppHandle) -> Result<Arc<dyn SettingsStore>> {
    let dir = app
        .path()
        .app_data_dir()
        .map_err(|e| ShellError::Config(format!("Failed to get app data dir: {}", e)))?;
    let store = JsonSettingsStore::open(dir.join(SETTINGS_FILE))?;
    info!("Settings at {:?}", store.path());
    Ok(Arc::new(store))
}

async fn initialize_shell(app: AppHandle, settings: Arc<dyn SettingsStore>) -> Result<()> {
    let route = startup_route(&settings.settings());

    // The webview handles its own runtime prompts, so start from "unknown"
    // and answer every OS prompt as granted.
    let ShellHandle {
        events,
        mut commands,
        guard,
        task: _,
    } = spawn_controller(settings.clone(), PermissionSnapshot::default());

    {
        let state = app.state::<HostState>();
        let mut tx = state.events.write().await;
        *tx = Some(events.clone());
    }

    let window = build_window(&app, guard)?;
    let transport = ScriptTransport::new({
        let window = window.clone();
        move |script: &str| {
            window
                .eval(script)
                .map_err(|e| ShellError::Host(e.to_string()))
        }
    });

    match route {
        StartupRoute::Shell(_) => send(&events, ShellEvent::Start).await?,
        other => {
            info!("Setup required ({:?}), asking for a server URL", other);
            show_settings(&window, settings.server_url())?;
        }
    }
    forward_pending_shares(&app, &events).await;

    while let Some(command) = commands.recv().await {
        if let Err(e) = execute(&app, &window, &transport, &events, command) {
            warn!("Host command failed: {}", e);
        }
    }

    info!("Controller closed its command channel");
    Ok(())
}

fn build_window(app: &AppHandle, guard: NavigationGuard) -> Result<WebviewWindow> {
    let opener = app.clone();
    let loads = app.clone();
    let downloads = app.clone();

    let window = WebviewWindowBuilder::new(
        app,
        MAIN_WINDOW,
        WebviewUrl::External(Url::parse(BLANK_PAGE)?),
    )
    .title("Open WebUI")
    .initialization_script(TOUCH_SCRIPT)
    .on_navigation(move |url| match guard.check(url.as_str()) {
        NavigationDecision::LoadInPlace => true,
        NavigationDecision::OpenExternal(target) => {
            if let Err(e) = opener.opener().open_url(target, None::<&str>) {
                warn!("Failed to open external URL: {}", e);
            }
            false
        }
    })
    .on_page_load(move |_window, payload| {
        let url = payload.url().to_string();
        let event = match payload.event() {
            PageLoadEvent::Started => ShellEvent::PageLoadStarted { url },
            PageLoadEvent::Finished => ShellEvent::PageLoadFinished { url },
        };
        forward(&loads, event);
    })
    .on_download(move |_webview, event| match event {
        DownloadEvent::Requested { url, destination } => {
            let ticket = DownloadRequest {
                url: url.to_string(),
                user_agent: None,
                content_disposition: None,
                mime_type: None,
            }
            .into_ticket();
            match downloads.path().download_dir() {
                Ok(dir) => *destination = dir.join(&ticket.file_name),
                Err(e) => warn!("No download directory, keeping default: {}", e),
            }
            downloads
                .state::<HostState>()
                .track_download(&ticket.url, ticket.download_id);
            true
        }
        DownloadEvent::Finished { url, path, success } => {
            let state = downloads.state::<HostState>();
            let download_id = state
                .finish_download(url.as_str())
                .unwrap_or_else(Uuid::new_v4);
            let file_name = path
                .as_ref()
                .and_then(|p| p.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            forward(
                &downloads,
                ShellEvent::DownloadFinished {
                    download_id,
                    file_name,
                    success,
                },
            );
            true
        }
        _ => true,
    })
    .build()
    .map_err(|e| ShellError::Host(format!("Failed to create window: {}", e)))?;

    let focus = app.clone();
    window.on_window_event(move |event| match event {
        WindowEvent::Focused(true) => {
            let app = focus.clone();
            tauri::async_runtime::spawn(async move {
                let state = app.state::<HostState>();
                let tx = state.events.read().await.clone();
                if let Some(tx) = tx {
                    forward_pending_shares(&app, &tx).await;
                }
            });
        }
        WindowEvent::Destroyed => forward(&focus, ShellEvent::ScreenDestroyed),
        _ => {}
    });

    Ok(window)
}

/// Sends from a synchronous webview callback.
fn forward(app: &AppHandle, event: ShellEvent) {
    let app = app.clone();
    tauri::async_runtime::spawn(async move {
        if let Err(e) = app.state::<HostState>().send(event).await {
            debug!("Dropped host event: {}", e);
        }
    });
}

async fn send(events: &mpsc::Sender<ShellEvent>, event: ShellEvent) -> Result<()> {
    events.send(event).await.map_err(|_| ShellError::ChannelSend)
}

fn execute<F>(
    app: &AppHandle,
    window: &WebviewWindow,
    transport: &ScriptTransport<F>,
    events: &mpsc::Sender<ShellEvent>,
    command: HostCommand,
) -> Result<()>
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    match command {
        HostCommand::LoadUrl(url) => window
            .navigate(Url::parse(&url)?)
            .map_err(|e| ShellError::Host(e.to_string())),
        HostCommand::OpenExternal(url) => app
            .opener()
            .open_url(url, None::<&str>)
            .map_err(|e| ShellError::Host(e.to_string())),
        HostCommand::Page(command) => transport.deliver(&command),
        HostCommand::SetLoading(loading) => app
            .emit("shell-loading", loading)
            .map_err(|e| ShellError::Host(e.to_string())),

        HostCommand::RequestPermission {
            request_id,
            capability,
        } => {
            debug!("{} prompt delegated to the webview", capability);
            post_event(
                events,
                ShellEvent::PermissionResult {
                    request_id,
                    granted: true,
                },
            );
            Ok(())
        }
        HostCommand::LaunchCamera { request_id }
        | HostCommand::OpenFilePicker { request_id, .. } => {
            // The webview shows its own chooser; nothing native to open here.
            post_event(
                events,
                ShellEvent::FileChooserCompleted {
                    request_id,
                    files: None,
                },
            );
            Ok(())
        }
        HostCommand::CompleteFileChooser { request_id, .. }
        | HostCommand::GrantWebPermission { request_id, .. }
        | HostCommand::DenyWebPermission { request_id } => {
            debug!("Request {} is handled by the webview", request_id);
            Ok(())
        }

        HostCommand::ShowGestureProgress(progress) => {
            eval(window, &format!("window.__openwebuiShell && window.__openwebuiShell.progress({});", progress))
        }
        HostCommand::HideGestureProgress => {
            eval(window, "window.__openwebuiShell && window.__openwebuiShell.progress(-1);")
        }
        HostCommand::ShowSettings { current_url } => show_settings(window, current_url),
        HostCommand::SettingsRejected { reason } => {
            eval(window, &format!("window.alert({});", serde_json::to_string(&reason)?))
        }
        HostCommand::GoBack => eval(window, "window.history.back();"),
        HostCommand::Exit => {
            app.exit(0);
            Ok(())
        }
        HostCommand::EnqueueDownload(ticket) => {
            info!("Download {} ({}) started by the webview", ticket.download_id, ticket.file_name);
            Ok(())
        }
    }
}

fn eval(window: &WebviewWindow, script: &str) -> Result<()> {
    window
        .eval(script)
        .map_err(|e| ShellError::Host(e.to_string()))
}

/// Asks for the server URL with a prompt and submits the answer.
fn show_settings(window: &WebviewWindow, current_url: Option<String>) -> Result<()> {
    let current = serde_json::to_string(&current_url.unwrap_or_default())?;
    eval(
        window,
        &format!(
            "(function() {{ var u = window.prompt('Open WebUI server URL', {}); \
             if (u !== null && window.__TAURI_INTERNALS__) {{ \
             window.__TAURI_INTERNALS__.invoke('settings_submitted', {{ url: u }}); }} }})();",
            current
        ),
    )
}

async fn forward_pending_shares(app: &AppHandle, events: &mpsc::Sender<ShellEvent>) {
    for payload in take_pending_shares(app) {
        if let Err(e) = send(events, ShellEvent::ShareReceived(payload)).await {
            warn!("Failed to forward share: {}", e);
        }
    }
}

fn take_pending_shares(app: &AppHandle) -> Vec<SharePayload> {
    let response = match app.webshare().get_pending_share() {
        Ok(response) => response,
        Err(e) => {
            warn!("Failed to read pending shares: {}", e);
            return Vec::new();
        }
    };
    if !response.has_pending {
        return Vec::new();
    }
    if let Err(e) = app.webshare().clear_pending_share() {
        warn!("Failed to clear pending shares: {}", e);
    }

    response
        .shares
        .into_iter()
        .filter_map(|intent| incoming_share(intent).into_payload())
        .collect()
}

fn incoming_share(intent: SharedIntent) -> IncomingShare {
    IncomingShare {
        action: match intent.action {
            SharedAction::Send => ShareAction::Send,
            SharedAction::SendMultiple => ShareAction::SendMultiple,
        },
        mime_type: intent.mime_type,
        text: intent.text,
        uris: intent.uris,
    }
}

#[tauri::command]
async fn page_message(state: State<'_, HostState>, message: String) -> Result<()> {
    let event = PageEvent::from_json(&message)?;
    state.send(ShellEvent::Page(event)).await
}

#[tauri::command]
async fn touch_event(state: State<'_, HostState>, kind: String, pointer: i32) -> Result<()> {
    let touch = match kind.as_str() {
        "down" => TouchEvent::Down(pointer),
        "up" => TouchEvent::Up(pointer),
        "cancel" => TouchEvent::Cancel,
        other => return Err(ShellError::Transport(format!("unknown touch kind {}", other))),
    };
    state.send(ShellEvent::Touch(touch)).await
}

#[tauri::command]
async fn settings_submitted(state: State<'_, HostState>, url: String) -> Result<()> {
    state.send(ShellEvent::SettingsSubmitted { url }).await
}
