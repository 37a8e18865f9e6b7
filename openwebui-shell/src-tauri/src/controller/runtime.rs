//! The bridge controller event loop.
//!
//! All bridge state lives on one task. Host callbacks and OS results come in
//! as [`ShellEvent`]s, and every effect goes out as a [`HostCommand`]. Timers
//! are spawned tasks that post back into the same loop and are aborted when
//! the state that armed them ends.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::events::{FileChooserRequest, HostCommand, ShellEvent, WebResource};
use crate::bridge::{PageCommand, PageEvent};
use crate::downloads::log_download_outcome;
use crate::error::{Result, ShellError};
use crate::gesture::{GestureConfig, GestureSignal, SettingsUnlock, PROGRESS_INTERVAL};
use crate::lifecycle::{LoadState, LoadSupervisor, BLANK_PAGE};
use crate::media::{MediaAction, MediaBridge, PermissionSnapshot, RequestId, RequestOrigin};
use crate::navigation::{validate_url, NavigationDecision, NavigationPolicy};
use crate::settings::{complete_setup, SettingsStore};
use crate::share::{IngestionBridge, ShareMessage, SharePayload};

const CHANNEL_CAPACITY: usize = 100;
const MICROPHONE_DENIED: &str = "Microphone permission denied";

/// Synchronous view of the navigation policy for host callbacks that must
/// answer immediately (e.g. a webview's navigation handler).
#[derive(Debug, Clone)]
pub struct NavigationGuard {
    policy: Arc<RwLock<NavigationPolicy>>,
}

impl NavigationGuard {
    fn new(policy: NavigationPolicy) -> Self {
        Self {
            policy: Arc::new(RwLock::new(policy)),
        }
    }

    pub fn check(&self, url: &str) -> NavigationDecision {
        match self.policy.read() {
            Ok(policy) => policy.intercept(url),
            Err(poisoned) => poisoned.into_inner().intercept(url),
        }
    }

    fn policy(&self) -> NavigationPolicy {
        match self.policy.read() {
            Ok(policy) => policy.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_base_url(&self, base_url: &str) {
        match self.policy.write() {
            Ok(mut policy) => policy.set_base_url(base_url),
            Err(poisoned) => poisoned.into_inner().set_base_url(base_url),
        }
    }
}

/// Channels and handles of a running controller.
pub struct ShellHandle {
    pub events: mpsc::Sender<ShellEvent>,
    pub commands: mpsc::Receiver<HostCommand>,
    pub guard: NavigationGuard,
    pub task: JoinHandle<()>,
}

/// Spawns the controller on the current tokio runtime.
pub fn spawn_controller(
    settings: Arc<dyn SettingsStore>,
    permissions: PermissionSnapshot,
) -> ShellHandle {
    let (event_tx, event_rx) = mpsc::channel::<ShellEvent>(CHANNEL_CAPACITY);
    let (command_tx, command_rx) = mpsc::channel::<HostCommand>(CHANNEL_CAPACITY);

    let controller = BridgeController::new(settings, permissions, command_tx, event_tx.clone());
    let guard = controller.navigation_guard();
    let task = tokio::spawn(async move {
        if let Err(e) = controller.run(event_rx).await {
            error!("Bridge controller stopped: {}", e);
        }
    });

    ShellHandle {
        events: event_tx,
        commands: command_rx,
        guard,
        task,
    }
}

/// Queues an event without waiting on channel capacity.
///
/// For hosts that answer commands with events from inside their command
/// loop: awaiting the send there can deadlock against a controller that is
/// itself waiting to emit.
pub fn post_event(events: &mpsc::Sender<ShellEvent>, event: ShellEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            let events = events.clone();
            tokio::spawn(async move {
                if events.send(event).await.is_err() {
                    debug!("Controller gone, dropping posted event");
                }
            });
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("Controller gone, dropping posted event");
        }
    }
}

pub struct BridgeController {
    settings: Arc<dyn SettingsStore>,
    guard: NavigationGuard,
    supervisor: LoadSupervisor,
    media: MediaBridge,
    ingestion: IngestionBridge,
    unlock: SettingsUnlock,
    file_chooser: Option<FileChooserRequest>,
    web_audio_requests: Vec<(RequestId, Vec<WebResource>)>,
    commands: mpsc::Sender<HostCommand>,
    events: mpsc::Sender<ShellEvent>,
    load_timer: Option<JoinHandle<()>>,
    gesture_timer: Option<JoinHandle<()>>,
    gesture_generation: u64,
    detached: bool,
}

impl BridgeController {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        permissions: PermissionSnapshot,
        commands: mpsc::Sender<HostCommand>,
        events: mpsc::Sender<ShellEvent>,
    ) -> Self {
        let config = settings.settings();
        let policy = NavigationPolicy::new(
            config.server_url.clone().unwrap_or_default(),
            config.custom_scheme.clone(),
        );

        Self {
            guard: NavigationGuard::new(policy),
            supervisor: LoadSupervisor::new(Duration::from_millis(config.load_timeout_ms)),
            media: MediaBridge::new(permissions),
            ingestion: IngestionBridge::new(),
            unlock: SettingsUnlock::new(GestureConfig {
                required_fingers: config.required_fingers,
                long_press: Duration::from_millis(config.long_press_ms),
            }),
            file_chooser: None,
            web_audio_requests: Vec::new(),
            commands,
            events,
            load_timer: None,
            gesture_timer: None,
            gesture_generation: 0,
            detached: false,
            settings,
        }
    }

    pub fn navigation_guard(&self) -> NavigationGuard {
        self.guard.clone()
    }

    pub fn supervisor(&self) -> &LoadSupervisor {
        &self.supervisor
    }

    pub fn media(&self) -> &MediaBridge {
        &self.media
    }

    pub fn pending_shares(&self) -> usize {
        self.ingestion.pending()
    }

    /// Processes events until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<ShellEvent>) -> Result<()> {
        info!("Bridge controller running");
        while let Some(event) = events.recv().await {
            match self.handle(event).await {
                Ok(true) => {}
                Ok(false) => break,
                Err(ShellError::ChannelSend) => {
                    self.cancel_timers();
                    return Err(ShellError::ChannelSend);
                }
                Err(e) => warn!("Failed to handle event: {}", e),
            }
        }
        self.cancel_timers();
        info!("Bridge controller stopped");
        Ok(())
    }

    /// Handles one event. Returns false once the loop should stop.
    pub async fn handle(&mut self, event: ShellEvent) -> Result<bool> {
        match event {
            ShellEvent::Start => self.start().await?,
            ShellEvent::OpenUrl { url } => self.open_url(&url).await?,

            ShellEvent::PageLoadStarted { url } => {
                let loading = matches!(self.supervisor.state(), LoadState::Loading { .. });
                if url != BLANK_PAGE && !loading {
                    let generation = self.supervisor.begin_navigation();
                    self.arm_load_timer(generation);
                    self.emit(HostCommand::SetLoading(true)).await?;
                }
            }
            ShellEvent::PageLoadFinished { url } => {
                if url == BLANK_PAGE {
                    debug!("Neutral page shown");
                } else {
                    self.page_finished(&url).await?;
                }
            }
            ShellEvent::PageLoadFailed { url, description } => {
                self.disarm_load_timer();
                debug!("Load of {} failed", url);
                if self.supervisor.on_load_error(&description) {
                    self.show_neutral_page().await?;
                }
            }
            ShellEvent::LoadTimeout { generation } => {
                if self.supervisor.on_timeout(generation) {
                    self.load_timer = None;
                    self.show_neutral_page().await?;
                }
            }

            ShellEvent::Page(PageEvent::Log { message }) => {
                debug!(target: "page", "JavaScript: {}", message);
            }
            ShellEvent::Page(PageEvent::RequestMicrophonePermission) => {
                debug!("Microphone permission requested from page");
                let actions = self.media.request_microphone(RequestOrigin::PageRequest);
                self.apply_media(actions).await?;
            }
            ShellEvent::ShareReceived(payload) => {
                if let Some(payload) = self.ingestion.ingest(payload, self.supervisor.is_ready()) {
                    self.deliver_share(payload).await?;
                }
            }

            ShellEvent::PermissionResult {
                request_id,
                granted,
            } => {
                let actions = self.media.on_permission_result(request_id, granted);
                self.apply_media(actions).await?;
            }
            ShellEvent::FileChooserRequested { capture, multiple } => {
                self.open_file_chooser(capture, multiple).await?;
            }
            ShellEvent::FileChooserCompleted { request_id, files } => {
                match self.file_chooser {
                    Some(chooser) if chooser.request_id == request_id => {
                        let files = files.filter(|f| !f.is_empty());
                        self.complete_file_chooser(files).await?;
                    }
                    _ => warn!("Ignoring result of stale file chooser {}", request_id),
                }
            }
            ShellEvent::WebPermissionRequested {
                request_id,
                resources,
            } => self.web_permission(request_id, resources).await?,

            ShellEvent::Touch(touch) => {
                let signal = self.unlock.on_touch(touch, Instant::now());
                self.apply_gesture(signal).await?;
            }
            ShellEvent::GestureTick { generation } => {
                if generation == self.gesture_generation && self.gesture_timer.is_some() {
                    let signal = self.unlock.on_tick(Instant::now());
                    self.apply_gesture(signal).await?;
                }
            }
            ShellEvent::SettingsSubmitted { url } => self.submit_settings(&url).await?,
            ShellEvent::BackPressed { can_go_back } => {
                let command = if can_go_back {
                    HostCommand::GoBack
                } else {
                    HostCommand::Exit
                };
                self.emit(command).await?;
            }

            ShellEvent::DownloadRequested(request) => {
                self.emit(HostCommand::EnqueueDownload(request.into_ticket()))
                    .await?;
            }
            ShellEvent::DownloadFinished {
                download_id,
                file_name,
                success,
            } => log_download_outcome(download_id, &file_name, success),

            ShellEvent::ScreenDestroyed => {
                info!("Screen destroyed, detaching bridge");
                self.detached = true;
                self.cancel_timers();
            }
            ShellEvent::Shutdown => return Ok(false),
        }
        Ok(true)
    }

    async fn start(&mut self) -> Result<()> {
        let actions = self.media.request_microphone(RequestOrigin::Startup);
        self.apply_media(actions).await?;

        let Some(url) = self.settings.server_url() else {
            error!("No server URL configured, asking for one");
            return self
                .emit(HostCommand::ShowSettings { current_url: None })
                .await;
        };
        self.guard.set_base_url(&url);
        self.navigate(url).await
    }

    async fn open_url(&mut self, raw_url: &str) -> Result<()> {
        info!("Received URL: {}", raw_url);
        match self.guard.policy().authorize(raw_url) {
            Ok(authorized) => self.navigate(authorized.to_string()).await,
            Err(e) => {
                warn!("Not loading {}: {}", raw_url, e);
                Ok(())
            }
        }
    }

    async fn navigate(&mut self, url: String) -> Result<()> {
        let generation = self.supervisor.begin_navigation();
        self.arm_load_timer(generation);
        self.emit(HostCommand::SetLoading(true)).await?;
        self.emit(HostCommand::LoadUrl(url)).await
    }

    async fn page_finished(&mut self, url: &str) -> Result<()> {
        self.disarm_load_timer();
        if !self.supervisor.on_load_finished() {
            return Ok(());
        }
        info!("WebView loaded: {}", url);

        self.emit(HostCommand::SetLoading(false)).await?;
        self.emit(HostCommand::Page(PageCommand::InstallBridge)).await?;
        for payload in self.ingestion.flush() {
            self.deliver_share(payload).await?;
        }
        Ok(())
    }

    async fn show_neutral_page(&mut self) -> Result<()> {
        error!("Connection failed or timed out");
        self.emit(HostCommand::SetLoading(false)).await?;
        self.emit(HostCommand::LoadUrl(BLANK_PAGE.to_string())).await
    }

    async fn deliver_share(&mut self, payload: SharePayload) -> Result<()> {
        let message = ShareMessage::resolve(payload, self.settings.as_ref());
        debug!("Sending {} share to page", message.payload.kind());
        self.emit(HostCommand::Page(PageCommand::SharedContent(message)))
            .await
    }

    async fn open_file_chooser(&mut self, capture: bool, multiple: bool) -> Result<()> {
        if self.file_chooser.is_some() {
            debug!("Replacing outstanding file chooser");
            self.complete_file_chooser(None).await?;
        }

        let request_id = Uuid::new_v4();
        self.file_chooser = Some(FileChooserRequest {
            request_id,
            capture,
        });
        debug!("File chooser {} (capture: {}, multiple: {})", request_id, capture, multiple);

        if capture {
            let actions = self.media.request_camera();
            self.apply_media(actions).await
        } else {
            self.emit(HostCommand::OpenFilePicker {
                request_id,
                multiple,
            })
            .await
        }
    }

    async fn complete_file_chooser(&mut self, files: Option<Vec<String>>) -> Result<()> {
        if let Some(chooser) = self.file_chooser.take() {
            self.emit(HostCommand::CompleteFileChooser {
                request_id: chooser.request_id,
                files,
            })
            .await?;
        }
        Ok(())
    }

    async fn web_permission(
        &mut self,
        request_id: RequestId,
        resources: Vec<WebResource>,
    ) -> Result<()> {
        if !resources.contains(&WebResource::AudioCapture) {
            debug!("Granting web permissions: {:?}", resources);
            return self
                .emit(HostCommand::GrantWebPermission {
                    request_id,
                    resources,
                })
                .await;
        }

        self.web_audio_requests.push((request_id, resources));
        let actions = self.media.request_microphone(RequestOrigin::PageRequest);
        self.apply_media(actions).await
    }

    async fn apply_media(&mut self, actions: Vec<MediaAction>) -> Result<()> {
        for action in actions {
            match action {
                MediaAction::Prompt {
                    request_id,
                    capability,
                } => {
                    self.emit(HostCommand::RequestPermission {
                        request_id,
                        capability,
                    })
                    .await?
                }
                MediaAction::LaunchCamera => match self.file_chooser {
                    Some(chooser) if chooser.capture => {
                        self.emit(HostCommand::LaunchCamera {
                            request_id: chooser.request_id,
                        })
                        .await?
                    }
                    _ => debug!("Camera granted but no capture request is waiting"),
                },
                MediaAction::CompleteFileChooserEmpty => match self.file_chooser {
                    Some(chooser) if chooser.capture => self.complete_file_chooser(None).await?,
                    _ => debug!("Camera denied but no capture request is waiting"),
                },
                MediaAction::NotifyMicrophone { granted } => {
                    self.notify_microphone(granted).await?
                }
            }
        }
        Ok(())
    }

    async fn notify_microphone(&mut self, granted: bool) -> Result<()> {
        for (request_id, resources) in std::mem::take(&mut self.web_audio_requests) {
            let command = if granted {
                HostCommand::GrantWebPermission {
                    request_id,
                    resources,
                }
            } else {
                HostCommand::DenyWebPermission { request_id }
            };
            self.emit(command).await?;
        }

        if !self.supervisor.is_ready() {
            debug!("Page not ready, microphone outcome not delivered");
            return Ok(());
        }
        let command = if granted {
            PageCommand::MicrophoneGranted
        } else {
            PageCommand::MicrophoneDenied {
                error: MICROPHONE_DENIED.to_string(),
            }
        };
        self.emit(HostCommand::Page(command)).await
    }

    async fn apply_gesture(&mut self, signal: Option<GestureSignal>) -> Result<()> {
        match signal {
            None => Ok(()),
            Some(GestureSignal::PressStarted) => {
                self.start_gesture_timer();
                self.emit(HostCommand::ShowGestureProgress(0)).await
            }
            Some(GestureSignal::Progress(progress)) => {
                self.emit(HostCommand::ShowGestureProgress(progress)).await
            }
            Some(GestureSignal::Aborted) => {
                self.stop_gesture_timer();
                self.emit(HostCommand::HideGestureProgress).await
            }
            Some(GestureSignal::OpenSettings) => {
                self.stop_gesture_timer();
                self.emit(HostCommand::HideGestureProgress).await?;
                self.emit(HostCommand::ShowSettings {
                    current_url: self.settings.server_url(),
                })
                .await
            }
        }
    }

    async fn submit_settings(&mut self, raw_url: &str) -> Result<()> {
        let url = raw_url.trim();
        let rejection = if url.is_empty() {
            Some("Please enter a URL".to_string())
        } else if !validate_url(url) {
            Some(format!("Invalid server URL: {}", url))
        } else if let Err(e) = complete_setup(self.settings.as_ref(), url) {
            Some(e.to_string())
        } else {
            None
        };

        if let Some(reason) = rejection {
            warn!("Settings rejected: {}", reason);
            return self.emit(HostCommand::SettingsRejected { reason }).await;
        }

        info!("Server URL changed to {}", url);
        self.guard.set_base_url(url);
        self.navigate(url.to_string()).await
    }

    fn arm_load_timer(&mut self, generation: u64) {
        self.disarm_load_timer();
        let events = self.events.clone();
        let timeout = self.supervisor.timeout();
        self.load_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(ShellEvent::LoadTimeout { generation }).await;
        }));
    }

    fn disarm_load_timer(&mut self) {
        if let Some(timer) = self.load_timer.take() {
            timer.abort();
        }
    }

    fn start_gesture_timer(&mut self) {
        self.stop_gesture_timer();
        self.gesture_generation += 1;
        let generation = self.gesture_generation;
        let events = self.events.clone();
        self.gesture_timer = Some(tokio::spawn(async move {
            let mut ticks = tokio::time::interval(PROGRESS_INTERVAL);
            loop {
                ticks.tick().await;
                if events
                    .send(ShellEvent::GestureTick { generation })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }));
    }

    fn stop_gesture_timer(&mut self) {
        if let Some(timer) = self.gesture_timer.take() {
            timer.abort();
        }
    }

    fn cancel_timers(&mut self) {
        self.disarm_load_timer();
        self.stop_gesture_timer();
    }

    async fn emit(&self, command: HostCommand) -> Result<()> {
        if self.detached {
            debug!("Bridge detached, dropping {:?}", command);
            return Ok(());
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| ShellError::ChannelSend)
    }
}

impl Drop for BridgeController {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::TouchEvent;
    use crate::media::{Capability, PermissionState};
    use crate::settings::{MemorySettingsStore, ShellSettings};
    use tokio::time::timeout;

    const BASE: &str = "https://chat.example.com";

    struct Harness {
        controller: BridgeController,
        commands: mpsc::Receiver<HostCommand>,
        events: mpsc::Receiver<ShellEvent>,
        settings: Arc<MemorySettingsStore>,
    }

    impl Harness {
        fn new(permissions: PermissionSnapshot) -> Self {
            let mut config = ShellSettings::default();
            config.server_url = Some(BASE.to_string());
            config.setup_complete = true;
            config.selected_model = "llama3".to_string();
            let settings = Arc::new(MemorySettingsStore::new(config));

            let (command_tx, commands) = mpsc::channel(CHANNEL_CAPACITY);
            let (event_tx, events) = mpsc::channel(CHANNEL_CAPACITY);
            let controller =
                BridgeController::new(settings.clone(), permissions, command_tx, event_tx);
            Self {
                controller,
                commands,
                events,
                settings,
            }
        }

        fn all_granted() -> Self {
            Self::new(PermissionSnapshot {
                camera: PermissionState::Granted,
                microphone: PermissionState::Granted,
            })
        }

        async fn send(&mut self, event: ShellEvent) -> Vec<HostCommand> {
            assert!(self.controller.handle(event).await.unwrap());
            self.drain()
        }

        fn drain(&mut self) -> Vec<HostCommand> {
            let mut out = Vec::new();
            while let Ok(command) = self.commands.try_recv() {
                out.push(command);
            }
            out
        }

        async fn load(&mut self) -> Vec<HostCommand> {
            self.send(ShellEvent::Start).await;
            self.send(ShellEvent::PageLoadFinished {
                url: BASE.to_string(),
            })
            .await
        }

        /// Feeds timer events back into the controller until none arrive for a while.
        async fn pump_timers(&mut self) -> Vec<HostCommand> {
            let mut out = Vec::new();
            while let Ok(Some(event)) = timeout(Duration::from_secs(1), self.events.recv()).await {
                out.extend(self.send(event).await);
            }
            out
        }
    }

    fn text(content: &str) -> SharePayload {
        SharePayload::Text {
            content: content.to_string(),
        }
    }

    fn shared(commands: &[HostCommand]) -> Vec<SharePayload> {
        commands
            .iter()
            .filter_map(|c| match c {
                HostCommand::Page(PageCommand::SharedContent(msg)) => Some(msg.payload.clone()),
                _ => None,
            })
            .collect()
    }

    fn permission_prompt(commands: &[HostCommand], wanted: Capability) -> Option<RequestId> {
        commands.iter().find_map(|c| match c {
            HostCommand::RequestPermission {
                request_id,
                capability,
            } if *capability == wanted => Some(*request_id),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_start_requests_microphone_and_loads_base_url() {
        let mut h = Harness::new(PermissionSnapshot::default());
        let commands = h.send(ShellEvent::Start).await;

        assert!(permission_prompt(&commands, Capability::Microphone).is_some());
        assert_eq!(
            &commands[1..],
            &[
                HostCommand::SetLoading(true),
                HostCommand::LoadUrl(BASE.to_string()),
            ]
        );
        assert!(h.controller.supervisor().readiness().timeout_armed);
    }

    #[tokio::test]
    async fn test_start_without_server_url_asks_for_one_and_keeps_running() {
        let settings: Arc<dyn SettingsStore> = Arc::new(MemorySettingsStore::default());
        let mut handle = spawn_controller(
            settings.clone(),
            PermissionSnapshot {
                camera: PermissionState::Granted,
                microphone: PermissionState::Granted,
            },
        );

        handle.events.send(ShellEvent::Start).await.unwrap();
        assert_eq!(
            handle.commands.recv().await,
            Some(HostCommand::ShowSettings { current_url: None })
        );
        assert!(!handle.task.is_finished(), "Missing configuration must not stop the loop");

        handle
            .events
            .send(ShellEvent::SettingsSubmitted {
                url: "https://chat.example.com".into(),
            })
            .await
            .unwrap();
        assert_eq!(handle.commands.recv().await, Some(HostCommand::SetLoading(true)));
        assert_eq!(
            handle.commands.recv().await,
            Some(HostCommand::LoadUrl("https://chat.example.com".into()))
        );
        assert_eq!(settings.server_url().as_deref(), Some("https://chat.example.com"));

        handle.events.send(ShellEvent::Shutdown).await.unwrap();
        handle.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shares_before_ready_flush_in_order_after_ready() {
        let mut h = Harness::all_granted();
        h.send(ShellEvent::Start).await;

        assert!(h.send(ShellEvent::ShareReceived(text("first"))).await.is_empty());
        assert!(h.send(ShellEvent::ShareReceived(text("second"))).await.is_empty());
        assert_eq!(h.controller.pending_shares(), 2);

        let commands = h
            .send(ShellEvent::PageLoadFinished {
                url: BASE.to_string(),
            })
            .await;
        assert_eq!(commands[0], HostCommand::SetLoading(false));
        assert_eq!(commands[1], HostCommand::Page(PageCommand::InstallBridge));
        assert_eq!(shared(&commands), vec![text("first"), text("second")]);

        let again = h
            .send(ShellEvent::PageLoadFinished {
                url: BASE.to_string(),
            })
            .await;
        assert!(shared(&again).is_empty(), "Shares are delivered exactly once");

        let live = h.send(ShellEvent::ShareReceived(text("third"))).await;
        assert_eq!(shared(&live), vec![text("third")]);
    }

    #[tokio::test]
    async fn test_share_message_carries_configured_model() {
        let mut h = Harness::all_granted();
        h.load().await;
        let commands = h
            .send(ShellEvent::ShareReceived(SharePayload::Image {
                uri: "content://img".into(),
            }))
            .await;
        match &commands[..] {
            [HostCommand::Page(PageCommand::SharedContent(msg))] => {
                assert_eq!(msg.model, "llama3");
                assert_eq!(msg.prefilled_message, "");
            }
            other => panic!("unexpected commands {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_timeout_fires_once() {
        let mut h = Harness::all_granted();
        h.send(ShellEvent::Start).await;

        let event = h.events.recv().await.unwrap();
        assert!(matches!(event, ShellEvent::LoadTimeout { .. }));
        let commands = h.send(event.clone()).await;
        assert_eq!(
            commands,
            vec![
                HostCommand::SetLoading(false),
                HostCommand::LoadUrl(BLANK_PAGE.to_string()),
            ]
        );

        assert!(h.send(event).await.is_empty(), "A fired watchdog never fires again");
        h.send(ShellEvent::PageLoadStarted {
            url: BLANK_PAGE.to_string(),
        })
        .await;
        h.send(ShellEvent::PageLoadFinished {
            url: BLANK_PAGE.to_string(),
        })
        .await;
        assert!(!h.controller.supervisor().is_ready());

        tokio::time::advance(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_finished_disarms_timeout() {
        let mut h = Harness::all_granted();
        h.load().await;

        tokio::time::advance(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert!(h.events.try_recv().is_err());
        assert!(h.controller.supervisor().is_ready());
    }

    #[tokio::test]
    async fn test_load_error_shows_neutral_page() {
        let mut h = Harness::all_granted();
        h.send(ShellEvent::Start).await;
        let commands = h
            .send(ShellEvent::PageLoadFailed {
                url: BASE.to_string(),
                description: "net::ERR_CONNECTION_REFUSED".into(),
            })
            .await;
        assert_eq!(
            commands.last(),
            Some(&HostCommand::LoadUrl(BLANK_PAGE.to_string()))
        );
        assert!(!h.controller.supervisor().readiness().timeout_armed);
    }

    #[tokio::test]
    async fn test_microphone_requested_twice_prompts_once() {
        let mut h = Harness::new(PermissionSnapshot::default());
        let startup = h.send(ShellEvent::Start).await;
        let prompt = permission_prompt(&startup, Capability::Microphone).unwrap();
        h.send(ShellEvent::PageLoadFinished {
            url: BASE.to_string(),
        })
        .await;

        let first = h
            .send(ShellEvent::Page(PageEvent::RequestMicrophonePermission))
            .await;
        let second = h
            .send(ShellEvent::Page(PageEvent::RequestMicrophonePermission))
            .await;
        assert!(first.is_empty() && second.is_empty(), "No second OS prompt");

        let commands = h
            .send(ShellEvent::PermissionResult {
                request_id: prompt,
                granted: true,
            })
            .await;
        assert_eq!(
            commands,
            vec![HostCommand::Page(PageCommand::MicrophoneGranted)]
        );
    }

    #[tokio::test]
    async fn test_microphone_denied_notifies_page() {
        let mut h = Harness::new(PermissionSnapshot {
            camera: PermissionState::Granted,
            microphone: PermissionState::Denied,
        });
        let startup = h.send(ShellEvent::Start).await;
        let prompt = permission_prompt(&startup, Capability::Microphone).unwrap();
        h.send(ShellEvent::PageLoadFinished {
            url: BASE.to_string(),
        })
        .await;

        h.send(ShellEvent::Page(PageEvent::RequestMicrophonePermission))
            .await;
        let commands = h
            .send(ShellEvent::PermissionResult {
                request_id: prompt,
                granted: false,
            })
            .await;
        assert_eq!(
            commands,
            vec![HostCommand::Page(PageCommand::MicrophoneDenied {
                error: MICROPHONE_DENIED.to_string()
            })]
        );
    }

    #[tokio::test]
    async fn test_granted_microphone_notifies_immediately() {
        let mut h = Harness::all_granted();
        h.load().await;
        let commands = h
            .send(ShellEvent::Page(PageEvent::RequestMicrophonePermission))
            .await;
        assert_eq!(
            commands,
            vec![HostCommand::Page(PageCommand::MicrophoneGranted)]
        );
    }

    #[tokio::test]
    async fn test_camera_denied_returns_null_file() {
        let mut h = Harness::new(PermissionSnapshot {
            camera: PermissionState::Unknown,
            microphone: PermissionState::Granted,
        });
        h.load().await;

        let commands = h
            .send(ShellEvent::FileChooserRequested {
                capture: true,
                multiple: false,
            })
            .await;
        let prompt = permission_prompt(&commands, Capability::Camera).unwrap();

        let commands = h
            .send(ShellEvent::PermissionResult {
                request_id: prompt,
                granted: false,
            })
            .await;
        assert!(matches!(
            &commands[..],
            [HostCommand::CompleteFileChooser { files: None, .. }]
        ));
    }

    #[tokio::test]
    async fn test_camera_granted_captures_and_completes() {
        let mut h = Harness::all_granted();
        h.load().await;

        let commands = h
            .send(ShellEvent::FileChooserRequested {
                capture: true,
                multiple: false,
            })
            .await;
        let request_id = match &commands[..] {
            [HostCommand::LaunchCamera { request_id }] => *request_id,
            other => panic!("expected camera launch, got {:?}", other),
        };

        let commands = h
            .send(ShellEvent::FileChooserCompleted {
                request_id,
                files: Some(vec!["content://photo.jpg".into()]),
            })
            .await;
        assert_eq!(
            commands,
            vec![HostCommand::CompleteFileChooser {
                request_id,
                files: Some(vec!["content://photo.jpg".into()]),
            }]
        );
    }

    #[tokio::test]
    async fn test_new_file_chooser_cancels_previous() {
        let mut h = Harness::all_granted();
        h.load().await;

        let first = h
            .send(ShellEvent::FileChooserRequested {
                capture: false,
                multiple: true,
            })
            .await;
        let first_id = match &first[..] {
            [HostCommand::OpenFilePicker {
                request_id,
                multiple: true,
            }] => *request_id,
            other => panic!("expected picker, got {:?}", other),
        };

        let second = h
            .send(ShellEvent::FileChooserRequested {
                capture: false,
                multiple: false,
            })
            .await;
        assert_eq!(
            second[0],
            HostCommand::CompleteFileChooser {
                request_id: first_id,
                files: None
            }
        );

        let stale = h
            .send(ShellEvent::FileChooserCompleted {
                request_id: first_id,
                files: Some(vec!["content://late".into()]),
            })
            .await;
        assert!(stale.is_empty());
    }

    #[tokio::test]
    async fn test_late_camera_denial_leaves_replacement_picker_open() {
        let mut h = Harness::new(PermissionSnapshot {
            camera: PermissionState::Unknown,
            microphone: PermissionState::Granted,
        });
        h.load().await;

        let commands = h
            .send(ShellEvent::FileChooserRequested {
                capture: true,
                multiple: false,
            })
            .await;
        let prompt = permission_prompt(&commands, Capability::Camera).unwrap();

        let commands = h
            .send(ShellEvent::FileChooserRequested {
                capture: false,
                multiple: false,
            })
            .await;
        let picker = match &commands[..] {
            [HostCommand::CompleteFileChooser { files: None, .. }, HostCommand::OpenFilePicker { request_id, .. }] => {
                *request_id
            }
            other => panic!("expected capture cancel then picker, got {:?}", other),
        };

        let denied = h
            .send(ShellEvent::PermissionResult {
                request_id: prompt,
                granted: false,
            })
            .await;
        assert!(denied.is_empty(), "Denial must not complete the open picker: {:?}", denied);

        let picked = h
            .send(ShellEvent::FileChooserCompleted {
                request_id: picker,
                files: Some(vec!["content://doc.pdf".into()]),
            })
            .await;
        assert_eq!(
            picked,
            vec![HostCommand::CompleteFileChooser {
                request_id: picker,
                files: Some(vec!["content://doc.pdf".into()]),
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_pick_is_null_result() {
        let mut h = Harness::all_granted();
        h.load().await;
        let commands = h
            .send(ShellEvent::FileChooserRequested {
                capture: false,
                multiple: true,
            })
            .await;
        let request_id = match &commands[..] {
            [HostCommand::OpenFilePicker { request_id, .. }] => *request_id,
            other => panic!("expected picker, got {:?}", other),
        };
        let commands = h
            .send(ShellEvent::FileChooserCompleted {
                request_id,
                files: Some(Vec::new()),
            })
            .await;
        assert_eq!(
            commands,
            vec![HostCommand::CompleteFileChooser {
                request_id,
                files: None
            }]
        );
    }

    #[tokio::test]
    async fn test_web_audio_permission_waits_for_microphone() {
        let mut h = Harness::new(PermissionSnapshot::default());
        h.load().await;
        let prompt = h.controller.media().in_flight().unwrap().request_id;

        let web_request = Uuid::new_v4();
        let commands = h
            .send(ShellEvent::WebPermissionRequested {
                request_id: web_request,
                resources: vec![WebResource::AudioCapture],
            })
            .await;
        assert!(commands.is_empty());

        let commands = h
            .send(ShellEvent::PermissionResult {
                request_id: prompt,
                granted: true,
            })
            .await;
        assert_eq!(
            commands,
            vec![
                HostCommand::GrantWebPermission {
                    request_id: web_request,
                    resources: vec![WebResource::AudioCapture],
                },
                HostCommand::Page(PageCommand::MicrophoneGranted),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_audio_web_permission_granted() {
        let mut h = Harness::all_granted();
        let id = Uuid::new_v4();
        let commands = h
            .send(ShellEvent::WebPermissionRequested {
                request_id: id,
                resources: vec![WebResource::Other("midi".into())],
            })
            .await;
        assert_eq!(
            commands,
            vec![HostCommand::GrantWebPermission {
                request_id: id,
                resources: vec![WebResource::Other("midi".into())],
            }]
        );
    }

    #[tokio::test]
    async fn test_open_url_authorizes_deep_links() {
        let mut h = Harness::all_granted();
        h.load().await;

        assert!(h
            .send(ShellEvent::OpenUrl {
                url: "openwebui://bad_host/c".into()
            })
            .await
            .is_empty());
        assert!(h.controller.supervisor().is_ready(), "Rejected links change nothing");

        let commands = h
            .send(ShellEvent::OpenUrl {
                url: "openwebui://chat.example.com/c?model=llama3&x=1".into(),
            })
            .await;
        assert_eq!(
            commands,
            vec![
                HostCommand::SetLoading(true),
                HostCommand::LoadUrl("https://chat.example.com/c?model=llama3".into()),
            ]
        );
        assert!(!h.controller.supervisor().is_ready());
    }

    #[tokio::test]
    async fn test_navigation_guard_follows_base_url() {
        let mut h = Harness::all_granted();
        h.load().await;
        let guard = h.controller.navigation_guard();

        assert_eq!(guard.check("https://chat.example.com/c/1"), NavigationDecision::LoadInPlace);
        assert_eq!(
            guard.check("https://example.org/"),
            NavigationDecision::OpenExternal("https://example.org/".into())
        );

        let commands = h
            .send(ShellEvent::SettingsSubmitted {
                url: "  https://other.example.org ".into(),
            })
            .await;
        assert_eq!(
            commands,
            vec![
                HostCommand::SetLoading(true),
                HostCommand::LoadUrl("https://other.example.org".into()),
            ]
        );
        assert_eq!(
            h.settings.server_url().as_deref(),
            Some("https://other.example.org")
        );
        assert_eq!(guard.check("https://other.example.org/x"), NavigationDecision::LoadInPlace);
        assert!(matches!(
            guard.check("https://chat.example.com/c/1"),
            NavigationDecision::OpenExternal(_)
        ));
    }

    #[tokio::test]
    async fn test_settings_rejects_invalid_urls() {
        let mut h = Harness::all_granted();
        for url in ["", "   ", "not a url", "http://192.168.1.10:8080"] {
            let commands = h
                .send(ShellEvent::SettingsSubmitted { url: url.into() })
                .await;
            assert!(
                matches!(&commands[..], [HostCommand::SettingsRejected { .. }]),
                "{:?} should be rejected",
                url
            );
        }
        assert_eq!(h.settings.server_url().as_deref(), Some(BASE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_finger_hold_opens_settings_once() {
        let mut h = Harness::all_granted();
        let started = Instant::now();

        let mut commands = Vec::new();
        for id in 0..4 {
            commands.extend(h.send(ShellEvent::Touch(TouchEvent::Down(id))).await);
        }
        assert_eq!(commands, vec![HostCommand::ShowGestureProgress(0)]);

        let commands = h.pump_timers().await;
        let opened: Vec<_> = commands
            .iter()
            .filter(|c| matches!(c, HostCommand::ShowSettings { .. }))
            .collect();
        assert_eq!(opened.len(), 1);
        assert_eq!(
            opened[0],
            &HostCommand::ShowSettings {
                current_url: Some(BASE.to_string())
            }
        );
        assert!(commands
            .iter()
            .any(|c| matches!(c, HostCommand::ShowGestureProgress(p) if *p > 0 && *p < 100)));
        assert!(Instant::now() - started >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lifting_a_finger_aborts_gesture() {
        let mut h = Harness::all_granted();
        for id in 0..4 {
            h.send(ShellEvent::Touch(TouchEvent::Down(id))).await;
        }

        tokio::time::advance(Duration::from_secs(2)).await;
        let commands = h.send(ShellEvent::Touch(TouchEvent::Up(3))).await;
        assert_eq!(commands, vec![HostCommand::HideGestureProgress]);

        let later = h.pump_timers().await;
        assert!(
            later.iter().all(|c| !matches!(c, HostCommand::ShowSettings { .. })),
            "Aborted gesture must not open settings"
        );

        let restart = h.send(ShellEvent::Touch(TouchEvent::Down(3))).await;
        assert_eq!(restart, vec![HostCommand::ShowGestureProgress(0)]);
    }

    #[tokio::test]
    async fn test_screen_destroyed_drops_late_results() {
        let mut h = Harness::new(PermissionSnapshot {
            camera: PermissionState::Unknown,
            microphone: PermissionState::Granted,
        });
        h.load().await;
        let commands = h
            .send(ShellEvent::FileChooserRequested {
                capture: true,
                multiple: false,
            })
            .await;
        let prompt = permission_prompt(&commands, Capability::Camera).unwrap();

        h.send(ShellEvent::ScreenDestroyed).await;
        let late = h
            .send(ShellEvent::PermissionResult {
                request_id: prompt,
                granted: true,
            })
            .await;
        assert!(late.is_empty());
        assert_eq!(h.controller.media().state(Capability::Camera), PermissionState::Granted);
    }

    #[tokio::test]
    async fn test_back_and_downloads() {
        let mut h = Harness::all_granted();
        assert_eq!(
            h.send(ShellEvent::BackPressed { can_go_back: true }).await,
            vec![HostCommand::GoBack]
        );
        assert_eq!(
            h.send(ShellEvent::BackPressed { can_go_back: false }).await,
            vec![HostCommand::Exit]
        );

        let commands = h
            .send(ShellEvent::DownloadRequested(crate::downloads::DownloadRequest {
                url: "https://chat.example.com/files/report.pdf".into(),
                user_agent: None,
                content_disposition: None,
                mime_type: Some("application/pdf".into()),
            }))
            .await;
        match &commands[..] {
            [HostCommand::EnqueueDownload(ticket)] => assert_eq!(ticket.file_name, "report.pdf"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_event_does_not_wait_for_capacity() {
        let (tx, mut rx) = mpsc::channel(1);
        post_event(&tx, ShellEvent::Start);
        post_event(&tx, ShellEvent::Shutdown);

        assert_eq!(rx.recv().await, Some(ShellEvent::Start));
        assert_eq!(rx.recv().await, Some(ShellEvent::Shutdown));

        drop(rx);
        post_event(&tx, ShellEvent::Start);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let mut h = Harness::all_granted();
        assert!(!h.controller.handle(ShellEvent::Shutdown).await.unwrap());
    }
}
