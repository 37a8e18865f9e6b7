use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

use crate::error::{Result, ShellError};

pub const DEFAULT_MODEL: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellSettings {
    /// Base URL of the Open WebUI server. Navigations outside it open externally.
    pub server_url: Option<String>,
    pub setup_complete: bool,
    pub selected_model: String,
    /// Message prefilled alongside shared content, keyed by payload kind ("image", "text").
    pub prefilled_messages: HashMap<String, String>,
    pub load_timeout_ms: u64,
    pub long_press_ms: u64,
    pub required_fingers: usize,
    /// Scheme of deep links that are rewritten to https (`openwebui://host/path`).
    pub custom_scheme: String,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            server_url: None,
            setup_complete: false,
            selected_model: DEFAULT_MODEL.to_string(),
            prefilled_messages: HashMap::new(),
            load_timeout_ms: 30_000,
            long_press_ms: 3_000,
            required_fingers: 4,
            custom_scheme: "openwebui".to_string(),
        }
    }
}

/// Typed access to the shell's persisted preferences.
///
/// The bridge core only reads through this trait; writes happen from the
/// setup flow and the settings dialog.
pub trait SettingsStore: Send + Sync {
    fn settings(&self) -> ShellSettings;

    fn update(&self, apply: &mut dyn FnMut(&mut ShellSettings)) -> Result<()>;

    fn server_url(&self) -> Option<String> {
        self.settings().server_url
    }

    fn save_server_url(&self, url: &str) -> Result<()> {
        self.update(&mut |s| s.server_url = Some(url.to_string()))
    }

    fn mark_setup_complete(&self) -> Result<()> {
        self.update(&mut |s| s.setup_complete = true)
    }

    fn selected_model(&self) -> String {
        self.settings().selected_model
    }

    fn prefilled_message(&self, kind: &str) -> String {
        self.settings()
            .prefilled_messages
            .get(kind)
            .cloned()
            .unwrap_or_default()
    }
}

/// In-memory store, used for ephemeral sessions and tests.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    inner: RwLock<ShellSettings>,
}

impl MemorySettingsStore {
    pub fn new(settings: ShellSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }
}

impl SettingsStore for MemorySettingsStore {
    fn settings(&self) -> ShellSettings {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, apply: &mut dyn FnMut(&mut ShellSettings)) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| ShellError::Config("settings lock poisoned".into()))?;
        apply(&mut guard);
        Ok(())
    }
}

/// Settings persisted as pretty-printed JSON at a fixed path.
#[derive(Debug)]
pub struct JsonSettingsStore {
    path: PathBuf,
    cache: RwLock<ShellSettings>,
}

impl JsonSettingsStore {
    /// Opens the store, falling back to defaults when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = load_settings(&path)?;
        Ok(Self {
            path,
            cache: RwLock::new(settings),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonSettingsStore {
    fn settings(&self) -> ShellSettings {
        match self.cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn update(&self, apply: &mut dyn FnMut(&mut ShellSettings)) -> Result<()> {
        let mut guard = self
            .cache
            .write()
            .map_err(|_| ShellError::Config("settings lock poisoned".into()))?;
        let mut next = guard.clone();
        apply(&mut next);
        save_settings(&self.path, &next)?;
        *guard = next;
        Ok(())
    }
}

fn load_settings(path: &Path) -> Result<ShellSettings> {
    if !path.exists() {
        debug!("No settings at {}, using defaults", path.display());
        return Ok(ShellSettings::default());
    }

    let content = std::fs::read_to_string(path)?;
    let settings: ShellSettings = serde_json::from_str(&content)?;
    Ok(settings)
}

fn save_settings(path: &Path, settings: &ShellSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, content)?;
    Ok(())
}
