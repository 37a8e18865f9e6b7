//! Script injection transport: each [`PageCommand`] is rendered as a
//! self-contained snippet evaluated in the page context.

use tracing::debug;

use super::protocol::PageCommand;
use crate::error::Result;

/// Name of the bridge object exposed to page scripts.
pub const BRIDGE_OBJECT: &str = "Android";

/// Default page to host channel of the Tauri webview.
pub const TAURI_POST_MESSAGE: &str =
    "window.__TAURI_INTERNALS__.invoke('page_message', { message: payload });";

const SHIM_TEMPLATE: &str = r#"(function() {
  if (window.__openwebuiShellInstalled) { return; }
  window.__openwebuiShellInstalled = true;
  var post = function(payload) { __POST__ };
  window.__BRIDGE__ = window.__BRIDGE__ || {
    requestMicrophonePermission: function() {
      post(JSON.stringify({ type: 'requestMicrophonePermission' }));
    },
    log: function(message) {
      post(JSON.stringify({ type: 'log', message: String(message) }));
    }
  };
  var bridge = window.__BRIDGE__;
  var waiters = [];
  window.handleMicrophoneAccess = function(outcome) {
    if (outcome && typeof outcome === 'object') {
      var failure = outcome.granted ? null : new Error(outcome.error || 'Microphone permission denied');
      waiters.splice(0).forEach(function(w) { failure ? w.reject(failure) : w.resolve(); });
      return failure ? Promise.reject(failure) : Promise.resolve();
    }
    return new Promise(function(resolve, reject) {
      waiters.push({ resolve: resolve, reject: reject });
      bridge.requestMicrophonePermission();
    });
  };
  if (navigator.mediaDevices && navigator.mediaDevices.getUserMedia) {
    var original = navigator.mediaDevices.getUserMedia.bind(navigator.mediaDevices);
    navigator.mediaDevices.getUserMedia = function(constraints) {
      if (!constraints || !constraints.audio) { return original(constraints); }
      return Promise.resolve(window.handleMicrophoneAccess()).then(function() { return original(constraints); });
    };
  } else {
    bridge.log('Media devices not available');
  }
  window.addEventListener('error', function(e) {
    bridge.log('JavaScript error: ' + e.message);
  });
})();"#;

const MICROPHONE_TEMPLATE: &str = r#"(function() {
  if (typeof window.handleMicrophoneAccess !== 'function') { return; }
  Promise.resolve(window.handleMicrophoneAccess(__OUTCOME__)).catch(function(error) {
    if (window.__BRIDGE__) { window.__BRIDGE__.log('Microphone access error: ' + error); }
  });
})();"#;

const SHARE_TEMPLATE: &str = r#"(function() {
  if (typeof window.handleSharedContent === 'function') {
    window.handleSharedContent(__PAYLOAD__);
  } else {
    console.error('handleSharedContent function not found');
  }
})();"#;

/// Delivers host to page commands.
pub trait PageTransport: Send + Sync {
    fn deliver(&self, command: &PageCommand) -> Result<()>;
}

/// Renders commands as JavaScript and hands them to an evaluator.
pub struct ScriptTransport<F> {
    eval: F,
    post_message: String,
}

impl<F> ScriptTransport<F>
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    pub fn new(eval: F) -> Self {
        Self {
            eval,
            post_message: TAURI_POST_MESSAGE.to_string(),
        }
    }

    /// Overrides how page scripts send a JSON string `payload` to the host.
    pub fn with_post_message(mut self, post_message: impl Into<String>) -> Self {
        self.post_message = post_message.into();
        self
    }

    pub fn render(&self, command: &PageCommand) -> Result<String> {
        let script = match command {
            PageCommand::InstallBridge => SHIM_TEMPLATE
                .replace("__POST__", &self.post_message)
                .replace("__BRIDGE__", BRIDGE_OBJECT),
            PageCommand::MicrophoneGranted => {
                render_microphone(&serde_json::json!({ "granted": true }))
            }
            PageCommand::MicrophoneDenied { error } => {
                render_microphone(&serde_json::json!({ "granted": false, "error": error }))
            }
            PageCommand::SharedContent(message) => {
                SHARE_TEMPLATE.replace("__PAYLOAD__", &message.to_json()?)
            }
        };
        Ok(script)
    }
}

fn render_microphone(outcome: &serde_json::Value) -> String {
    MICROPHONE_TEMPLATE
        .replace("__OUTCOME__", &outcome.to_string())
        .replace("__BRIDGE__", BRIDGE_OBJECT)
}

impl<F> PageTransport for ScriptTransport<F>
where
    F: Fn(&str) -> Result<()> + Send + Sync,
{
    fn deliver(&self, command: &PageCommand) -> Result<()> {
        let script = self.render(command)?;
        debug!("Injecting script for {:?}", command);
        (self.eval)(&script)
    }
}
