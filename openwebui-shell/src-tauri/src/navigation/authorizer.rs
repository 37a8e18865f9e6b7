use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, error, info};
use url::Url;

use super::params::sanitize_params;
use crate::error::{Result, ShellError};

/// A navigation target that passed host validation and parameter sanitization.
///
/// Only [`NavigationPolicy::authorize`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedUrl {
    url: Url,
    params: Vec<(String, String)>,
}

impl AuthorizedUrl {
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }
}

impl fmt::Display for AuthorizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// What to do with a navigation the page initiated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    LoadInPlace,
    /// Hand the URL to the OS; never load it inside the embedded surface.
    OpenExternal(String),
}

#[derive(Debug, Clone)]
pub struct NavigationPolicy {
    base_url: String,
    custom_scheme: String,
}

impl NavigationPolicy {
    pub fn new(base_url: impl Into<String>, custom_scheme: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            custom_scheme: custom_scheme.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    /// Resolves a deep link or view request into the URL given to the embedded surface.
    ///
    /// Custom-scheme links are rewritten to https when their host is well formed
    /// and rejected otherwise. Query parameters are reduced to the recognized,
    /// valid subset.
    pub fn authorize(&self, raw_url: &str) -> Result<AuthorizedUrl> {
        let parsed = Url::parse(raw_url.trim()).map_err(|e| {
            error!("Unparseable navigation target {:?}: {}", raw_url, e);
            ShellError::NavigationRejected(format!("unparseable URL: {}", e))
        })?;

        let target = if parsed.scheme().eq_ignore_ascii_case(&self.custom_scheme) {
            rewrite_custom_scheme(&parsed)?
        } else {
            parsed
        };
        if !matches!(target.scheme(), "http" | "https") {
            error!("Refusing to load {} URL: {}", target.scheme(), raw_url);
            return Err(ShellError::NavigationRejected(format!(
                "unsupported scheme {:?}",
                target.scheme()
            )));
        }

        let params = sanitize_params(target.query_pairs());

        let mut url = target;
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut()
                .clear()
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        info!("Authorized navigation: {}", url);
        Ok(AuthorizedUrl { url, params })
    }

    /// Page-initiated navigations stay inside the shell only under the base URL.
    pub fn intercept(&self, url: &str) -> NavigationDecision {
        if url.starts_with(&self.base_url) || url == "about:blank" {
            NavigationDecision::LoadInPlace
        } else {
            debug!("Navigation outside {} handed to OS: {}", self.base_url, url);
            NavigationDecision::OpenExternal(url.to_string())
        }
    }
}

fn rewrite_custom_scheme(parsed: &Url) -> Result<Url> {
    let host = parsed.host_str().unwrap_or_default();
    if !host_regex().is_match(host) {
        error!("Invalid host in {}:// URL: {:?}", parsed.scheme(), host);
        return Err(ShellError::NavigationRejected(format!(
            "invalid host {:?}",
            host
        )));
    }

    let mut rewritten = format!("https://{}{}", host, parsed.path());
    if let Some(query) = parsed.query() {
        rewritten.push('?');
        rewritten.push_str(query);
    }
    Ok(Url::parse(&rewritten)?)
}

fn host_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9.-]+$").expect("host regex"))
}

fn server_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"^https?://",
            r"([a-zA-Z0-9]([a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+",
            r"[a-zA-Z]{2,}",
            r"(/[a-zA-Z0-9\-._~:/?#\[\]@!$&'()*+,;=]*)?$",
        ))
        .expect("server url regex")
    })
}

/// Hard accept/reject gate for URLs typed by the user.
pub fn validate_url(url: &str) -> bool {
    server_url_regex().is_match(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> NavigationPolicy {
        NavigationPolicy::new("https://chat.example.com", "app")
    }

    #[test]
    fn test_custom_scheme_rewritten_and_sanitized() {
        let authorized = policy()
            .authorize("app://chat.example.com/x?models=gpt-4,bad!name&foo=1")
            .unwrap();

        assert_eq!(authorized.scheme(), "https");
        assert_eq!(authorized.host(), "chat.example.com");
        assert_eq!(authorized.path(), "/x");
        assert_eq!(
            authorized.params(),
            &[("models".to_string(), "gpt-4".to_string())]
        );
        assert_eq!(authorized.as_str(), "https://chat.example.com/x?models=gpt-4");
    }

    #[test]
    fn test_custom_scheme_bad_host_rejected() {
        for raw in [
            "app://bad_host/x",
            "app://evil!host.com/",
            "app:///no-host",
        ] {
            assert!(
                matches!(policy().authorize(raw), Err(ShellError::NavigationRejected(_))),
                "{} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_non_web_schemes_rejected() {
        for raw in [
            "javascript:alert(1)",
            "file:///data/data/app/shared_prefs/settings.xml",
            "intent://scan/#Intent;scheme=zxing;end",
            "data:text/html,<h1>hi</h1>",
        ] {
            assert!(
                matches!(policy().authorize(raw), Err(ShellError::NavigationRejected(_))),
                "{} should be rejected",
                raw
            );
        }
        assert!(policy().authorize("http://chat.example.com/").is_ok());
    }

    #[test]
    fn test_plain_url_used_as_given_minus_params() {
        let authorized = policy()
            .authorize("https://chat.example.com/c/123?q=hello%20world&utm=1#top")
            .unwrap();
        assert_eq!(authorized.param("q"), Some("hello world"));
        assert_eq!(authorized.param("utm"), None);
        assert_eq!(
            authorized.as_str(),
            "https://chat.example.com/c/123?q=hello+world#top"
        );
    }

    #[test]
    fn test_all_params_dropped_leaves_no_query() {
        let authorized = policy()
            .authorize("https://chat.example.com/?youtube=short&call=yes")
            .unwrap();
        assert!(authorized.params().is_empty());
        assert_eq!(authorized.as_str(), "https://chat.example.com/");
    }

    #[test]
    fn test_intercept_by_base_url_prefix() {
        let policy = policy();
        assert_eq!(
            policy.intercept("https://chat.example.com/c/1"),
            NavigationDecision::LoadInPlace
        );
        assert_eq!(
            policy.intercept("https://github.com/open-webui"),
            NavigationDecision::OpenExternal("https://github.com/open-webui".into())
        );
        assert_eq!(policy.intercept("about:blank"), NavigationDecision::LoadInPlace);
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://chat.example.com"));
        assert!(validate_url("http://my-server.example.org/path?x=1"));
        assert!(!validate_url("ftp://chat.example.com"));
        assert!(!validate_url("https://localhost"));
        assert!(!validate_url("chat.example.com"));
        assert!(!validate_url("https://chat.example.com/has space"));
    }
}
