//! Downloads started by the page are handed to the OS download manager.
//! The outcome is only logged.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

const FALLBACK_NAME: &str = "downloadfile";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub url: String,
    pub user_agent: Option<String>,
    pub content_disposition: Option<String>,
    pub mime_type: Option<String>,
}

/// A download ready to be enqueued with the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTicket {
    pub download_id: Uuid,
    pub url: String,
    pub file_name: String,
    pub user_agent: Option<String>,
}

impl DownloadRequest {
    pub fn into_ticket(self) -> DownloadTicket {
        let file_name = guess_file_name(
            &self.url,
            self.content_disposition.as_deref(),
            self.mime_type.as_deref(),
        );
        let ticket = DownloadTicket {
            download_id: Uuid::new_v4(),
            url: self.url,
            file_name,
            user_agent: self.user_agent,
        };
        info!(
            "Started download {} for file: {}",
            ticket.download_id, ticket.file_name
        );
        ticket
    }
}

pub fn log_download_outcome(download_id: Uuid, file_name: &str, success: bool) {
    if success {
        info!("Download {} completed successfully: {}", download_id, file_name);
    } else {
        error!("Download {} failed: {}", download_id, file_name);
    }
}

fn disposition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)filename\*?\s*=\s*(?:UTF-8'[^']*')?"?([^";]+)"?"#)
            .expect("content-disposition regex")
    })
}

/// Picks a file name from the content disposition, then the URL path, then
/// falls back to a generic name. An extension is added from the MIME type
/// when the name has none.
pub fn guess_file_name(url: &str, content_disposition: Option<&str>, mime_type: Option<&str>) -> String {
    let from_disposition = content_disposition
        .and_then(|cd| disposition_regex().captures(cd))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    let from_url = || {
        Url::parse(url).ok().and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
    };

    let raw = from_disposition
        .or_else(from_url)
        .unwrap_or_default();
    let mut name = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    // "." and ".." would name the download directory itself or its parent.
    if name.chars().all(|c| c == '.') {
        name = FALLBACK_NAME.to_string();
    }

    if !name.contains('.') {
        name.push_str(extension_for(mime_type));
    }
    name
}

fn extension_for(mime_type: Option<&str>) -> &'static str {
    let mime = mime_type
        .map(|m| m.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        "text/html" => ".html",
        "application/pdf" => ".pdf",
        "application/json" => ".json",
        "application/zip" => ".zip",
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "audio/mpeg" => ".mp3",
        "audio/wav" => ".wav",
        m if m.starts_with("text/") => ".txt",
        _ => ".bin",
    }
}
