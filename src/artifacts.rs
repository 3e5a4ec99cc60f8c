//! Per-attempt diagnostic artifacts — a viewport screenshot and a journal
//! excerpt, keyed by a filesystem-safe transform of the identity.
//!
//! Artifacts are written to a local directory rather than inlined anywhere:
//! whoever triages a failed run reads the files only when needed. Capture is
//! best-effort; an unwritable directory degrades to "no artifact", never to
//! an attempt failure. Secrets are never written: the journal excerpt is
//! server-side narrative, and screenshots are taken after submission when the
//! password field is no longer the focus of the view.

use chromiumoxide::Page;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::probe::evidence;

/// Keep at most this much of the journal tail per excerpt.
const EXCERPT_MAX_CHARS: usize = 4000;

pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Use the configured directory, else `~/.login-scout/artifacts`, else
    /// a temp-dir fallback for homeless environments (containers, CI).
    pub fn new(configured: Option<String>) -> Self {
        let dir = configured
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".login-scout").join("artifacts")))
            .unwrap_or_else(|| std::env::temp_dir().join(".login-scout-artifacts"));
        Self { dir }
    }

    /// Filesystem-safe key derived from an identity string.
    ///
    /// e.g. `"svc.admin@lab"` → `"svc_admin_lab"`
    pub fn identity_key(username: &str) -> String {
        let key: String = username
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        if key.is_empty() {
            "unknown".to_string()
        } else {
            key
        }
    }

    /// Capture screenshot + journal excerpt for one attempt. Returns the
    /// written paths; each side is `None` when its capture failed.
    pub async fn capture(&self, page: &Page, username: &str) -> (Option<String>, Option<String>) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            warn!("artifacts: cannot create {}: {}", self.dir.display(), e);
            return (None, None);
        }
        let key = Self::identity_key(username);
        let ts = chrono::Utc::now().timestamp_millis();

        let shot = self.write_screenshot(page, &key, ts).await;
        let excerpt = self.write_log_excerpt(page, &key, ts).await;
        (shot, excerpt)
    }

    async fn write_screenshot(&self, page: &Page, key: &str, ts: i64) -> Option<String> {
        use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
        use chromiumoxide::page::ScreenshotParams;

        let bytes = match page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
        {
            Ok(b) => b,
            Err(e) => {
                warn!("artifacts: screenshot capture failed for '{}': {}", key, e);
                return None;
            }
        };

        let path = self.dir.join(format!("login_{key}_{ts}.png"));
        match std::fs::write(&path, &bytes) {
            Ok(()) => {
                info!("📸 artifacts: {} ({} bytes)", path.display(), bytes.len());
                Some(path.to_string_lossy().to_string())
            }
            Err(e) => {
                warn!("artifacts: write failed {}: {}", path.display(), e);
                None
            }
        }
    }

    async fn write_log_excerpt(&self, page: &Page, key: &str, ts: i64) -> Option<String> {
        let transcript = evidence::capture_transcript(page).await;
        if transcript.is_empty() {
            return None;
        }
        let excerpt = tail_chars(&transcript, EXCERPT_MAX_CHARS);

        let path = self.dir.join(format!("login_{key}_{ts}.log"));
        match std::fs::write(&path, excerpt) {
            Ok(()) => Some(path.to_string_lossy().to_string()),
            Err(e) => {
                warn!("artifacts: write failed {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// Last `max_chars` characters of `text`, on a char boundary.
fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    let (idx, _) = text.char_indices().nth(skip).unwrap_or((0, ' '));
    &text[idx..]
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_is_filesystem_safe() {
        assert_eq!(ArtifactStore::identity_key("svc.admin@lab"), "svc_admin_lab");
        assert_eq!(ArtifactStore::identity_key("alice"), "alice");
        assert_eq!(ArtifactStore::identity_key("a/b\\c:d"), "a_b_c_d");
        assert_eq!(ArtifactStore::identity_key(""), "unknown");
    }

    #[test]
    fn tail_keeps_the_newest_lines() {
        let text = "old old old NEWEST";
        assert_eq!(tail_chars(text, 6), "NEWEST");
        assert_eq!(tail_chars(text, 1000), text);
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let text = "ééééé";
        assert_eq!(tail_chars(text, 2), "éé");
    }
}
