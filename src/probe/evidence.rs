//! Evidence collection — three independent, order-insensitive channels:
//! disconnect overlay, top-level failure banner / success indicator, and the
//! streamed server journal. Each channel read is best-effort: a driver error
//! or timeout degrades that channel to "not observed" and never blocks the
//! other channels.
//!
//! The journal is an append-only transcript shared by every attempt in the
//! same browsing session, so the channel anchors on the LAST occurrence of
//! this username's authentication line and inspects only the text after it.
//! Only appends occur, which is what makes the lock-free read safe.

use async_trait::async_trait;
use chromiumoxide::Page;
use regex::Regex;
use std::time::Duration;

use crate::browser::{self, EVAL_TIMEOUT};
use crate::core::types::{EvidenceSnapshot, LogVerdict};
use crate::probe::{gate, ProbeProfile};

// ── Signal phrases ───────────────────────────────────────────────────────────

/// Credential-rejection phrase shown both as a top banner and echoed into the
/// journal narrative (which is why the banner channel is position-filtered).
pub const FAILURE_PHRASE: &str = "Invalid credentials";

/// Journal line markers. SUCCESS needs both subsystem lines after the anchor;
/// either alone is inconclusive.
pub const AUTH_SUCCESS_MARKER: &str = "Authenticated to authd.";
pub const DNS_SUCCESS_MARKER: &str = "Authenticated to dnsmanagerd.";

/// UI texts accepted as a post-login success indicator.
pub const SUCCESS_INDICATORS: &[&str] = &["Logout", "Sign out", "Logged in"];

// ── Journal anchor analysis (pure) ───────────────────────────────────────────

/// Classify the journal transcript for one username.
///
/// Finds the LAST `authenticate (login: <username>)` anchor (the transcript
/// intermixes every attempt of the session, and only the newest event belongs
/// to us), then inspects the trailing text only. The username is
/// regex-escaped first; identities may contain pattern metacharacters.
///
/// No anchor at all → [`LogVerdict::None`] ("insufficient evidence"),
/// deliberately distinct from an anchored-but-inconclusive
/// [`LogVerdict::Unknown`].
pub fn log_verdict_for(transcript: &str, username: &str) -> LogVerdict {
    let pattern = format!(r"authenticate \(login: {}\)", regex::escape(username));
    let Ok(anchor) = Regex::new(&pattern) else {
        return LogVerdict::None;
    };
    let Some(last) = anchor.find_iter(transcript).last() else {
        return LogVerdict::None;
    };
    let tail = &transcript[last.end()..];

    // Failure first: consistent with resolver-level failure dominance.
    if tail.contains(FAILURE_PHRASE) {
        LogVerdict::FailInvalid
    } else if tail.contains(AUTH_SUCCESS_MARKER) && tail.contains(DNS_SUCCESS_MARKER) {
        LogVerdict::Success
    } else {
        LogVerdict::Unknown
    }
}

// ── Channel probes (live) ────────────────────────────────────────────────────

/// JS: is the "connection lost" overlay currently visible?
const DISCONNECT_PROBE_JS: &str = r#"
(() => {
  const els = document.querySelectorAll('.disconnected, .overlay, .modal, [class*="disconnect"]');
  for (const el of els) {
    const s = window.getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') continue;
    if ((el.innerText || '').toLowerCase().includes('disconnect')) return true;
  }
  return false;
})()
"#;

pub async fn disconnect_overlay_visible(page: &Page) -> bool {
    browser::eval_bool(page, DISCONNECT_PROBE_JS, EVAL_TIMEOUT)
        .await
        .unwrap_or(false)
}

/// Build the position-filtered banner probe.
///
/// An occurrence of the failure phrase counts only when it renders above
/// `max_y` OR sits in a known alert container, and never when it lives
/// inside the journal panel, which legitimately echoes the same phrase for
/// historic attempts.
fn banner_probe_js(phrase: &str, max_y: f64) -> String {
    let phrase_js = serde_json::Value::from(phrase).to_string();
    format!(
        r#"
(() => {{
  const phrase = {phrase_js};
  const maxY = {max_y};
  for (const el of document.querySelectorAll('body *')) {{
    if (el.children.length > 0) continue;
    if (!(el.textContent || '').includes(phrase)) continue;
    const s = window.getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') continue;
    if (el.closest('pre, code, .log, .journal, [class*="log-"], [class*="console"]')) continue;
    if (el.closest('.alert, [role="alert"], .notification, .toast')) return true;
    const top = el.getBoundingClientRect().top;
    if (top >= 0 && top < maxY) return true;
  }}
  return false;
}})()
"#
    )
}

pub async fn failure_banner_visible(page: &Page, max_y: f64) -> bool {
    browser::eval_bool(page, &banner_probe_js(FAILURE_PHRASE, max_y), EVAL_TIMEOUT)
        .await
        .unwrap_or(false)
}

fn success_probe_js() -> String {
    let markers_js = serde_json::Value::from(
        SUCCESS_INDICATORS
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>(),
    )
    .to_string();
    format!(
        r#"
(() => {{
  const markers = {markers_js};
  for (const el of document.querySelectorAll('a, button, h1, h2, .user-menu, [class*="account"]')) {{
    const s = window.getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') continue;
    const text = (el.innerText || '').trim();
    if (markers.some(m => text === m || text.startsWith(m))) return true;
  }}
  return false;
}})()
"#
    )
}

pub async fn success_indicator_visible(page: &Page) -> bool {
    browser::eval_bool(page, &success_probe_js(), EVAL_TIMEOUT)
        .await
        .unwrap_or(false)
}

/// JS: full journal text, preferring the dedicated panel over the whole body.
const TRANSCRIPT_PROBE_JS: &str = r#"
(() => {
  const el = document.querySelector('pre.log, .log-viewer, .journal, .console-output, #log, [class*="log-panel"]');
  const t = el ? el.innerText : (document.body ? document.body.innerText : '');
  return t || '';
})()
"#;

/// Read the streamed journal text. Empty on any failure; the log channel
/// then reports [`LogVerdict::None`].
pub async fn capture_transcript(page: &Page) -> String {
    browser::eval_string(page, TRANSCRIPT_PROBE_JS, EVAL_TIMEOUT)
        .await
        .unwrap_or_default()
}

// ── EvidenceSource seam ──────────────────────────────────────────────────────

/// The resolver's view of evidence collection. The live implementation
/// drives a CDP page; tests script snapshots instead.
#[async_trait]
pub trait EvidenceSource {
    /// One read of all channels. Read-only: sampling twice without session
    /// mutation in between yields the same snapshot.
    async fn sample(&self) -> EvidenceSnapshot;

    /// Block until the disconnect overlay clears, bounded. `false` when it
    /// never cleared in time.
    async fn wait_disconnect_clear(&self, timeout: Duration) -> bool;
}

/// Live three-channel sampler over one attempt's page.
pub struct LiveEvidence<'a> {
    page: &'a Page,
    username: &'a str,
    profile: &'a ProbeProfile,
}

impl<'a> LiveEvidence<'a> {
    pub fn new(page: &'a Page, username: &'a str, profile: &'a ProbeProfile) -> Self {
        Self {
            page,
            username,
            profile,
        }
    }
}

#[async_trait]
impl EvidenceSource for LiveEvidence<'_> {
    async fn sample(&self) -> EvidenceSnapshot {
        // Order-insensitive reads; all must land before the decision check.
        let (disconnected, banner, success, transcript) = tokio::join!(
            disconnect_overlay_visible(self.page),
            failure_banner_visible(self.page, self.profile.banner_max_y),
            success_indicator_visible(self.page),
            capture_transcript(self.page),
        );
        EvidenceSnapshot {
            disconnected_active: disconnected,
            failure_banner_visible: banner,
            success_indicator_visible: success,
            log_verdict: log_verdict_for(&transcript, self.username),
        }
    }

    async fn wait_disconnect_clear(&self, timeout: Duration) -> bool {
        gate::wait_disconnect_clear(self.page, timeout).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ANCHOR: &str = "authenticate (login: alice)";

    #[test]
    fn no_anchor_reports_none_not_unknown() {
        let t = "Authenticated to authd.\nAuthenticated to dnsmanagerd.\n";
        assert_eq!(log_verdict_for(t, "alice"), LogVerdict::None);
    }

    #[test]
    fn anchor_with_inconclusive_tail_is_unknown() {
        let t = format!("{ANCHOR}\nsome unrelated chatter\n");
        assert_eq!(log_verdict_for(&t, "alice"), LogVerdict::Unknown);
    }

    #[test]
    fn one_success_marker_alone_is_not_success() {
        let t = format!("{ANCHOR}\nAuthenticated to authd.\n");
        assert_eq!(log_verdict_for(&t, "alice"), LogVerdict::Unknown);
    }

    #[test]
    fn both_success_markers_after_anchor_succeed() {
        let t = format!("{ANCHOR}\nAuthenticated to authd.\nAuthenticated to dnsmanagerd.\n");
        assert_eq!(log_verdict_for(&t, "alice"), LogVerdict::Success);
    }

    #[test]
    fn failure_marker_after_anchor_fails() {
        let t = format!("{ANCHOR}\nError: Invalid credentials.\n");
        assert_eq!(log_verdict_for(&t, "alice"), LogVerdict::FailInvalid);
    }

    /// The transcript intermixes attempts; only the text after the LAST
    /// anchor for this identity may be evaluated.
    #[test]
    fn last_anchor_wins_over_earlier_failure() {
        let t = format!(
            "boot...\n{ANCHOR}\nError: Invalid credentials.\nretrying...\n\
             {ANCHOR}\nAuthenticated to authd.\nAuthenticated to dnsmanagerd.\n"
        );
        assert_eq!(log_verdict_for(&t, "alice"), LogVerdict::Success);
    }

    #[test]
    fn last_anchor_wins_over_earlier_success() {
        let t = format!(
            "{ANCHOR}\nAuthenticated to authd.\nAuthenticated to dnsmanagerd.\n\
             {ANCHOR}\nError: Invalid credentials.\n"
        );
        assert_eq!(log_verdict_for(&t, "alice"), LogVerdict::FailInvalid);
    }

    #[test]
    fn failure_beats_success_within_the_same_tail() {
        let t = format!(
            "{ANCHOR}\nError: Invalid credentials.\nAuthenticated to authd.\nAuthenticated to dnsmanagerd.\n"
        );
        assert_eq!(log_verdict_for(&t, "alice"), LogVerdict::FailInvalid);
    }

    #[test]
    fn identity_with_regex_metacharacters_is_escaped() {
        let t = "authenticate (login: a+b(c))\nAuthenticated to authd.\nAuthenticated to dnsmanagerd.\n";
        assert_eq!(log_verdict_for(t, "a+b(c)"), LogVerdict::Success);
        // And the metacharacter identity must not match some other anchor.
        assert_eq!(log_verdict_for(t, "a.b(c)"), LogVerdict::None);
    }

    #[test]
    fn anchors_for_other_identities_are_ignored() {
        let t = "authenticate (login: bob)\nAuthenticated to authd.\nAuthenticated to dnsmanagerd.\n";
        assert_eq!(log_verdict_for(t, "alice"), LogVerdict::None);
    }

    #[test]
    fn banner_probe_embeds_threshold_and_escaped_phrase() {
        let js = banner_probe_js("say \"no\"", 200.0);
        assert!(js.contains(r#""say \"no\"""#));
        assert!(js.contains("const maxY = 200"));
    }
}
