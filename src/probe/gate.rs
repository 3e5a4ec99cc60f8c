//! Readiness gate — blocks until the SPA's home view is interactively usable
//! and the transient disconnect overlay has cleared.
//!
//! The overlay is waited out, never dismissed: clicking through it would
//! desynchronize the page's own belief about connection state.

use chromiumoxide::Page;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::browser::{self, EVAL_TIMEOUT};
use crate::probe::{evidence, ProbeProfile};

/// Fixed cadence for both readiness phases.
pub const READY_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Why the gate released (or refused to).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    Ready,
    /// The home indicator (or its navigation fallback) never appeared.
    HomeNeverRendered,
    /// Home rendered but the disconnect overlay never went away; an
    /// environmental condition, not a credential failure.
    OverlayNeverCleared,
}

impl ReadyOutcome {
    pub fn is_ready(self) -> bool {
        matches!(self, ReadyOutcome::Ready)
    }
}

/// Wait until the home view has rendered and the disconnect overlay is
/// absent, polling every [`READY_POLL_INTERVAL`] up to `timeout` total.
pub async fn wait_until_ready(
    page: &Page,
    profile: &ProbeProfile,
    timeout: Duration,
) -> ReadyOutcome {
    let deadline = Instant::now() + timeout;

    loop {
        if home_view_rendered(page, profile).await {
            break;
        }
        if Instant::now() >= deadline {
            return ReadyOutcome::HomeNeverRendered;
        }
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
    debug!("readiness gate: home view rendered");

    let remaining = deadline.saturating_duration_since(Instant::now());
    if wait_disconnect_clear(page, remaining).await {
        info!("✅ readiness gate: SPA ready");
        ReadyOutcome::Ready
    } else {
        ReadyOutcome::OverlayNeverCleared
    }
}

/// Wait (never dismiss) until the disconnect overlay is absent. Also used by
/// the resolver to suspend its polling loop mid-attempt.
pub async fn wait_disconnect_clear(page: &Page, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !evidence::disconnect_overlay_visible(page).await {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        debug!("readiness gate: disconnect overlay visible, waiting");
        tokio::time::sleep(READY_POLL_INTERVAL).await;
    }
}

async fn home_view_rendered(page: &Page, profile: &ProbeProfile) -> bool {
    let marker_js = format!(
        "document.body !== null && document.body.innerText.includes({})",
        serde_json::Value::from(profile.home_marker_text.as_str())
    );
    if browser::eval_bool(page, &marker_js, EVAL_TIMEOUT)
        .await
        .unwrap_or(false)
    {
        return true;
    }
    if profile.require_home_marker {
        return false;
    }
    // Weaker proxy for deployments where the marker text is unreliable:
    // any visible primary navigation link.
    const NAV_PROBE_JS: &str = r#"
(() => {
  for (const el of document.querySelectorAll('nav a, .sidebar a, header a, [role="navigation"] a')) {
    const s = window.getComputedStyle(el);
    if (s.display !== 'none' && s.visibility !== 'hidden') return true;
  }
  return false;
})()
"#;
    browser::eval_bool(page, NAV_PROBE_JS, EVAL_TIMEOUT)
        .await
        .unwrap_or(false)
}
