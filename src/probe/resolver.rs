//! Verdict resolver — the POLLING → SETTLING → RESOLVED state machine.
//!
//! Failure evidence from either channel always overrides success evidence
//! from either channel: a false SUCCESS silently blesses a broken credential,
//! which is far more harmful than a false FAIL_UNKNOWN.

use std::time::{Duration, Instant};
use tracing::debug;

use crate::core::types::{EvidenceSnapshot, LogVerdict, Resolution, Verdict};
use crate::probe::evidence::EvidenceSource;
use crate::probe::ProbeProfile;

/// Timing knobs for one resolution. Split from [`ProbeProfile`] so tests can
/// run the full machine with millisecond windows.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// POLLING phase bound.
    pub poll_window: Duration,
    /// Pause between samples while nothing is decisive.
    pub poll_interval: Duration,
    /// SETTLING pause before the final, authoritative sample; lets the
    /// journal finish appending trailing lines of the same event.
    pub settle_delay: Duration,
}

impl ResolverConfig {
    pub fn from_profile(profile: &ProbeProfile) -> Self {
        Self {
            poll_window: profile.poll_window,
            poll_interval: Duration::from_millis(400),
            settle_delay: profile.settle_delay,
        }
    }
}

/// Run the state machine to a terminal verdict.
///
/// POLLING: sample until something decisive shows up or the window closes.
/// While the disconnect overlay is up, normal polling is suspended and the
/// remaining window is spent waiting for it to clear. SETTLING: fixed delay,
/// then one final sample which [`decide`] turns into the verdict.
pub async fn resolve<S: EvidenceSource + Sync>(source: &S, cfg: &ResolverConfig) -> Resolution {
    let deadline = Instant::now() + cfg.poll_window;

    loop {
        let snap = source.sample().await;
        if snap.disconnected_active {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !source.wait_disconnect_clear(remaining).await {
                debug!("resolver: disconnect overlay outlived the poll window");
                break;
            }
            continue; // cleared, resume normal polling
        }
        if snap.is_decisive() {
            debug!("resolver: decisive signal, leaving POLLING early");
            break;
        }
        if Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(cfg.poll_interval).await;
    }

    // SETTLING
    tokio::time::sleep(cfg.settle_delay).await;
    let last = source.sample().await;
    decide(last)
}

/// Terminal decision rule over the final snapshot, in strict priority order.
/// Pure, so the dominance invariant is exhaustively testable.
pub fn decide(evidence: EvidenceSnapshot) -> Resolution {
    let (verdict, reason) = if evidence.failure_banner_visible {
        (Verdict::FailInvalid, "failure banner visible")
    } else if evidence.log_verdict == LogVerdict::FailInvalid {
        (Verdict::FailInvalid, "log reported invalid credentials")
    } else if evidence.success_indicator_visible {
        (Verdict::Success, "success indicator visible")
    } else if evidence.log_verdict == LogVerdict::Success {
        (Verdict::Success, "log reported authentication success")
    } else if evidence.disconnected_active {
        (Verdict::FailUnknown, "still disconnected at resolution")
    } else {
        (Verdict::FailUnknown, "no decisive signal within poll window")
    };
    Resolution {
        verdict,
        reason: reason.to_string(),
        evidence,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
