//! Run aggregator — sequences attempts strictly one after another, isolates
//! every failure at the attempt boundary, and tallies the run.
//!
//! Attempts are never concurrent: a fresh tab plus a storage/cookie reset per
//! attempt is what keeps one credential's auth state from leaking success
//! signals into the next, and the fixed inter-attempt gap keeps the target
//! from rate-limiting the probe.

use chromiumoxide::Page;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::artifacts::ArtifactStore;
use crate::browser::{self, BrowserPool};
use crate::core::types::{
    AttemptError, AttemptReport, Credential, EvidenceSnapshot, Resolution, RunSummary, Verdict,
};
use crate::probe::evidence::LiveEvidence;
use crate::probe::resolver::{self, ResolverConfig};
use crate::probe::{gate, router, submit, ProbeProfile};

const INITIAL_NAV_TIMEOUT: Duration = Duration::from_secs(20);
const READY_TIMEOUT: Duration = Duration::from_secs(30);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Process every credential in order and return the aggregate summary.
/// No attempt outcome, including ERROR, aborts the run.
pub async fn run(
    pool: &BrowserPool,
    profile: &ProbeProfile,
    credentials: &[Credential],
    artifacts: &ArtifactStore,
) -> RunSummary {
    let started = Instant::now();
    let mut summary = RunSummary::default();

    for (idx, credential) in credentials.iter().enumerate() {
        if idx > 0 {
            tokio::time::sleep(profile.attempt_gap).await;
        }
        info!(
            "🔐 attempt {}/{}: '{}'",
            idx + 1,
            credentials.len(),
            credential.username
        );
        let report = run_attempt(pool, profile, credential, artifacts).await;
        info!(
            "attempt '{}' resolved: {} ({})",
            report.username, report.verdict, report.reason
        );
        summary.reports.push(report);
    }

    summary.total_duration_ms = started.elapsed().as_millis() as u64;
    summary
}

/// One attempt, fully contained: acquires and tears down its own tab, maps
/// every error to a terminal verdict, captures artifacts best-effort.
async fn run_attempt(
    pool: &BrowserPool,
    profile: &ProbeProfile,
    credential: &Credential,
    artifacts: &ArtifactStore,
) -> AttemptReport {
    let started = Instant::now();

    let page = match pool.acquire().await {
        Ok(p) => p,
        Err(e) => {
            error!("attempt '{}': no tab available: {}", credential.username, e);
            return AttemptReport {
                username: credential.username.clone(),
                verdict: Verdict::Error,
                reason: format!("browser unavailable: {e}"),
                evidence: EvidenceSnapshot::default(),
                screenshot_path: None,
                log_excerpt_path: None,
                duration_ms: started.elapsed().as_millis() as u64,
            };
        }
    };

    let resolution = match drive_attempt(&page, profile, credential).await {
        Ok(res) => res,
        Err(e) => {
            // Unexpected driver failure, isolated here, never propagated to
            // the aggregator.
            warn!("attempt '{}' errored: {}", credential.username, e);
            Resolution {
                verdict: Verdict::Error,
                reason: e.to_string(),
                evidence: EvidenceSnapshot::default(),
            }
        }
    };

    let (screenshot_path, log_excerpt_path) = if profile.persist_artifacts {
        artifacts.capture(&page, &credential.username).await
    } else {
        (None, None)
    };

    if let Err(e) = page.close().await {
        warn!("attempt '{}': tab close failed: {}", credential.username, e);
    }

    AttemptReport {
        username: credential.username.clone(),
        verdict: resolution.verdict,
        reason: resolution.reason,
        evidence: resolution.evidence,
        screenshot_path,
        log_excerpt_path,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

/// Readiness → routing → submission → resolution for one credential.
///
/// Environmental dead-ends (gate/router) return FAIL_UNKNOWN resolutions;
/// structural failures (initial navigation, submission) bubble up as
/// [`AttemptError`] and become ERROR at the boundary above.
async fn drive_attempt(
    page: &Page,
    profile: &ProbeProfile,
    credential: &Credential,
) -> Result<Resolution, AttemptError> {
    // Initial navigation is the one timeout that escalates instead of
    // degrading — nothing downstream is meaningful without a loaded origin.
    tokio::time::timeout(INITIAL_NAV_TIMEOUT, page.goto(profile.base_url.as_str()))
        .await
        .map_err(|_| AttemptError::Timeout(INITIAL_NAV_TIMEOUT))?
        .map_err(|e| AttemptError::Navigation(e.to_string()))?;

    browser::clear_session_state(page).await;

    match gate::wait_until_ready(page, profile, READY_TIMEOUT).await {
        gate::ReadyOutcome::Ready => {}
        gate::ReadyOutcome::HomeNeverRendered => {
            return Ok(unknown("home view never became ready"));
        }
        gate::ReadyOutcome::OverlayNeverCleared => {
            return Ok(unknown("disconnect overlay never cleared before login"));
        }
    }

    let nav = router::navigate_to_login(page, profile).await;
    if !nav.ok {
        // Navigation exhaustion is environmental, never a credential verdict.
        return Ok(unknown(&format!(
            "login view unreachable (tried: {})",
            nav.attempted.join(", ")
        )));
    }

    let outcome = submit::submit(page, credential, SUBMIT_TIMEOUT).await?;
    info!(
        "attempt '{}': submitted via '{}' strategy",
        credential.username, outcome.used_strategy
    );

    let live = LiveEvidence::new(page, &credential.username, profile);
    Ok(resolver::resolve(&live, &ResolverConfig::from_profile(profile)).await)
}

fn unknown(reason: &str) -> Resolution {
    Resolution {
        verdict: Verdict::FailUnknown,
        reason: reason.to_string(),
        evidence: EvidenceSnapshot::default(),
    }
}
