use serde::{Deserialize, Serialize};
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

/// One identity/secret pair to probe.
///
/// The password is opaque payload: it may contain `:`/`,`/`;`, leading or
/// trailing whitespace, anything. It is filled into the login form verbatim
/// and never written into artifacts or log lines.
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Redact the password so `{:?}` in logs and panics can never leak it.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Evidence
// ─────────────────────────────────────────────────────────────────────────────

/// What the streamed server journal says about the current attempt,
/// evaluated strictly *after* the last anchor line for this username.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogVerdict {
    /// No anchor line found at all: insufficient evidence, distinct from
    /// "anchor present but inconclusive".
    #[default]
    None,
    /// Anchor present, trailing text decides nothing yet.
    Unknown,
    /// Both post-anchor success markers observed.
    Success,
    /// Post-anchor credential-failure marker observed.
    FailInvalid,
}

impl LogVerdict {
    /// A decisive state ends the resolver's polling loop early.
    pub fn is_decisive(self) -> bool {
        matches!(self, LogVerdict::Success | LogVerdict::FailInvalid)
    }
}

/// One read of the three evidence channels. Resampled repeatedly during the
/// polling window; the final sample before resolution is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EvidenceSnapshot {
    /// The "connection lost" overlay is currently visible.
    pub disconnected_active: bool,
    /// The credential-rejection phrase rendered as a *top-level* banner
    /// (above the vertical threshold or inside an alert container), not as
    /// journal echo.
    pub failure_banner_visible: bool,
    /// A post-login success indicator is visible in the UI.
    pub success_indicator_visible: bool,
    pub log_verdict: LogVerdict,
}

impl EvidenceSnapshot {
    /// Any signal that lets the polling loop stop early.
    pub fn is_decisive(&self) -> bool {
        self.failure_banner_visible
            || self.success_indicator_visible
            || self.log_verdict.is_decisive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Verdicts
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal classification of one login attempt. Assigned exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Success,
    FailInvalid,
    FailUnknown,
    Error,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Success => "SUCCESS",
            Verdict::FailInvalid => "FAIL_INVALID",
            Verdict::FailUnknown => "FAIL_UNKNOWN",
            Verdict::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Verdict plus the reason string and the authoritative final snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub verdict: Verdict,
    /// Human-readable, e.g. `"log reported invalid credentials"` or
    /// `"disconnect overlay never cleared"`.
    pub reason: String,
    pub evidence: EvidenceSnapshot,
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempt & run reporting
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one attempt produced, including diagnostic artifact paths when
/// persistence was enabled and capture succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptReport {
    pub username: String,
    pub verdict: Verdict,
    pub reason: String,
    pub evidence: EvidenceSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_excerpt_path: Option<String>,
    pub duration_ms: u64,
}

/// Aggregate outcome of a full run over the credential list.
#[derive(Debug, Clone, Serialize, Default)]
pub struct RunSummary {
    pub reports: Vec<AttemptReport>,
    pub total_duration_ms: u64,
}

impl RunSummary {
    pub fn count(&self, verdict: Verdict) -> usize {
        self.reports.iter().filter(|r| r.verdict == verdict).count()
    }

    pub fn total(&self) -> usize {
        self.reports.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempt-boundary errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that abort a single attempt (never the whole run). The runner
/// catches these at the attempt boundary and maps them to [`Verdict::Error`].
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("initial navigation failed: {0}")]
    Navigation(String),

    #[error("login control missing or ambiguous: {0}")]
    ControlMissing(String),

    #[error("driver call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Driver(#[from] chromiumoxide::error::CdpError),
}
