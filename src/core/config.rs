use std::path::Path;
use std::time::Duration;

use crate::core::types::Credential;

// ---------------------------------------------------------------------------
// ScoutConfig — file-based config loader (login-scout.json) with env-var fallback
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "LOGIN_SCOUT_CONFIG";
pub const ENV_BASE_URL: &str = "LOGIN_SCOUT_BASE_URL";
pub const ENV_CREDENTIALS: &str = "LOGIN_SCOUT_CREDENTIALS";
pub const ENV_WEBHOOK_URL: &str = "LOGIN_SCOUT_WEBHOOK_URL";
pub const ENV_ARTIFACTS_DIR: &str = "LOGIN_SCOUT_ARTIFACTS_DIR";
pub const ENV_PERSIST_ARTIFACTS: &str = "LOGIN_SCOUT_PERSIST_ARTIFACTS";
pub const ENV_BANNER_MAX_Y: &str = "LOGIN_SCOUT_BANNER_MAX_Y";
pub const ENV_POLL_WINDOW_SECS: &str = "LOGIN_SCOUT_POLL_WINDOW_SECS";
pub const ENV_SETTLE_DELAY_MS: &str = "LOGIN_SCOUT_SETTLE_DELAY_MS";
pub const ENV_ATTEMPT_GAP_SECS: &str = "LOGIN_SCOUT_ATTEMPT_GAP_SECS";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Top-level config loaded from `login-scout.json`.
///
/// Every field is optional; `resolve_*` accessors apply the
/// file → env var → built-in default chain.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct ScoutConfig {
    /// Origin of the SPA under probe, e.g. `http://192.168.1.1`.
    pub base_url: Option<String>,
    /// Structured credential records. Takes precedence over `credentials_text`.
    pub credentials: Option<Vec<Credential>>,
    /// Newline-delimited `user:pass` fallback. Split at the FIRST `:` only;
    /// the password part is kept verbatim (trailing spaces included).
    pub credentials_text: Option<String>,
    /// Messaging webhook for the run summary. Absent → summary not delivered.
    pub webhook_url: Option<String>,
    pub artifacts_dir: Option<String>,
    /// Persist per-attempt screenshot + log excerpt. Default: `true`.
    pub persist_artifacts: Option<bool>,
    /// Vertical cutoff (px) below which a failure-phrase occurrence is treated
    /// as journal echo rather than a top-level banner. Layout-fragile; tune
    /// per deployment. Default: 450.
    pub banner_max_y: Option<f64>,
    /// When `true`, the readiness gate insists on the home-marker text.
    /// Default `false`: any visible primary navigation link is accepted.
    pub require_home_marker: Option<bool>,
    /// Stable UI text proving the SPA finished its initial render.
    pub home_marker_text: Option<String>,
    pub poll_window_secs: Option<u64>,
    pub settle_delay_ms: Option<u64>,
    pub attempt_gap_secs: Option<u64>,
}

/// Load `login-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `LOGIN_SCOUT_CONFIG` env var path
/// 2. `./login-scout.json` (process cwd)
/// 3. `../login-scout.json` (repo root when running from a subdir)
///
/// Missing file → `ScoutConfig::default()` (silent, all env-var fallbacks
/// apply). Parse error → log a warning, return defaults.
pub fn load_scout_config() -> ScoutConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("login-scout.json"),
            std::path::PathBuf::from("../login-scout.json"),
        ];
        if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<ScoutConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("login-scout.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "login-scout.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return ScoutConfig::default();
                }
            },
            Err(_) => continue, // not found at this path, try next
        }
    }

    ScoutConfig::default()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl ScoutConfig {
    /// SPA origin: JSON field → `LOGIN_SCOUT_BASE_URL` env var → `None`.
    /// A missing base URL is a fatal configuration error handled in `main`.
    pub fn resolve_base_url(&self) -> Option<String> {
        self.base_url
            .as_ref()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .or_else(|| env_string(ENV_BASE_URL).map(|u| u.trim_end_matches('/').to_string()))
    }

    /// The ordered credential list: structured records → delimited text field
    /// → `LOGIN_SCOUT_CREDENTIALS` env var. Empty means "no credentials
    /// resolvable", which `main` treats as fatal.
    pub fn resolve_credentials(&self) -> Vec<Credential> {
        if let Some(list) = &self.credentials {
            let valid: Vec<Credential> = list
                .iter()
                .filter(|c| !c.username.is_empty() && !c.password.is_empty())
                .cloned()
                .collect();
            if !valid.is_empty() {
                return valid;
            }
        }
        if let Some(text) = &self.credentials_text {
            let parsed = parse_delimited_credentials(text);
            if !parsed.is_empty() {
                return parsed;
            }
        }
        std::env::var(ENV_CREDENTIALS)
            .map(|t| parse_delimited_credentials(&t))
            .unwrap_or_default()
    }

    /// Webhook target: JSON field → `LOGIN_SCOUT_WEBHOOK_URL` → `None`.
    /// `None` is not an error; the summary is simply not delivered.
    pub fn resolve_webhook_url(&self) -> Option<String> {
        self.webhook_url
            .as_ref()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .or_else(|| env_string(ENV_WEBHOOK_URL))
    }

    pub fn resolve_artifacts_dir(&self) -> Option<String> {
        self.artifacts_dir
            .as_ref()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .or_else(|| env_string(ENV_ARTIFACTS_DIR))
    }

    pub fn resolve_persist_artifacts(&self) -> bool {
        if let Some(b) = self.persist_artifacts {
            return b;
        }
        std::env::var(ENV_PERSIST_ARTIFACTS)
            .map(|v| v.trim() != "0")
            .unwrap_or(true)
    }

    /// Banner cutoff: JSON field → `LOGIN_SCOUT_BANNER_MAX_Y` → 450.0 px.
    pub fn resolve_banner_max_y(&self) -> f64 {
        self.banner_max_y
            .or_else(|| env_parse(ENV_BANNER_MAX_Y))
            .unwrap_or(450.0)
    }

    pub fn resolve_require_home_marker(&self) -> bool {
        self.require_home_marker.unwrap_or(false)
    }

    pub fn resolve_home_marker_text(&self) -> String {
        self.home_marker_text
            .as_ref()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Dashboard".to_string())
    }

    /// Resolver polling window: JSON → env → 40 s.
    pub fn resolve_poll_window(&self) -> Duration {
        Duration::from_secs(
            self.poll_window_secs
                .or_else(|| env_parse(ENV_POLL_WINDOW_SECS))
                .unwrap_or(40),
        )
    }

    /// Post-poll settle delay: JSON → env → 1500 ms.
    pub fn resolve_settle_delay(&self) -> Duration {
        Duration::from_millis(
            self.settle_delay_ms
                .or_else(|| env_parse(ENV_SETTLE_DELAY_MS))
                .unwrap_or(1500),
        )
    }

    /// Fixed pause between attempts: JSON → env → 5 s.
    pub fn resolve_attempt_gap(&self) -> Duration {
        Duration::from_secs(
            self.attempt_gap_secs
                .or_else(|| env_parse(ENV_ATTEMPT_GAP_SECS))
                .unwrap_or(5),
        )
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `browser::find_chrome_executable`).
/// Only returns a value when `CHROME_EXECUTABLE` points at an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Delimited credential parsing
// ---------------------------------------------------------------------------

/// Parse newline-delimited `user:pass` records.
///
/// Each record splits at the FIRST `:` only; everything after it — including
/// further `:`/`,`/`;` and trailing spaces — is the password, verbatim.
/// The username side is trimmed (login names carry no meaningful whitespace).
/// Records without a `:`, or with an empty side, are skipped with a warning.
pub fn parse_delimited_credentials(text: &str) -> Vec<Credential> {
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        // `lines()` strips `\n` but leaves a CRLF carriage return behind.
        let record = line.strip_suffix('\r').unwrap_or(line);
        if record.trim().is_empty() {
            continue;
        }
        let Some((user, pass)) = record.split_once(':') else {
            tracing::warn!("credentials line {}: no ':' delimiter — skipped", idx + 1);
            continue;
        };
        let user = user.trim();
        if user.is_empty() || pass.is_empty() {
            tracing::warn!("credentials line {}: empty identity or secret — skipped", idx + 1);
            continue;
        }
        out.push(Credential::new(user, pass));
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_at_first_colon_only() {
        let creds = parse_delimited_credentials("alice:p:a,ss;");
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].username, "alice");
        assert_eq!(creds[0].password, "p:a,ss;");
    }

    #[test]
    fn trailing_spaces_in_password_are_preserved() {
        let creds = parse_delimited_credentials("bob:secret with spaces  \ncarol:x");
        assert_eq!(creds[0].password, "secret with spaces  ");
        assert_eq!(creds[1].password, "x");
    }

    #[test]
    fn crlf_records_do_not_leak_carriage_returns() {
        let creds = parse_delimited_credentials("dave:pw1\r\nerin:pw2\r\n");
        assert_eq!(creds.len(), 2);
        assert_eq!(creds[0].password, "pw1");
        assert_eq!(creds[1].password, "pw2");
    }

    #[test]
    fn malformed_records_are_skipped() {
        let creds = parse_delimited_credentials("no-delimiter\n:nopass-user\nuser-nopass:\nok:pw");
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].username, "ok");
    }

    #[test]
    fn structured_list_wins_over_delimited_text() {
        let cfg = ScoutConfig {
            credentials: Some(vec![Credential::new("a", "1")]),
            credentials_text: Some("b:2".into()),
            ..Default::default()
        };
        let creds = cfg.resolve_credentials();
        assert_eq!(creds.len(), 1);
        assert_eq!(creds[0].username, "a");
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let cfg = ScoutConfig {
            base_url: Some("http://10.0.0.1/".into()),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_base_url().as_deref(), Some("http://10.0.0.1"));
    }

    #[test]
    fn tuning_defaults() {
        let cfg = ScoutConfig::default();
        assert!((cfg.resolve_banner_max_y() - 450.0).abs() < f64::EPSILON);
        assert!(!cfg.resolve_require_home_marker());
        assert_eq!(cfg.resolve_poll_window(), Duration::from_secs(40));
        assert_eq!(cfg.resolve_settle_delay(), Duration::from_millis(1500));
        assert_eq!(cfg.resolve_attempt_gap(), Duration::from_secs(5));
        assert!(cfg.resolve_persist_artifacts());
    }
}
