//! Outbound run notification — one text message to a messaging webhook,
//! truncated to the channel's size limit.
//!
//! An unconfigured webhook is not an error: the summary is simply not
//! delivered. Delivery itself is retried with exponential backoff because
//! the probe usually runs from flaky lab networks.

use anyhow::{anyhow, Result};
use backoff::ExponentialBackoffBuilder;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::types::{RunSummary, Verdict};

/// Known size limit of the webhook channel, in characters.
pub const MESSAGE_LIMIT: usize = 3800;
pub const TRUNCATION_MARKER: &str = "… [truncated]";

fn verdict_emoji(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Success => "✅",
        Verdict::FailInvalid => "❌",
        Verdict::FailUnknown => "❓",
        Verdict::Error => "💥",
    }
}

/// Render the per-attempt status lines plus aggregate counts, bounded by
/// [`MESSAGE_LIMIT`]. Passwords never appear here, only identities,
/// verdicts and reasons.
pub fn compose_summary(summary: &RunSummary, base_url: &str) -> String {
    let mut lines = Vec::with_capacity(summary.total() + 2);
    lines.push(format!(
        "🔎 login-scout: {} attempt(s) against {}",
        summary.total(),
        base_url
    ));
    for r in &summary.reports {
        lines.push(format!(
            "{} {} — {} ({}, {:.1}s)",
            verdict_emoji(r.verdict),
            r.username,
            r.verdict,
            r.reason,
            r.duration_ms as f64 / 1000.0
        ));
    }
    lines.push(format!(
        "Totals: {} success / {} invalid / {} unknown / {} error — {:.1}s wall",
        summary.count(Verdict::Success),
        summary.count(Verdict::FailInvalid),
        summary.count(Verdict::FailUnknown),
        summary.count(Verdict::Error),
        summary.total_duration_ms as f64 / 1000.0
    ));
    truncate_for_channel(lines.join("\n"), MESSAGE_LIMIT)
}

/// Cut `text` to `limit` characters, appending the truncation marker when
/// anything was dropped.
pub fn truncate_for_channel(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    let keep = limit.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// POST the summary text to the webhook as `{"text": ...}`.
///
/// `None` webhook → logged skip, `Ok(())`. Transient send failures are
/// retried for up to 30 s before giving up.
pub async fn deliver(webhook_url: Option<&str>, text: &str) -> Result<()> {
    let Some(url) = webhook_url else {
        info!("webhook not configured — summary not delivered");
        return Ok(());
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let payload = serde_json::json!({ "text": text });

    let policy = ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::from_secs(30)))
        .build();
    let url = url.to_string();
    backoff::future::retry(policy, || async {
        let resp = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(backoff::Error::transient)?;
        resp.error_for_status().map_err(|e| {
            warn!("webhook returned an error status: {}", e);
            backoff::Error::transient(e)
        })?;
        Ok::<(), backoff::Error<reqwest::Error>>(())
    })
    .await
    .map_err(|e| anyhow!("webhook delivery failed after retries: {}", e))?;

    info!("📨 run summary delivered to webhook");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AttemptReport, EvidenceSnapshot};

    fn report(username: &str, verdict: Verdict, reason: &str) -> AttemptReport {
        AttemptReport {
            username: username.into(),
            verdict,
            reason: reason.into(),
            evidence: EvidenceSnapshot::default(),
            screenshot_path: None,
            log_excerpt_path: None,
            duration_ms: 1200,
        }
    }

    #[test]
    fn summary_carries_lines_and_tallies() {
        let summary = RunSummary {
            reports: vec![
                report("alice", Verdict::Success, "log reported authentication success"),
                report("bob", Verdict::FailInvalid, "failure banner visible"),
                report("carol", Verdict::FailUnknown, "still disconnected at resolution"),
            ],
            total_duration_ms: 95_000,
        };
        let text = compose_summary(&summary, "http://10.0.0.1");
        assert!(text.contains("3 attempt(s)"));
        assert!(text.contains("alice — SUCCESS"));
        assert!(text.contains("bob — FAIL_INVALID"));
        assert!(text.contains("1 success / 1 invalid / 1 unknown / 0 error"));
    }

    #[test]
    fn short_messages_are_untouched() {
        let text = truncate_for_channel("hello".into(), 10);
        assert_eq!(text, "hello");
    }

    #[test]
    fn long_messages_are_cut_with_marker_at_the_limit() {
        let text = truncate_for_channel("x".repeat(100), 40);
        assert_eq!(text.chars().count(), 40);
        assert!(text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn oversized_summary_is_bounded() {
        let reports: Vec<AttemptReport> = (0..500)
            .map(|i| report(&format!("user{i}"), Verdict::FailUnknown, "no decisive signal"))
            .collect();
        let summary = RunSummary {
            reports,
            total_duration_ms: 1,
        };
        let text = compose_summary(&summary, "http://10.0.0.1");
        assert!(text.chars().count() <= MESSAGE_LIMIT);
        assert!(text.ends_with(TRUNCATION_MARKER));
    }
}
