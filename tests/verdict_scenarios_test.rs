/// Integration tests: end-to-end verdict scenarios over a scripted evidence
/// source: the full resolver state machine without a live browser.
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use login_scout::config::parse_delimited_credentials;
use login_scout::probe::evidence::{log_verdict_for, EvidenceSource};
use login_scout::probe::resolver::{resolve, ResolverConfig};
use login_scout::{EvidenceSnapshot, LogVerdict, Verdict};

// Initialize logging for tests
fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

fn fast_config() -> ResolverConfig {
    ResolverConfig {
        poll_window: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        settle_delay: Duration::from_millis(5),
    }
}

/// Feeds pre-scripted snapshots in order; the last one repeats forever.
struct ScriptedEvidence {
    feed: Mutex<Vec<EvidenceSnapshot>>,
    overlay_clears: bool,
}

impl ScriptedEvidence {
    fn new(feed: Vec<EvidenceSnapshot>, overlay_clears: bool) -> Self {
        assert!(!feed.is_empty());
        Self {
            feed: Mutex::new(feed),
            overlay_clears,
        }
    }
}

#[async_trait]
impl EvidenceSource for ScriptedEvidence {
    async fn sample(&self) -> EvidenceSnapshot {
        let mut feed = self.feed.lock().unwrap();
        if feed.len() > 1 {
            feed.remove(0)
        } else {
            feed[0]
        }
    }

    async fn wait_disconnect_clear(&self, _timeout: Duration) -> bool {
        if self.overlay_clears {
            // Drop any leading disconnected snapshots so polling resumes on
            // the post-overlay state.
            let mut feed = self.feed.lock().unwrap();
            while feed.len() > 1 && feed[0].disconnected_active {
                feed.remove(0);
            }
        }
        self.overlay_clears
    }
}

fn quiet() -> EvidenceSnapshot {
    EvidenceSnapshot::default()
}

fn with_log(log_verdict: LogVerdict) -> EvidenceSnapshot {
    EvidenceSnapshot {
        log_verdict,
        ..Default::default()
    }
}

// ── Scenario 1: delimiter-laden secret, success via the journal ──────────────

#[tokio::test]
async fn scenario_log_success_with_delimiter_laden_secret() {
    init_logger();

    // The secret contains every delimiter and must survive parsing verbatim.
    let creds = parse_delimited_credentials("alice:p:a,ss;");
    assert_eq!(creds.len(), 1);
    assert_eq!(creds[0].username, "alice");
    assert_eq!(creds[0].password, "p:a,ss;");

    let transcript = "authenticate (login: alice)\n\
                      Authenticated to authd.\n\
                      Authenticated to dnsmanagerd.\n";
    let log = log_verdict_for(transcript, &creds[0].username);
    assert_eq!(log, LogVerdict::Success);

    let source = ScriptedEvidence::new(vec![quiet(), with_log(log)], false);
    let resolution = resolve(&source, &fast_config()).await;
    assert_eq!(resolution.verdict, Verdict::Success);
    assert_eq!(resolution.reason, "log reported authentication success");
}

// ── Scenario 2: top banner dominates a simultaneous log success ──────────────

#[tokio::test]
async fn scenario_failure_banner_dominates_log_success() {
    init_logger();

    let conflicted = EvidenceSnapshot {
        failure_banner_visible: true,
        log_verdict: LogVerdict::Success,
        ..Default::default()
    };
    let source = ScriptedEvidence::new(vec![conflicted], false);
    let resolution = resolve(&source, &fast_config()).await;
    assert_eq!(resolution.verdict, Verdict::FailInvalid);
    assert_eq!(resolution.reason, "failure banner visible");
}

// ── Scenario 3: overlay never clears over the whole window ───────────────────

#[tokio::test]
async fn scenario_permanent_disconnect_is_unknown_with_sub_reason() {
    init_logger();

    let down = EvidenceSnapshot {
        disconnected_active: true,
        ..Default::default()
    };
    let source = ScriptedEvidence::new(vec![down], false);
    let started = Instant::now();
    let resolution = resolve(&source, &fast_config()).await;
    assert_eq!(resolution.verdict, Verdict::FailUnknown);
    assert_eq!(resolution.reason, "still disconnected at resolution");
    // A failed clearing wait ends the attempt instead of burning the rest
    // of the poll window.
    assert!(started.elapsed() < Duration::from_secs(5));
}

// ── Overlay clears mid-attempt, then the journal decides ─────────────────────

#[tokio::test]
async fn overlay_clearing_resumes_polling() {
    init_logger();

    let down = EvidenceSnapshot {
        disconnected_active: true,
        ..Default::default()
    };
    let source = ScriptedEvidence::new(
        vec![down, down, with_log(LogVerdict::FailInvalid)],
        true,
    );
    let resolution = resolve(&source, &fast_config()).await;
    assert_eq!(resolution.verdict, Verdict::FailInvalid);
    assert_eq!(resolution.reason, "log reported invalid credentials");
}

// ── Decisive evidence leaves POLLING early ───────────────────────────────────

#[tokio::test]
async fn decisive_signal_exits_the_window_early() {
    init_logger();

    let cfg = ResolverConfig {
        poll_window: Duration::from_secs(30),
        poll_interval: Duration::from_millis(5),
        settle_delay: Duration::from_millis(5),
    };
    let source = ScriptedEvidence::new(
        vec![quiet(), quiet(), with_log(LogVerdict::Success)],
        false,
    );
    let started = Instant::now();
    let resolution = resolve(&source, &cfg).await;
    assert_eq!(resolution.verdict, Verdict::Success);
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "resolver must not sit out the full 30s window"
    );
}

// ── Sampling is read-only ────────────────────────────────────────────────────

#[test]
fn resampling_without_mutation_is_idempotent() {
    let snap = EvidenceSnapshot {
        success_indicator_visible: true,
        log_verdict: LogVerdict::Unknown,
        ..Default::default()
    };
    let source = ScriptedEvidence::new(vec![snap], false);
    let a = tokio_test::block_on(source.sample());
    let b = tokio_test::block_on(source.sample());
    assert_eq!(a, b);
    assert_eq!(a, snap);
}

// ── Transcript cross-talk: an earlier attempt's outcome must not leak ────────

#[tokio::test]
async fn intermixed_transcript_resolves_only_the_newest_event() {
    init_logger();

    let transcript = "authenticate (login: alice)\n\
                      Error: Invalid credentials.\n\
                      authenticate (login: bob)\n\
                      Authenticated to authd.\n\
                      Authenticated to dnsmanagerd.\n\
                      authenticate (login: alice)\n\
                      Authenticated to authd.\n\
                      Authenticated to dnsmanagerd.\n";

    // alice's newest event succeeded; bob's event is not hers.
    assert_eq!(log_verdict_for(transcript, "alice"), LogVerdict::Success);
    assert_eq!(log_verdict_for(transcript, "bob"), LogVerdict::Success);
    assert_eq!(log_verdict_for(transcript, "mallory"), LogVerdict::None);

    let source = ScriptedEvidence::new(
        vec![with_log(log_verdict_for(transcript, "alice"))],
        false,
    );
    let resolution = resolve(&source, &fast_config()).await;
    assert_eq!(resolution.verdict, Verdict::Success);
}
