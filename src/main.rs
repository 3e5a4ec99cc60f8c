use anyhow::Context;
use tracing::{info, warn};

use login_scout::artifacts::ArtifactStore;
use login_scout::browser::BrowserPool;
use login_scout::config::{self, ScoutConfig};
use login_scout::probe::{runner, ProbeProfile};
use login_scout::{notify, Verdict};

fn parse_config_path_from_args() -> Option<String> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        if a == "--config" {
            if let Some(v) = args.next() {
                return Some(v);
            }
        } else if let Some(rest) = a.strip_prefix("--config=") {
            return Some(rest.to_string());
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // An explicit --config path must exist and parse; the implicit search
    // path is allowed to fall back to defaults.
    let cfg: ScoutConfig = match parse_config_path_from_args() {
        Some(path) => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("cannot read config file {path}"))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("cannot parse config file {path}"))?
        }
        None => config::load_scout_config(),
    };

    // Fatal configuration checks; nothing runs without them.
    let base_url = cfg.resolve_base_url().context(
        "no base URL configured (set base_url in login-scout.json or LOGIN_SCOUT_BASE_URL)",
    )?;
    url::Url::parse(&base_url).with_context(|| format!("base URL is not a URL: {base_url}"))?;

    let credentials = cfg.resolve_credentials();
    if credentials.is_empty() {
        anyhow::bail!(
            "no credentials resolved (set credentials/credentials_text in login-scout.json \
             or LOGIN_SCOUT_CREDENTIALS as newline-delimited user:pass records)"
        );
    }

    let pool = BrowserPool::new_auto().context(
        "no browser found. Install Chrome or Chromium, or point CHROME_EXECUTABLE at one.",
    )?;

    let profile = ProbeProfile::from_config(&cfg, base_url);
    let artifacts = ArtifactStore::new(cfg.resolve_artifacts_dir());

    info!(
        "starting login-scout: {} credential(s) against {} (poll window {:?}, banner cutoff {}px)",
        credentials.len(),
        profile.base_url,
        profile.poll_window,
        profile.banner_max_y
    );

    let summary = runner::run(&pool, &profile, &credentials, &artifacts).await;

    for r in &summary.reports {
        info!("  {} → {} ({})", r.username, r.verdict, r.reason);
    }
    info!(
        "run complete: {} success / {} invalid / {} unknown / {} error",
        summary.count(Verdict::Success),
        summary.count(Verdict::FailInvalid),
        summary.count(Verdict::FailUnknown),
        summary.count(Verdict::Error)
    );

    // Individual verdicts never fail the process; a lost notification only
    // warns.
    let text = notify::compose_summary(&summary, &profile.base_url);
    if let Err(e) = notify::deliver(cfg.resolve_webhook_url().as_deref(), &text).await {
        warn!("{}", e);
    }

    pool.shutdown().await;
    Ok(())
}
