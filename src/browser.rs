//! Native browser management using `chromiumoxide`.
//!
//! This module is the single source of truth for:
//! * Finding a usable browser executable (Chrome → Chromium → Brave, cross-platform).
//! * `BrowserPool` — one persistent browser instance, one fresh tab per attempt.
//! * Bounded `evaluate` helpers that degrade to `None` instead of propagating.
//! * Per-attempt session-state reset (local/session storage + cookies).
//!
//! Every probe module goes through here; nothing else talks to the driver's
//! launch surface directly.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
            "brave-browser",
            "brave",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Headless browser config builder ──────────────────────────────────────────

/// Build a `BrowserConfig` for headless operation.
///
/// Flags chosen for compatibility with CI / restricted environments
/// (`--no-sandbox`, `--disable-dev-shm-usage`) and for a quiet, deterministic
/// session (no sync, no translate, no crash reporter).
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox") // often required in CI / restricted environments
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage") // avoids /dev/shm OOM in constrained environments
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Browser pool ─────────────────────────────────────────────────────────────

/// A shared, long-lived browser instance that hands out a fresh tab per
/// attempt.
///
/// Attempts must never share a tab: a stale authentication artifact from one
/// credential would leak success signals into the next. The pool keeps one
/// browser alive across the whole run (so launches stay cheap) and restarts
/// it transparently if the process has crashed between attempts.
pub struct BrowserPool {
    exe: String,
    width: u32,
    height: u32,
    inner: Mutex<Option<Browser>>,
}

impl BrowserPool {
    /// Create a pool for the given executable. Browser is lazy-started.
    pub fn new(exe: impl Into<String>, width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            exe: exe.into(),
            width,
            height,
            inner: Mutex::new(None),
        })
    }

    /// Create a pool using the auto-discovered executable.
    /// Returns `None` if no browser is installed on this machine.
    pub fn new_auto() -> Option<Arc<Self>> {
        find_chrome_executable().map(|exe| Self::new(exe, 1366, 768))
    }

    /// Acquire a fresh tab from the persistent browser.
    ///
    /// * Lazy-starts the browser on first call.
    /// * Restarts transparently if the process has crashed.
    /// * Close the returned `Page` at attempt end — the browser stays alive.
    pub async fn acquire(&self) -> Result<Page> {
        let mut guard = self.inner.lock().await;

        // Probe: try opening a blank tab to test if the browser is still alive.
        let alive = match guard.as_mut() {
            Some(b) => b.new_page("about:blank").await.is_ok(),
            None => false,
        };

        if !alive {
            if guard.is_some() {
                warn!("🔄 browser pool: instance dead, restarting...");
                if let Some(mut old) = guard.take() {
                    let _ = old.close().await;
                }
            }
            info!("🚀 browser pool: launching new instance ({})", self.exe);
            let config = build_headless_config(&self.exe, self.width, self.height)?;
            let (new_browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| anyhow!("pool: failed to launch ({}): {}", self.exe, e))?;
            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(e) = event {
                        warn!("pool CDP handler error: {}", e);
                    }
                }
            });
            *guard = Some(new_browser);
        }

        let b = guard.as_mut().expect("browser present after init");
        b.new_page("about:blank")
            .await
            .map_err(|e| anyhow!("pool: failed to open tab: {}", e))
    }

    /// Gracefully close the pooled browser instance.
    pub async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(mut b) = guard.take() {
            let _ = b.close().await;
            info!("🛑 browser pool shut down");
        }
    }
}

impl Drop for BrowserPool {
    fn drop(&mut self) {
        // Drop cannot await; if we're inside a tokio runtime, spawn a task to
        // close the browser to avoid zombie Chromium processes.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        if let Ok(mut guard) = self.inner.try_lock() {
            if let Some(mut browser) = guard.take() {
                handle.spawn(async move {
                    let _ = browser.close().await;
                });
            }
        }
    }
}

// ── Bounded evaluate helpers ─────────────────────────────────────────────────

/// How long a single evidence-channel read may take before it degrades to
/// "not observed".
pub const EVAL_TIMEOUT: Duration = Duration::from_secs(5);

async fn eval_json(page: &Page, js: &str, timeout: Duration) -> Option<serde_json::Value> {
    match tokio::time::timeout(timeout, page.evaluate(js)).await {
        Ok(Ok(v)) => v.into_value::<serde_json::Value>().ok(),
        Ok(Err(e)) => {
            warn!("evaluate failed (degrading to not-observed): {}", e);
            None
        }
        Err(_) => {
            warn!("evaluate timed out after {:?} (degrading to not-observed)", timeout);
            None
        }
    }
}

/// Evaluate `js` expecting a boolean. Errors and timeouts yield `None`,
/// never a panic or a propagated failure; channel reads are best-effort.
pub async fn eval_bool(page: &Page, js: &str, timeout: Duration) -> Option<bool> {
    eval_json(page, js, timeout).await.and_then(|j| j.as_bool())
}

/// Evaluate `js` expecting a string.
pub async fn eval_string(page: &Page, js: &str, timeout: Duration) -> Option<String> {
    eval_json(page, js, timeout)
        .await
        .and_then(|j| j.as_str().map(|s| s.to_string()))
}

// ── Per-attempt session isolation ────────────────────────────────────────────

/// Clear local/session storage and cookies so no authentication artifact from
/// a previous attempt can leak success signals into this one.
///
/// Call after navigating to the origin (storage is origin-scoped) and before
/// the SPA bootstrap that the readiness gate observes. Best-effort: a failure
/// here is logged, not fatal; the attempt still runs on a fresh tab.
pub async fn clear_session_state(page: &Page) {
    use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;

    if let Err(e) = page
        .evaluate("try { localStorage.clear(); sessionStorage.clear(); } catch (e) {}")
        .await
    {
        warn!("session reset: storage clear failed: {}", e);
    }
    match page.execute(ClearBrowserCookiesParams::default()).await {
        Ok(_) => info!("🧹 session reset: storage + cookies cleared"),
        Err(e) => warn!("session reset: cookie clear failed: {}", e),
    }
}
