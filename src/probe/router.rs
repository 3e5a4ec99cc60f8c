//! Router — reach the authentication view without tripping over the SPA's
//! fragile routing.
//!
//! This class of SPA serves exactly one document from the origin; any
//! path-based deep link (`/login`) is answered with a server-side 404. Only
//! fragment routes (`#/login`) are safe to follow, so every candidate target
//! is filtered through [`fragment_target`] before navigation, and a rendered
//! not-found page is treated as a navigation failure to retry, never as
//! content to scrape for login evidence.

use chromiumoxide::Page;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::browser::{self, EVAL_TIMEOUT};
use crate::probe::ProbeProfile;

/// Fragment route aliases tried directly when no usable affordance exists.
pub const LOGIN_ROUTE_ALIASES: &[&str] = &["#/login", "#login", "#/auth", "#/authentication"];

const AFFORDANCE_LABELS: &[&str] = &["Login", "Log in", "Sign in", "Authentication"];

const INPUT_WAIT: Duration = Duration::from_secs(4);
const NAV_TIMEOUT: Duration = Duration::from_secs(15);
const SETTLE: Duration = Duration::from_millis(700);

/// What the router did and whether it got there.
#[derive(Debug, Clone)]
pub struct NavOutcome {
    /// The username input became visible.
    pub ok: bool,
    /// Every target tried, in order, for the diagnostic trail.
    pub attempted: Vec<String>,
}

// ── Pure helpers ─────────────────────────────────────────────────────────────

/// Extract the client-side fragment route from an href, or `None` when the
/// href would hit the origin server.
///
/// Accepted: `#/login`, `/#/login`, `index.html#/login` is NOT accepted: a
/// path component before the hash still round-trips through the server.
pub fn fragment_target(href: &str) -> Option<String> {
    let href = href.trim();
    let hash = href.find('#')?;
    let (path, frag) = href.split_at(hash);
    if frag.len() <= 1 {
        return None; // bare "#" is not a route
    }
    if path.is_empty() || path == "/" {
        Some(frag.to_string())
    } else {
        None
    }
}

/// Server-side not-found detection by title pattern or known body markers.
pub fn looks_like_not_found(title: &str, body_excerpt: &str) -> bool {
    let t = title.to_lowercase();
    if t.contains("404") || t.contains("not found") {
        return true;
    }
    let b = body_excerpt.trim_start();
    b.starts_with("Cannot GET") || b.to_lowercase().contains("404 not found")
}

// ── Live navigation ──────────────────────────────────────────────────────────

/// Drive the page to the login view. Each step is abandoned on failure
/// without raising; exhausting every target reports `ok = false`, which the
/// caller must map to FAIL_UNKNOWN, never to a credential error.
pub async fn navigate_to_login(page: &Page, profile: &ProbeProfile) -> NavOutcome {
    let mut attempted = Vec::new();

    // (a)/(b) visible affordances, fragment-only. A path-based href is
    // recorded but never followed.
    for label in AFFORDANCE_LABELS {
        let Some(href) = affordance_href(page, label).await else {
            continue;
        };
        match fragment_target(&href) {
            Some(frag) => {
                attempted.push(format!("{label} → {frag}"));
                if click_affordance(page, label).await
                    && username_input_appears(page, INPUT_WAIT).await
                {
                    info!("router: login view reached via '{}' affordance", label);
                    return NavOutcome {
                        ok: true,
                        attempted,
                    };
                }
            }
            None => {
                warn!(
                    "router: '{}' affordance targets a server path ({}), refusing to follow",
                    label, href
                );
                attempted.push(format!("{label} → {href} (refused, path-based)"));
            }
        }
    }

    // (c) direct fragment assignment over the known aliases, reloading from
    // the origin first for a clean SPA bootstrap; one retry on a 404 page.
    for alias in LOGIN_ROUTE_ALIASES {
        attempted.push(alias.to_string());
        for round in 0..2 {
            if !bootstrap_from_origin(page, profile).await {
                break;
            }
            let set_hash = format!("location.hash = {}", serde_json::Value::from(*alias));
            if page.evaluate(set_hash.as_str()).await.is_err() {
                break;
            }
            tokio::time::sleep(SETTLE).await;

            if username_input_appears(page, INPUT_WAIT).await {
                info!("router: login view reached via alias {}", alias);
                return NavOutcome {
                    ok: true,
                    attempted,
                };
            }
            if page_is_not_found(page).await {
                debug!("router: not-found page after {} (round {})", alias, round + 1);
                continue; // re-bootstrap and retry this alias once
            }
            break; // rendered something, just not the login view; next alias
        }
    }

    NavOutcome {
        ok: false,
        attempted,
    }
}

async fn bootstrap_from_origin(page: &Page, profile: &ProbeProfile) -> bool {
    let nav = tokio::time::timeout(NAV_TIMEOUT, page.goto(profile.base_url.as_str())).await;
    match nav {
        Ok(Ok(_)) => {
            tokio::time::sleep(SETTLE).await;
            true
        }
        Ok(Err(e)) => {
            warn!("router: origin reload failed: {}", e);
            false
        }
        Err(_) => {
            warn!("router: origin reload timed out");
            false
        }
    }
}

async fn affordance_href(page: &Page, label: &str) -> Option<String> {
    let js = format!(
        r#"
(() => {{
  const label = {};
  for (const el of document.querySelectorAll('a, [role="tab"] a')) {{
    const s = window.getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') continue;
    if ((el.innerText || '').trim().toLowerCase() === label.toLowerCase()) {{
      return el.getAttribute('href') || '';
    }}
  }}
  return null;
}})()
"#,
        serde_json::Value::from(label)
    );
    browser::eval_string(page, &js, EVAL_TIMEOUT)
        .await
        .filter(|h| !h.is_empty())
}

async fn click_affordance(page: &Page, label: &str) -> bool {
    let js = format!(
        r#"
(() => {{
  const label = {};
  for (const el of document.querySelectorAll('a, [role="tab"] a')) {{
    const s = window.getComputedStyle(el);
    if (s.display === 'none' || s.visibility === 'hidden') continue;
    if ((el.innerText || '').trim().toLowerCase() === label.toLowerCase()) {{
      el.click();
      return true;
    }}
  }}
  return false;
}})()
"#,
        serde_json::Value::from(label)
    );
    browser::eval_bool(page, &js, EVAL_TIMEOUT)
        .await
        .unwrap_or(false)
}

const USERNAME_INPUT_PROBE_JS: &str = r#"
(() => {
  const el = document.querySelector(
    'input[name="username"], input[autocomplete="username"], input[name="user"], input[id*="user"]'
  );
  if (!el) return false;
  const s = window.getComputedStyle(el);
  return s.display !== 'none' && s.visibility !== 'hidden';
})()
"#;

/// Poll until the username input is visible or `timeout` elapses.
pub async fn username_input_appears(page: &Page, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if browser::eval_bool(page, USERNAME_INPUT_PROBE_JS, EVAL_TIMEOUT)
            .await
            .unwrap_or(false)
        {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

async fn page_is_not_found(page: &Page) -> bool {
    let title = browser::eval_string(page, "document.title", EVAL_TIMEOUT)
        .await
        .unwrap_or_default();
    let body = browser::eval_string(
        page,
        "document.body ? document.body.innerText.slice(0, 400) : ''",
        EVAL_TIMEOUT,
    )
    .await
    .unwrap_or_default();
    looks_like_not_found(&title, &body)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_routes_are_accepted() {
        assert_eq!(fragment_target("#/login").as_deref(), Some("#/login"));
        assert_eq!(fragment_target("/#/auth").as_deref(), Some("#/auth"));
        assert_eq!(fragment_target("  #login ").as_deref(), Some("#login"));
    }

    /// A path-based login href points at a route the origin server 404s on;
    /// it must never be followed.
    #[test]
    fn path_targets_are_refused() {
        assert_eq!(fragment_target("/login"), None);
        assert_eq!(fragment_target("login"), None);
        assert_eq!(fragment_target("/admin#/login"), None);
        assert_eq!(fragment_target("https://host/admin#/login"), None);
    }

    #[test]
    fn bare_hash_is_not_a_route() {
        assert_eq!(fragment_target("#"), None);
        assert_eq!(fragment_target(""), None);
    }

    #[test]
    fn not_found_detection_by_title() {
        assert!(looks_like_not_found("404 Not Found", ""));
        assert!(looks_like_not_found("Page not found", ""));
        assert!(!looks_like_not_found("Router Admin", "welcome"));
    }

    #[test]
    fn not_found_detection_by_body_marker() {
        assert!(looks_like_not_found("", "Cannot GET /login"));
        assert!(looks_like_not_found("", "  404 not found\nnginx"));
        assert!(!looks_like_not_found("", "Invalid credentials"));
    }
}
