//! Submission driver — fill and submit the login form with tightly scoped
//! control resolution.
//!
//! Page-wide matching on a generic label like "submit" can hit a decoy or
//! unrelated control elsewhere in the DOM, so the submit control is resolved
//! by narrowing scope outward from the username input: enclosing form holding
//! both inputs → nearest container that also holds the password input →
//! page-wide unique-by-label match as the last resort.
//!
//! No retries: a failure here means the UI changed shape, and the attempt
//! boundary maps it to an ERROR verdict.

use chromiumoxide::Page;
use std::time::Duration;

use crate::core::types::{AttemptError, Credential};

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    /// Which scoping strategy resolved the submit control:
    /// `"form"`, `"container"`, or `"page-unique-label"`.
    pub used_strategy: String,
}

/// Build the injected fill-and-submit script.
///
/// The credential is embedded as JSON string literals, so quotes, backslashes
/// and delimiter characters survive verbatim; the password is NEVER trimmed
/// or normalized (trailing whitespace is part of the secret). Values are set
/// through native setters plus `input`/`change` events so the SPA's bindings
/// observe them.
pub fn build_submit_script(username: &str, password: &str) -> String {
    let user_js = serde_json::Value::from(username).to_string();
    let pass_js = serde_json::Value::from(password).to_string();
    format!(
        r#"
(() => {{
  const USER = {user_js};
  const PASS = {pass_js};
  const visible = el => {{
    const s = window.getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden';
  }};
  const users = Array.from(document.querySelectorAll(
    'input[name="username"], input[autocomplete="username"], input[name="user"], input[id*="user"]'
  )).filter(visible);
  if (users.length === 0) return {{ error: 'username input not found' }};
  const userInput = users[0];

  const setValue = (el, value) => {{
    el.focus();
    el.value = value;
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  }};

  const passSel = 'input[type="password"]';
  let strategy = 'form';
  let scope = userInput.closest('form');
  if (!scope || !scope.querySelector(passSel)) {{
    strategy = 'container';
    scope = null;
    let node = userInput.parentElement;
    while (node && node !== document.body) {{
      if (node.querySelector(passSel)) {{ scope = node; break; }}
      node = node.parentElement;
    }}
  }}

  const passInput = scope ? scope.querySelector(passSel) : document.querySelector(passSel);
  if (!passInput) return {{ error: 'password input not found' }};

  setValue(userInput, USER);
  setValue(passInput, PASS);

  const submitLabel = el => {{
    const label = ((el.innerText || el.value || '') + '').trim().toLowerCase();
    return label === 'login' || label === 'log in' || label === 'sign in' || label === 'submit';
  }};
  let controls = [];
  if (scope) {{
    controls = Array.from(scope.querySelectorAll('button, input[type="submit"]')).filter(submitLabel);
    if (controls.length === 0) {{
      controls = Array.from(scope.querySelectorAll('button, input[type="submit"]'));
    }}
  }}
  if (controls.length === 0) {{
    strategy = 'page-unique-label';
    controls = Array.from(document.querySelectorAll('button, input[type="submit"]')).filter(submitLabel);
    if (controls.length !== 1) {{
      return {{ error: 'submit control ambiguous: ' + controls.length + ' label matches page-wide' }};
    }}
  }}
  controls[0].click();
  return {{ strategy: strategy }};
}})()
"#
    )
}

/// Fill username then password and click the resolved submit control, bounded
/// by `timeout`.
pub async fn submit(
    page: &Page,
    credential: &Credential,
    timeout: Duration,
) -> Result<SubmitOutcome, AttemptError> {
    let script = build_submit_script(&credential.username, &credential.password);
    let outcome = tokio::time::timeout(timeout, page.evaluate(script))
        .await
        .map_err(|_| AttemptError::Timeout(timeout))?
        .map_err(AttemptError::Driver)?
        .into_value::<serde_json::Value>()
        .map_err(|e| AttemptError::ControlMissing(format!("submit script returned no result: {e}")))?;

    if let Some(err) = outcome.get("error").and_then(|v| v.as_str()) {
        return Err(AttemptError::ControlMissing(err.to_string()));
    }
    let used_strategy = outcome
        .get("strategy")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    Ok(SubmitOutcome { used_strategy })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_embedded_verbatim_and_escaped() {
        let js = build_submit_script("alice", r#"p:a,ss;" with "quotes" and trailing  "#);
        // JSON escaping keeps quotes intact and the trailing spaces inside
        // the literal.
        assert!(js.contains(r#"const PASS = "p:a,ss;\" with \"quotes\" and trailing  ";"#));
        assert!(js.contains(r#"const USER = "alice";"#));
    }

    #[test]
    fn backslashes_survive_the_embedding() {
        let js = build_submit_script("dom\\user", "a\\b");
        assert!(js.contains(r#"const USER = "dom\\user";"#));
        assert!(js.contains(r#"const PASS = "a\\b";"#));
    }

    #[test]
    fn script_narrows_scope_before_page_wide_fallback() {
        let js = build_submit_script("u", "p");
        let form = js.find("closest('form')").expect("form scope first");
        let container = js.find("strategy = 'container'").expect("container second");
        let page_wide = js.find("strategy = 'page-unique-label'").expect("page-wide last");
        assert!(form < container && container < page_wide);
    }
}
