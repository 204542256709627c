// src/browser/probe.rs
//
// All page-specific detection heuristics live here. The login page's
// markup is not under our control; when Deezer changes it, this is the
// file to fix.
use chromiumoxide::Page;

use crate::errors::RunError;

// Snapshot of the signals the driver polls on while waiting for a login
// to reach a terminal state.
#[derive(Debug, Clone, Default)]
pub struct PageSignals {
    pub cookie: Option<String>,
    pub captcha_visible: bool,
    pub invalid_credentials: bool,
    pub logged_in: bool,
}

const PROBE_JS: &str = r#"(function() {
  const captcha = !!document.querySelector("iframe[src*='recaptcha']");
  const errorEl = document.querySelector("[data-testid='login-error'], .login-form-error");
  const text = (document.body && document.body.innerText || '').toLowerCase();
  const invalid = !!errorEl
    || text.includes('incorrect password')
    || text.includes('invalid email')
    || text.includes("this account doesn't exist");
  return { captcha, invalid };
})()"#;

pub(super) async fn collect(
    page: &Page,
    cookie: Option<String>,
    logged_in: bool,
) -> Result<PageSignals, RunError> {
    let value: serde_json::Value = page
        .evaluate(PROBE_JS)
        .await
        .map_err(|e| RunError::Browser(e.to_string()))?
        .into_value()
        .map_err(|e| RunError::Browser(e.to_string()))?;

    Ok(PageSignals {
        cookie,
        captcha_visible: value
            .get("captcha")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        invalid_credentials: value
            .get("invalid")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        logged_in,
    })
}
