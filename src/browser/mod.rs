// src/browser/mod.rs
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    cdp::browser_protocol::{
        network::ClearBrowserCookiesParams, page::CaptureScreenshotFormat,
    },
    page::ScreenshotParams,
    Page,
};
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::errors::RunError;

mod probe;

pub use probe::PageSignals;

const GDPR_ACCEPT_SELECTOR: &str = "[data-testid='gdpr-btn-accept-all']";
const EMAIL_SELECTOR: &str = "[data-testid='email-field']";
const PASSWORD_SELECTOR: &str = "[data-testid='password-field']";
const LOGIN_BUTTON_SELECTOR: &str = "[data-testid='login-button']";

// One Chromium instance per account. Sessions never share a browser, so a
// cancelled or crashed run tears down only its own profile.
pub struct BrowserSession {
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
}

impl BrowserSession {
    pub async fn launch(profile_dir: &Path, headless: bool) -> Result<Self, RunError> {
        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile_dir)
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if let Some(chrome) = find_chrome() {
            builder = builder.chrome_executable(chrome);
        }
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(RunError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RunError::Browser(e.to_string()))?;
        // The CDP event stream must be drained for the browser to work at all.
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RunError::Browser(e.to_string()))?;

        Ok(BrowserSession {
            browser,
            handler_task,
            page,
        })
    }

    pub async fn goto(&self, url: &str, timeout: Duration) -> Result<(), RunError> {
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| RunError::Navigation(format!("timed out loading {}", url)))?
            .map(|_| ())
            .map_err(|e| RunError::Navigation(e.to_string()))
    }

    pub async fn current_url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    pub async fn cookie_value(&self, name: &str) -> Result<Option<String>, RunError> {
        let cookies = self
            .page
            .get_cookies()
            .await
            .map_err(|e| RunError::Browser(e.to_string()))?;
        Ok(cookies
            .into_iter()
            .find(|c| c.name == name)
            .map(|c| c.value))
    }

    pub async fn clear_cookies(&self) -> Result<(), RunError> {
        self.page
            .execute(ClearBrowserCookiesParams::default())
            .await
            .map(|_| ())
            .map_err(|e| RunError::Browser(e.to_string()))
    }

    // Best-effort GDPR banner click; the banner is not always shown for a
    // fresh profile.
    pub async fn accept_cookie_banner(&self) -> bool {
        match self.page.find_element(GDPR_ACCEPT_SELECTOR).await {
            Ok(button) => button.click().await.is_ok(),
            Err(_) => false,
        }
    }

    pub async fn fill_login_form(&self, email: &str, password: &str) -> Result<(), RunError> {
        self.type_into(EMAIL_SELECTOR, email).await?;
        self.type_into(PASSWORD_SELECTOR, password).await?;
        let button = self
            .page
            .find_element(LOGIN_BUTTON_SELECTOR)
            .await
            .map_err(|e| RunError::Form(format!("login button not found: {}", e)))?;
        button
            .click()
            .await
            .map_err(|e| RunError::Form(format!("could not submit login form: {}", e)))?;
        Ok(())
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), RunError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| RunError::Form(format!("{} not found: {}", selector, e)))?;
        element
            .click()
            .await
            .map_err(|e| RunError::Form(e.to_string()))?;
        element
            .type_str(text)
            .await
            .map_err(|e| RunError::Form(e.to_string()))?;
        Ok(())
    }

    pub async fn probe(
        &self,
        cookie_name: &str,
        logged_in_prefix: &str,
    ) -> Result<PageSignals, RunError> {
        let cookie = self.cookie_value(cookie_name).await?;
        let url = self.current_url().await.unwrap_or_default();
        probe::collect(&self.page, cookie, url.starts_with(logged_in_prefix)).await
    }

    pub async fn screenshot_to(&self, path: &Path) -> Result<(), RunError> {
        let bytes = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|e| RunError::Browser(e.to_string()))?;
        std::fs::write(path, bytes).map_err(|e| RunError::Browser(e.to_string()))
    }

    pub async fn close(mut self) {
        let _ = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
    }
}

fn find_chrome() -> Option<PathBuf> {
    for binary in ["google-chrome", "google-chrome-stable", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(binary).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    candidates
        .iter()
        .copied()
        .find(|c| Path::new(c).exists())
        .map(PathBuf::from)
}
