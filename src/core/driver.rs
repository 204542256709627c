// src/core/driver.rs
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::{
    browser::{BrowserSession, PageSignals},
    config::settings::Settings,
    diag::{self, AccountLog},
    errors::RunError,
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy)]
enum DriveState {
    Init,
    Navigate,
    Submit,
    AwaitOutcome { deadline: Instant },
    ManualWait { deadline: Instant },
    Extract,
}

// What one polling pass tells us to do next. Pure so the branching is
// testable without a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    CookiePresent,
    InvalidCredentials,
    CaptchaPending,
    KeepPolling,
}

// The cookie wins outright: after a human solves the CAPTCHA the iframe
// can stay attached while the session is already established, and some
// pages keep a stale error element around after a successful retry.
pub(crate) fn classify(signals: &PageSignals) -> Verdict {
    if signals.cookie.is_some() {
        return Verdict::CookiePresent;
    }
    if signals.invalid_credentials {
        return Verdict::InvalidCredentials;
    }
    if signals.captcha_visible {
        return Verdict::CaptchaPending;
    }
    Verdict::KeepPolling
}

#[derive(Debug)]
pub struct RunSuccess {
    pub arl: String,
    pub obtained_at: i64,
}

// One login attempt for one account: open an isolated browser, walk the
// login flow, wait for the cookie (or a human solving a CAPTCHA), extract
// it. Exactly one attempt; retries are the operator's call.
pub struct SessionDriver<'a> {
    settings: &'a Settings,
    log: &'a AccountLog,
    email: &'a str,
    password: &'a str,
}

impl<'a> SessionDriver<'a> {
    pub fn new(
        settings: &'a Settings,
        log: &'a AccountLog,
        email: &'a str,
        password: &'a str,
    ) -> Self {
        SessionDriver {
            settings,
            log,
            email,
            password,
        }
    }

    // Every failure is logged here, even one that happens before the
    // browser exists; the screenshot half only applies once a session is
    // open, so it lives in launch_and_drive.
    pub async fn run(&self) -> Result<RunSuccess, RunError> {
        self.log.info("🔹 starting session");
        let result = self.launch_and_drive().await;
        if let Err(err) = &result {
            self.log.error(&format!("❌ session failed: {}", err));
        }
        result
    }

    async fn launch_and_drive(&self) -> Result<RunSuccess, RunError> {
        let profile_dir = diag::profile_dir(self.email)
            .map_err(|e| RunError::Browser(format!("could not create profile dir: {}", e)))?;
        let session = BrowserSession::launch(&profile_dir, self.settings.headless).await?;

        let result = self.drive(&session).await;
        if let Err(err) = &result {
            self.capture(&session, err.tag()).await;
        }
        session.close().await;
        result
    }

    async fn drive(&self, session: &BrowserSession) -> Result<RunSuccess, RunError> {
        let mut state = DriveState::Init;
        let mut reached_logged_in = false;

        loop {
            log::debug!("session {} state={:?}", self.email, state);
            state = match state {
                DriveState::Init => DriveState::Navigate,

                DriveState::Navigate => {
                    session
                        .goto(&self.settings.login_url, self.settings.nav_timeout)
                        .await?;

                    // A leftover profile may still be logged in; start clean
                    // so the extracted cookie belongs to this run.
                    if let Some(url) = session.current_url().await {
                        if url.starts_with(&self.settings.logged_in_url) {
                            self.log.info("🔄 existing session detected, clearing cookies");
                            session.clear_cookies().await?;
                            session
                                .goto(&self.settings.login_url, self.settings.nav_timeout)
                                .await?;
                        }
                    }
                    self.log.info("🌐 login page loaded");

                    if session.accept_cookie_banner().await {
                        self.log.info("✅ cookie banner accepted");
                    }
                    DriveState::Submit
                }

                DriveState::Submit => {
                    session
                        .fill_login_form(self.email, self.password)
                        .await?;
                    self.log.info("🔄 credentials submitted");
                    DriveState::AwaitOutcome {
                        deadline: Instant::now() + self.settings.outcome_timeout,
                    }
                }

                DriveState::AwaitOutcome { deadline }
                | DriveState::ManualWait { deadline } => {
                    let manual = matches!(state, DriveState::ManualWait { .. });
                    let signals = session
                        .probe(&self.settings.cookie_name, &self.settings.logged_in_url)
                        .await?;
                    if signals.logged_in {
                        reached_logged_in = true;
                    }

                    match classify(&signals) {
                        Verdict::CookiePresent => DriveState::Extract,
                        Verdict::InvalidCredentials => return Err(RunError::InvalidCredentials),
                        Verdict::CaptchaPending if !manual => {
                            // First sighting: surface the browser to the human
                            // and widen the window to the manual budget.
                            self.log
                                .warn("🛡️ CAPTCHA detected - waiting for manual resolution");
                            self.capture(session, "captcha_detected").await;
                            DriveState::ManualWait {
                                deadline: Instant::now() + self.settings.captcha_wait,
                            }
                        }
                        Verdict::CaptchaPending | Verdict::KeepPolling => {
                            // Slow page or pending human: keep polling until
                            // the window elapses, never fail early.
                            self.wait_or_bail(deadline, manual, reached_logged_in)
                                .await?;
                            state
                        }
                    }
                }

                DriveState::Extract => {
                    match session.cookie_value(&self.settings.cookie_name).await? {
                        Some(arl) => {
                            let preview: String = arl.chars().take(15).collect();
                            self.log
                                .info(&format!("🔑 {} cookie obtained: {}...", self.settings.cookie_name, preview));
                            return Ok(RunSuccess {
                                arl,
                                obtained_at: Utc::now().timestamp(),
                            });
                        }
                        // Seen once between probe and extract: cookie expired
                        // or got rewritten under us. Treat like any other
                        // missing-cookie terminal.
                        None => {
                            return Err(RunError::CookieNotFound(
                                self.settings.cookie_name.clone(),
                            ))
                        }
                    }
                }
            };
        }
    }

    async fn wait_or_bail(
        &self,
        deadline: Instant,
        captcha_seen: bool,
        reached_logged_in: bool,
    ) -> Result<(), RunError> {
        if Instant::now() >= deadline {
            return Err(timeout_error(
                captcha_seen,
                reached_logged_in,
                &self.settings.cookie_name,
            ));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
        Ok(())
    }

    async fn capture(&self, session: &BrowserSession, name: &str) {
        match diag::screenshot_path(self.email, name) {
            Ok(path) => match session.screenshot_to(&path).await {
                Ok(()) => self.log.info(&format!("📸 screenshot: {}", path.display())),
                Err(err) => self.log.warn(&format!("screenshot failed: {}", err)),
            },
            Err(err) => self.log.warn(&format!("screenshot path failed: {}", err)),
        }
    }
}

// Which terminal error a lapsed window maps to depends on what we saw on
// the way: a pending CAPTCHA is the human's timeout, a logged-in page
// without the cookie points at a site contract change.
fn timeout_error(captcha_seen: bool, reached_logged_in: bool, cookie_name: &str) -> RunError {
    if captcha_seen {
        RunError::CaptchaTimeout
    } else if reached_logged_in {
        RunError::CookieNotFound(cookie_name.to_string())
    } else {
        RunError::OutcomeTimeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(
        cookie: Option<&str>,
        captcha_visible: bool,
        invalid_credentials: bool,
    ) -> PageSignals {
        PageSignals {
            cookie: cookie.map(str::to_string),
            captcha_visible,
            invalid_credentials,
            logged_in: false,
        }
    }

    #[test]
    fn cookie_wins_even_after_captcha_detour() {
        // the recaptcha iframe often stays attached after manual resolution
        let s = signals(Some("tok"), true, false);
        assert_eq!(classify(&s), Verdict::CookiePresent);
    }

    #[test]
    fn invalid_credentials_beats_captcha() {
        let s = signals(None, true, true);
        assert_eq!(classify(&s), Verdict::InvalidCredentials);
    }

    #[test]
    fn captcha_alone_means_manual_wait() {
        let s = signals(None, true, false);
        assert_eq!(classify(&s), Verdict::CaptchaPending);
    }

    #[test]
    fn absent_signals_keep_polling() {
        let s = signals(None, false, false);
        assert_eq!(classify(&s), Verdict::KeepPolling);
    }

    #[tokio::test]
    async fn failure_before_launch_still_writes_an_error_log_line() {
        let tmp = tempfile::tempdir().unwrap();
        let log = AccountLog::new_in(tmp.path(), "broken@x.com");
        let settings = Settings::from_env();
        // interior NUL makes the profile dir impossible to create, failing
        // the run before any browser exists
        let driver = SessionDriver::new(&settings, &log, "broken\0@x.com", "pw");

        let err = driver.run().await.unwrap_err();
        assert!(matches!(err, RunError::Browser(_)));

        let contents =
            std::fs::read_to_string(tmp.path().join("broken_x.com").join("logs.txt")).unwrap();
        assert!(contents.contains("INFO - 🔹 starting session"));
        assert!(contents
            .lines()
            .any(|line| line.contains("ERROR") && line.contains("session failed")));
    }

    #[test]
    fn timeout_classification_depends_on_history() {
        assert!(matches!(
            timeout_error(true, false, "arl"),
            RunError::CaptchaTimeout
        ));
        assert!(matches!(
            timeout_error(true, true, "arl"),
            RunError::CaptchaTimeout
        ));
        assert!(matches!(
            timeout_error(false, true, "arl"),
            RunError::CookieNotFound(name) if name == "arl"
        ));
        assert!(matches!(
            timeout_error(false, false, "arl"),
            RunError::OutcomeTimeout
        ));
    }
}
