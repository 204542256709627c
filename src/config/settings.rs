// src/config/settings.rs
use std::{env, path::PathBuf, time::Duration};

// Everything here comes from the environment (a `.env` file is loaded at
// startup); the binary itself takes no arguments. Defaults match the
// Deezer login flow this tool was written for.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sessions_file: PathBuf,
    pub login_url: String,
    pub logged_in_url: String,
    pub cookie_name: String,
    pub headless: bool,
    pub nav_timeout: Duration,
    pub outcome_timeout: Duration,
    pub captcha_wait: Duration,
    pub concurrency: usize,
    pub max_age_days: i64,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings {
            sessions_file: PathBuf::from(env_or("ARL_SESSIONS_FILE", "data/sessions.json")),
            login_url: env_or("ARL_LOGIN_URL", "https://account.deezer.com/en/login/"),
            logged_in_url: env_or("ARL_LOGGED_IN_URL", "https://www.deezer.com/en"),
            cookie_name: env_or("ARL_COOKIE_NAME", "arl"),
            headless: env_flag("ARL_HEADLESS", false),
            nav_timeout: Duration::from_secs(env_parse("ARL_NAV_TIMEOUT_SECS", 15)),
            outcome_timeout: Duration::from_secs(env_parse("ARL_OUTCOME_TIMEOUT_SECS", 45)),
            captcha_wait: Duration::from_secs(env_parse("ARL_CAPTCHA_WAIT_SECS", 180)),
            concurrency: env_parse("ARL_CONCURRENCY", 2usize).max(1),
            max_age_days: env_parse("ARL_MAX_AGE_DAYS", 15i64),
        }
    }

    // Hard ceiling for a single account run. The driver enforces its own
    // nav/outcome/captcha deadlines; this only catches a wedged browser.
    pub fn session_budget(&self) -> Duration {
        self.nav_timeout + self.outcome_timeout + self.captcha_wait + Duration::from_secs(30)
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => {
            let v = v.trim().to_ascii_lowercase();
            if v.is_empty() {
                default
            } else {
                !(v == "0" || v == "false" || v == "no")
            }
        }
        Err(_) => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_helpers_fall_back_to_defaults() {
        assert_eq!(env_or("ARLKEEPER_TEST_UNSET_STR", "fallback"), "fallback");
        assert_eq!(env_parse("ARLKEEPER_TEST_UNSET_NUM", 7u64), 7);
        assert!(!env_flag("ARLKEEPER_TEST_UNSET_FLAG", false));
        assert!(env_flag("ARLKEEPER_TEST_UNSET_FLAG", true));
    }

    #[test]
    fn env_helpers_read_values() {
        env::set_var("ARLKEEPER_TEST_SET_NUM", "42");
        env::set_var("ARLKEEPER_TEST_SET_FLAG", "no");
        assert_eq!(env_parse("ARLKEEPER_TEST_SET_NUM", 7u64), 42);
        assert!(!env_flag("ARLKEEPER_TEST_SET_FLAG", true));
        env::remove_var("ARLKEEPER_TEST_SET_NUM");
        env::remove_var("ARLKEEPER_TEST_SET_FLAG");
    }
}
