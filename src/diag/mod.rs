// src/diag/mod.rs
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Local;
use colored::Colorize;

pub const DATA_DIR: &str = "data";
pub const LOGS_DIR: &str = "logs";
pub const SCREENSHOTS_DIR: &str = "screenshots";
pub const USER_DATA_DIR: &str = "user_data";

pub fn ensure_runtime_dirs() -> std::io::Result<()> {
    for dir in [DATA_DIR, LOGS_DIR, SCREENSHOTS_DIR, USER_DATA_DIR] {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn sanitize_email(email: &str) -> String {
    email
        .chars()
        .map(|c| match c {
            '@' => '_',
            '/' | '\\' | ':' => '-',
            other => other,
        })
        .collect()
}

pub fn screenshot_path(email: &str, name: &str) -> std::io::Result<PathBuf> {
    screenshot_path_in(Path::new(SCREENSHOTS_DIR), email, name)
}

fn screenshot_path_in(root: &Path, email: &str, name: &str) -> std::io::Result<PathBuf> {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let account_dir = root.join(sanitize_email(email));
    fs::create_dir_all(&account_dir)?;
    Ok(account_dir.join(format!("{}_{}.png", name, timestamp)))
}

pub fn profile_dir(email: &str) -> std::io::Result<PathBuf> {
    let dir = Path::new(USER_DATA_DIR).join(sanitize_email(email));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

// Append-only diagnostic log for one account, mirrored to the console the
// way the rest of the tool prints per-account lines. File writes are
// best-effort: losing a diagnostic line must not fail the session run.
pub struct AccountLog {
    email: String,
    file: Option<PathBuf>,
}

impl AccountLog {
    pub fn new(email: &str) -> Self {
        Self::new_in(Path::new(LOGS_DIR), email)
    }

    pub(crate) fn new_in(root: &Path, email: &str) -> Self {
        let dir = root.join(sanitize_email(email));
        let file = match fs::create_dir_all(&dir) {
            Ok(()) => Some(dir.join("logs.txt")),
            Err(err) => {
                log::warn!("could not create log dir for {}: {}", email, err);
                None
            }
        };
        AccountLog {
            email: email.to_string(),
            file,
        }
    }

    pub fn info(&self, message: &str) {
        self.write("INFO", message);
        println!("[{}] {}", self.email.cyan().bold(), message);
    }

    pub fn warn(&self, message: &str) {
        self.write("WARNING", message);
        println!("[{}] {}", self.email.cyan().bold(), message.yellow());
    }

    pub fn error(&self, message: &str) {
        self.write("ERROR", message);
        println!("[{}] {}", self.email.cyan().bold(), message.red());
    }

    fn write(&self, level: &str, message: &str) {
        let Some(path) = &self.file else { return };
        let line = format!(
            "{} - {} - {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            level,
            message
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut f| f.write_all(line.as_bytes()));
        if let Err(err) = result {
            log::warn!("could not append to {}: {}", path.display(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_at_sign() {
        assert_eq!(sanitize_email("a@x.com"), "a_x.com");
        assert_eq!(sanitize_email("weird/one@x.com"), "weird-one_x.com");
    }

    #[test]
    fn screenshot_path_is_namespaced_and_timestamped() {
        let tmp = tempfile::tempdir().unwrap();

        let path = screenshot_path_in(tmp.path(), "a@x.com", "captcha_detected").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(path.starts_with(tmp.path().join("a_x.com")));
        assert!(name.starts_with("captcha_detected_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn account_log_appends_lines() {
        let tmp = tempfile::tempdir().unwrap();

        let log = AccountLog::new_in(tmp.path(), "a@x.com");
        log.info("first");
        log.error("second");

        let contents =
            std::fs::read_to_string(tmp.path().join("a_x.com").join("logs.txt")).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO - first"));
        assert!(lines[1].contains("ERROR - second"));
    }
}
