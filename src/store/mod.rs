// src/store/mod.rs
use std::{
    collections::BTreeMap,
    fs::{self, File},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StoreError;

const SECONDS_PER_DAY: i64 = 24 * 3600;

// One entry of the sessions file. `arl` and `lastUpdated` are written by
// this tool after a successful run; everything else is owned by whoever
// edits the file. Fields we do not model (the store carries a free-form
// `type` tag, for one) round-trip through `extra` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub arl: Option<String>,
    #[serde(default, rename = "lastUpdated")]
    pub last_updated: Option<i64>,
    #[serde(default = "default_enable")]
    pub enable: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_enable() -> bool {
    true
}

impl SessionRecord {
    pub fn has_arl(&self) -> bool {
        self.arl.as_deref().map_or(false, |a| !a.is_empty())
    }

    // A record is due for a refresh when it is enabled and its token is
    // either missing or older than the configured window.
    pub fn needs_refresh(&self, now: i64, max_age_days: i64) -> bool {
        if !self.enable {
            return false;
        }
        let stale = self.last_updated.unwrap_or(0) < now - max_age_days * SECONDS_PER_DAY;
        !self.has_arl() || stale
    }

    pub fn record_type(&self) -> &str {
        self.extra
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

// Creates an empty store if none exists yet. Returns true when the file was
// just created, in which case the caller should stop and let the user fill
// in account details.
pub fn ensure_store_file(path: &Path) -> Result<bool, StoreError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, "[]\n").map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

pub fn load_records(path: &Path) -> Result<Vec<SessionRecord>, StoreError> {
    let contents = fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

// Whole-file replace, original order preserved.
pub fn save_records(path: &Path, records: &[SessionRecord]) -> Result<(), StoreError> {
    let file = File::create(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_writer_pretty(&file, records).map_err(|source| StoreError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

// Writes data/arls_<type>.txt with the comma-joined tokens of every record
// that currently holds one, grouped by the record's `type` tag.
pub fn export_arls_by_type(
    data_dir: &Path,
    records: &[SessionRecord],
) -> Result<Vec<(String, usize, PathBuf)>> {
    let mut by_type: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for record in records.iter().filter(|r| r.has_arl()) {
        by_type
            .entry(record.record_type())
            .or_default()
            .push(record.arl.as_deref().unwrap_or_default());
    }

    let mut written = Vec::new();
    for (type_tag, arls) in by_type {
        let path = data_dir.join(format!("arls_{}.txt", type_tag));
        fs::write(&path, arls.join(","))
            .with_context(|| format!("failed to write {}", path.display()))?;
        written.push((type_tag.to_string(), arls.len(), path));
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(email: &str, enable: bool, arl: Option<&str>, last_updated: Option<i64>) -> SessionRecord {
        SessionRecord {
            email: email.to_string(),
            password: "hunter2".to_string(),
            arl: arl.map(str::to_string),
            last_updated,
            enable,
            extra: Map::new(),
        }
    }

    #[test]
    fn load_save_round_trip_preserves_everything() {
        let raw = r#"[
            {"email":"a@x.com","password":"pw1","arl":null,"lastUpdated":null,"enable":true,"type":"premium"},
            {"email":"b@x.com","password":"pw2","arl":"tok","lastUpdated":1700000000,"enable":false,"note":"keep me"}
        ]"#;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        fs::write(&path, raw).unwrap();

        let records = load_records(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_type(), "premium");
        assert_eq!(
            records[1].extra.get("note"),
            Some(&Value::String("keep me".to_string()))
        );

        save_records(&path, &records).unwrap();
        let reloaded = load_records(&path).unwrap();
        assert_eq!(records, reloaded);
    }

    #[test]
    fn load_rejects_malformed_store() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        fs::write(&path, "{ not an array").unwrap();
        assert!(matches!(
            load_records(&path),
            Err(StoreError::Malformed { .. })
        ));
    }

    #[test]
    fn missing_enable_defaults_to_true() {
        let raw = r#"[{"email":"a@x.com","password":"pw","arl":null}]"#;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("sessions.json");
        fs::write(&path, raw).unwrap();
        let records = load_records(&path).unwrap();
        assert!(records[0].enable);
    }

    #[test]
    fn ensure_store_file_creates_once() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data").join("sessions.json");
        assert!(ensure_store_file(&path).unwrap());
        assert!(!ensure_store_file(&path).unwrap());
        assert_eq!(load_records(&path).unwrap(), Vec::new());
    }

    #[test]
    fn refresh_selection_honors_enable_and_staleness() {
        let now = 1_700_000_000;
        let fresh = now - SECONDS_PER_DAY;
        let stale = now - 20 * SECONDS_PER_DAY;

        // disabled records are never candidates, whatever their state
        assert!(!record("a@x.com", false, None, None).needs_refresh(now, 15));
        assert!(!record("a@x.com", false, Some("tok"), Some(stale)).needs_refresh(now, 15));

        // missing or empty token
        assert!(record("b@x.com", true, None, None).needs_refresh(now, 15));
        assert!(record("b@x.com", true, Some(""), Some(fresh)).needs_refresh(now, 15));

        // stale vs fresh token
        assert!(record("c@x.com", true, Some("tok"), Some(stale)).needs_refresh(now, 15));
        assert!(!record("c@x.com", true, Some("tok"), Some(fresh)).needs_refresh(now, 15));
    }

    #[test]
    fn export_groups_tokens_by_type_tag() {
        let mut premium = record("a@x.com", true, Some("tok-a"), Some(1));
        premium
            .extra
            .insert("type".to_string(), Value::String("premium".to_string()));
        let untagged = record("b@x.com", true, Some("tok-b"), Some(1));
        let no_arl = record("c@x.com", true, None, None);

        let tmp = tempfile::tempdir().unwrap();
        let written =
            export_arls_by_type(tmp.path(), &[premium, untagged, no_arl]).unwrap();
        assert_eq!(written.len(), 2);

        let premium_out = fs::read_to_string(tmp.path().join("arls_premium.txt")).unwrap();
        assert_eq!(premium_out, "tok-a");
        let unknown_out = fs::read_to_string(tmp.path().join("arls_unknown.txt")).unwrap();
        assert_eq!(unknown_out, "tok-b");
    }
}
