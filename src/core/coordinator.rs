// src/core/coordinator.rs
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::Utc;
use colored::Colorize;
use futures::future::join_all;
use rand::Rng;
use tokio::sync::Semaphore;

use crate::{
    config::settings::Settings,
    core::driver::{RunSuccess, SessionDriver},
    diag::AccountLog,
    errors::RunError,
    store::SessionRecord,
};

pub struct AccountOutcome {
    pub email: String,
    pub result: Result<(), RunError>,
}

pub struct RunReport {
    pub records: Vec<SessionRecord>,
    pub outcomes: Vec<AccountOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

// Fans the refresh candidates out over a bounded pool of browser sessions.
// Each task owns its own browser; the only shared state is the record set
// behind a mutex, which a task touches once, on success.
pub async fn run_all(records: Vec<SessionRecord>, settings: Arc<Settings>) -> RunReport {
    let now = Utc::now().timestamp();
    let candidates: Vec<usize> = records
        .iter()
        .enumerate()
        .filter(|(_, r)| r.needs_refresh(now, settings.max_age_days))
        .map(|(i, _)| i)
        .collect();
    let total = candidates.len();

    println!(
        "{}",
        format!(
            "📦 Processing {} account(s) with a missing or expired ARL",
            total
        )
        .bold()
        .blue()
    );

    let records = Arc::new(Mutex::new(records));
    let semaphore = Arc::new(Semaphore::new(settings.concurrency));

    let mut tagged_handles = Vec::new();
    for (slot, idx) in candidates.into_iter().enumerate() {
        let (email, password) = {
            let guard = records.lock().unwrap();
            (guard[idx].email.clone(), guard[idx].password.clone())
        };
        let records = Arc::clone(&records);
        let semaphore = Arc::clone(&semaphore);
        let settings = Arc::clone(&settings);
        let task_email = email.clone();

        let handle = tokio::spawn(async move {
            // Spread session starts out a little so the login endpoint does
            // not see every account arrive in the same second.
            let stagger_ms = { rand::thread_rng().gen_range(2_000..5_000) };
            tokio::time::sleep(Duration::from_millis(stagger_ms)).await;

            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("session semaphore closed");

            println!(
                "{}",
                format!("📝 [{}/{}] Processing account: {}", slot + 1, total, task_email)
                    .cyan()
            );

            let log = AccountLog::new(&task_email);
            let driver = SessionDriver::new(&settings, &log, &task_email, &password);

            let result = match tokio::time::timeout(settings.session_budget(), driver.run()).await
            {
                Ok(outcome) => apply_outcome(&records, idx, outcome),
                // Backstop for a wedged browser; the driver's own deadlines
                // normally fire well before this.
                Err(_) => Err(abandon_run(&log)),
            };

            match &result {
                Ok(()) => println!(
                    "{}",
                    format!("✅ [{}/{}] {} - ARL obtained", slot + 1, total, task_email).green()
                ),
                Err(err) => println!(
                    "{}",
                    format!("❌ [{}/{}] {} - {}", slot + 1, total, task_email, err).red()
                ),
            }
            result
        });
        tagged_handles.push((email, handle));
    }

    let (emails, handles): (Vec<_>, Vec<_>) = tagged_handles.into_iter().unzip();
    let joined = join_all(handles).await;

    let outcomes = emails
        .into_iter()
        .zip(joined)
        .map(|(email, joined)| AccountOutcome {
            result: match joined {
                Ok(result) => result,
                Err(err) => {
                    eprintln!(
                        "{}",
                        format!("⚠️  Task execution error for {}: {}", email, err)
                            .red()
                            .bold()
                    );
                    Err(RunError::Browser(err.to_string()))
                }
            },
            email,
        })
        .collect();

    let records = Arc::try_unwrap(records)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_else(|arc| arc.lock().unwrap().clone());

    RunReport { records, outcomes }
}

// A failed run never touches its record; only a success writes the fresh
// ARL and timestamp back under the mutex.
fn apply_outcome(
    records: &Mutex<Vec<SessionRecord>>,
    idx: usize,
    outcome: Result<RunSuccess, RunError>,
) -> Result<(), RunError> {
    let success = outcome?;
    let mut guard = records.lock().unwrap();
    let record = &mut guard[idx];
    record.arl = Some(success.arl);
    record.last_updated = Some(success.obtained_at);
    Ok(())
}

// The timed-out session was dropped along with its future, so there is no
// page left to screenshot; the log entry records that explicitly.
fn abandon_run(log: &AccountLog) -> RunError {
    log.error("session exceeded its overall budget, abandoning (browser torn down before a screenshot could be taken)");
    RunError::OutcomeTimeout
}
