// main.rs
use std::{path::Path, process::exit, sync::Arc};

use anyhow::{Context, Result};
use colored::Colorize;
use config::settings::Settings;
use dotenv::dotenv;
use log::LevelFilter;
use simple_logger::SimpleLogger;

mod browser;
mod config;
mod core;
mod diag;
mod errors;
mod store;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()
        .ok();

    println!("{}", "🚀 ARL Keeper".bold().cyan());

    let settings = Settings::from_env();
    diag::ensure_runtime_dirs().context("failed to create runtime directories")?;

    if store::ensure_store_file(&settings.sessions_file)? {
        println!(
            "{}",
            format!(
                "🛠️  Created '{}'. Add your account details and run again.",
                settings.sessions_file.display()
            )
            .blue()
            .bold()
        );
        return Ok(());
    }

    // Store-load failure is the only process-fatal error: nothing runs on
    // top of a store we cannot round-trip.
    let records = store::load_records(&settings.sessions_file)?;
    if records.is_empty() {
        eprintln!(
            "{}",
            format!(
                "❌  No accounts found in '{}'. Please add your account details.",
                settings.sessions_file.display()
            )
            .red()
            .bold()
        );
        return Ok(());
    }

    println!(
        "{}",
        "---------------- Account Information ----------------"
            .bold()
            .green()
    );
    println!(
        "{}",
        format!("✅  Loaded {} account(s):", records.len()).green()
    );
    for (i, record) in records.iter().enumerate() {
        println!(
            "  {}) {} (enable: {}, arl: {})",
            i + 1,
            record.email.bold().cyan(),
            record.enable,
            if record.has_arl() { "******" } else { "none" },
        );
    }
    println!(
        "{}",
        "-----------------------------------------------------"
            .bold()
            .green()
    );

    let settings = Arc::new(settings);
    let report = core::coordinator::run_all(records, Arc::clone(&settings)).await;

    store::save_records(&settings.sessions_file, &report.records)?;
    println!(
        "{}",
        format!("💾 Sessions saved to {}", settings.sessions_file.display()).green()
    );

    match store::export_arls_by_type(Path::new(diag::DATA_DIR), &report.records) {
        Ok(written) => {
            for (type_tag, count, path) in written {
                println!(
                    "{}",
                    format!(
                        "📝 Wrote {} ARL(s) of type '{}' to {}",
                        count,
                        type_tag,
                        path.display()
                    )
                    .green()
                );
            }
        }
        Err(err) => eprintln!(
            "{}",
            format!("⚠️  Could not export ARL files: {:#}", err).yellow()
        ),
    }

    println!(
        "{}",
        "==================== Execution Summary ===================="
            .bold()
            .green()
    );
    println!("├── Processed accounts: {}", report.outcomes.len());
    println!("├── ARLs obtained: {}", report.succeeded());
    println!("└── Failures: {}", report.failed());

    println!("{}", "🎯 Final results:".bold().blue());
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(()) => {
                let preview = report
                    .records
                    .iter()
                    .find(|r| r.email == outcome.email)
                    .and_then(|r| r.arl.as_deref())
                    .map(|arl| arl.chars().take(10).collect::<String>())
                    .unwrap_or_default();
                println!(
                    "{}",
                    format!("✅ {} - ARL: {}...", outcome.email, preview).green()
                );
            }
            Err(err) => println!("{}", format!("❌ {} - {}", outcome.email, err).red()),
        }
    }

    if report.failed() > 0 {
        exit(1);
    }
    Ok(())
}
