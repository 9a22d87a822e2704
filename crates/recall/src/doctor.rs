// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recall doctor` command implementation.
//!
//! Runs diagnostic checks against the local environment: storage, compute
//! backends, device capacity and installed models.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use colored::Colorize;
use recall_core::StorageAdapter;
use recall_models::{DeviceProfile, HardwareProfiler, catalog};

use crate::services::Services;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run every check and print a report. Returns the number of failures.
pub async fn run_doctor(services: &Services, plain: bool) -> usize {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = vec![
        check_database(services).await,
        check_backends(services),
        check_device(&HardwareProfiler::new(&services.detector).profile()),
        check_selected_model(services),
        check_embedding_model(services),
    ];

    println!();
    println!("  recall doctor");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", render(result, use_color));
    }
    println!();

    let failures = results.iter().filter(|r| r.status == CheckStatus::Fail).count();
    let issues = results.iter().filter(|r| r.status != CheckStatus::Pass).count();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        let word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {word} found.");
    }
    println!();
    failures
}

fn render(result: &CheckResult, use_color: bool) -> String {
    let ms = result.duration.as_millis();
    let (symbol, message) = match (&result.status, use_color) {
        (CheckStatus::Pass, true) => ("✓".green().to_string(), result.message.clone()),
        (CheckStatus::Warn, true) => ("!".yellow().to_string(), result.message.yellow().to_string()),
        (CheckStatus::Fail, true) => ("✗".red().to_string(), result.message.red().to_string()),
        (CheckStatus::Pass, false) => ("[OK]  ".to_string(), result.message.clone()),
        (CheckStatus::Warn, false) => ("[WARN]".to_string(), result.message.clone()),
        (CheckStatus::Fail, false) => ("[FAIL]".to_string(), result.message.clone()),
    };
    format!("    {symbol} {:<20} {message} ({ms}ms)", result.name)
}

async fn check_database(services: &Services) -> CheckResult {
    let start = Instant::now();
    match services.storage.list_sessions().await {
        Ok(sessions) => CheckResult::new(
            "Database",
            CheckStatus::Pass,
            format!("{} conversation(s)", sessions.len()),
            start,
        ),
        Err(e) => CheckResult::new("Database", CheckStatus::Fail, e.to_string(), start),
    }
}

fn check_backends(services: &Services) -> CheckResult {
    let start = Instant::now();
    let backends = services.detector.detect_available_backends();
    let names: Vec<String> = backends.iter().map(ToString::to_string).collect();
    let status = if backends.len() > 1 {
        CheckStatus::Pass
    } else {
        CheckStatus::Warn
    };
    let mut message = names.join(", ");
    if let Some(renderer) = services.detector.gpu_renderer() {
        message.push_str(&format!(" ({renderer})"));
    }
    if status == CheckStatus::Warn {
        message.push_str(", no GPU backend detected");
    }
    CheckResult::new("Backends", status, message, start)
}

fn check_device(profile: &DeviceProfile) -> CheckResult {
    let start = Instant::now();
    let message = format!(
        "{} GB RAM, {} GPU, recommends {}",
        profile.total_ram_gb, profile.gpu_vendor_guess, profile.recommended_model.id
    );
    let status = if profile.meets_minimum_specs() {
        CheckStatus::Pass
    } else {
        CheckStatus::Warn
    };
    CheckResult::new("Device", status, message, start)
}

fn check_selected_model(services: &Services) -> CheckResult {
    let start = Instant::now();
    let id = services.config.models.selected_model.as_str();
    if catalog::find(id).is_none() {
        return CheckResult::new(
            "Selected model",
            CheckStatus::Fail,
            format!("{id} is not in the catalog"),
            start,
        );
    }
    if services.store.is_model_complete(id) {
        CheckResult::new(
            "Selected model",
            CheckStatus::Pass,
            format!("{id} at {}", services.store.path_for(id).display()),
            start,
        )
    } else {
        CheckResult::new(
            "Selected model",
            CheckStatus::Warn,
            format!("{id} not downloaded (run `recall models download {id}`)"),
            start,
        )
    }
}

fn check_embedding_model(services: &Services) -> CheckResult {
    let start = Instant::now();
    if !services.config.memory.enabled {
        return CheckResult::new("Embedding model", CheckStatus::Pass, "memory disabled", start);
    }
    if services.embedding_models.is_model_available() {
        CheckResult::new("Embedding model", CheckStatus::Pass, "installed", start)
    } else {
        CheckResult::new(
            "Embedding model",
            CheckStatus::Warn,
            "not installed, fetched on first use",
            start,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_devices_warn() {
        let profile = DeviceProfile::from_parts(2 * 1024 * 1024 * 1024, None, "test".into());
        assert_eq!(check_device(&profile).status, CheckStatus::Warn);
        let profile = DeviceProfile::from_parts(8 * 1024 * 1024 * 1024, Some("Adreno 740"), "test".into());
        let result = check_device(&profile);
        assert_eq!(result.status, CheckStatus::Pass);
        assert!(result.message.contains("8 GB"));
    }

    #[test]
    fn plain_rendering_has_no_escape_codes() {
        let result = CheckResult {
            name: "Database".into(),
            status: CheckStatus::Fail,
            message: "locked".into(),
            duration: Duration::from_millis(3),
        };
        let line = render(&result, false);
        assert!(line.contains("[FAIL] Database"));
        assert!(line.ends_with("locked (3ms)"));
        assert!(!line.contains('\u{1b}'));
    }
}
