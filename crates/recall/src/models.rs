// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recall models` command implementation.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use recall_core::RecallError;
use recall_models::catalog;
use recall_models::{ModelDescriptor, ModelStatus};

use crate::services::Services;

/// Print every catalog model with its status.
pub fn list_models(services: &Services) {
    let selected = &services.config.models.selected_model;
    println!();
    for (descriptor, status) in services.tracker.all(&services.store, selected) {
        println!(
            "  {:<36} {:<9} {:>6} MB  {}",
            descriptor.id,
            descriptor.tier.to_string(),
            descriptor.estimated_size_mb,
            describe(&status)
        );
    }
    println!();
}

fn describe(status: &ModelStatus) -> String {
    match status {
        ModelStatus::NotDownloaded => "not downloaded".dimmed().to_string(),
        ModelStatus::Downloading(p) => format!("downloading {:.0}%", p * 100.0).yellow().to_string(),
        ModelStatus::Downloaded { is_selected: true } => "downloaded (selected)".green().to_string(),
        ModelStatus::Downloaded { is_selected: false } => "downloaded".green().to_string(),
        ModelStatus::Error(message) => message.red().to_string(),
    }
}

fn lookup(id: &str) -> Result<&'static ModelDescriptor, RecallError> {
    catalog::find(id).ok_or_else(|| RecallError::NotFound(format!("model {id}")))
}

/// Download both stages of `id` behind a progress bar.
pub async fn download_model(services: &Services, id: &str) -> Result<(), RecallError> {
    let descriptor = lookup(id)?;
    let bar = ProgressBar::new(100);
    let style = ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos:>3}%")
        .map_err(|e| RecallError::Internal(format!("progress template: {e}")))?
        .progress_chars("=> ");
    bar.set_style(style);
    bar.set_message(descriptor.display_name);

    let progress = |p: f32| bar.set_position((p * 100.0).round() as u64);
    let result = services
        .tracker
        .track_download(&services.store, descriptor.id, &progress)
        .await;
    match &result {
        Ok(()) => bar.finish_with_message(format!("{} ready", descriptor.display_name)),
        Err(_) => bar.abandon(),
    }
    result
}

pub async fn delete_model(services: &Services, id: &str) -> Result<(), RecallError> {
    let descriptor = lookup(id)?;
    services.store.delete_model(descriptor.id).await?;
    services.tracker.clear(descriptor.id);
    println!("deleted {}", descriptor.id);
    Ok(())
}
