//! CLI command implementations

use crate::output::{entries_table, format_bytes, print_entries, print_json, print_paths};
use crate::progress::AcquireProgress;
use crate::{OutputFormat, SettingsAction};
use anyhow::{anyhow, Result};
use console::style;
use emufetch_core::{EmufetchCore, SettingsStore};
use emufetch_types::{AcquisitionRequest, Placement, Settings};
use std::path::{Path, PathBuf};

// ============================================================================
// Pipeline Commands
// ============================================================================

pub async fn acquire(
    core: &EmufetchCore,
    request: AcquisitionRequest,
    format: OutputFormat,
) -> Result<()> {
    let watcher = (format != OutputFormat::Json).then(|| AcquireProgress::new().watch(core.subscribe()));

    let result = core.acquire(request).await;
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }
    let outcome = result?;

    if format == OutputFormat::Json {
        return print_json(&outcome);
    }

    match &outcome.placement {
        Placement::Extracted { outcome: extracted, .. } => {
            println!(
                "{} Extracted {} ({}) into {}",
                style("✓").green().bold(),
                style(&outcome.file_name).cyan(),
                format_bytes(outcome.bytes_downloaded),
                style(extracted.target_dir.display()).bold()
            );
            if format == OutputFormat::Table {
                println!("{}", entries_table(&extracted.extracted_files, &extracted.target_dir));
            } else {
                print_entries(&extracted.extracted_files);
            }
        }
        Placement::Moved {
            moved_file_name,
            target_dir,
        } => {
            println!(
                "{} Saved {} ({}) to {}",
                style("✓").green().bold(),
                style(moved_file_name).cyan(),
                format_bytes(outcome.bytes_downloaded),
                style(target_dir.display()).bold()
            );
        }
    }

    if let Some(ref warning) = outcome.cleanup_error {
        println!("{} {}", style("!").yellow().bold(), style(warning).yellow());
    }

    Ok(())
}

pub async fn extract(
    core: &EmufetchCore,
    archive: &Path,
    target: &Path,
    format: OutputFormat,
) -> Result<()> {
    let outcome = core.extract_local(archive, target).await?;

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Table => {
            println!("{}", entries_table(&outcome.extracted_files, &outcome.target_dir));
        }
        OutputFormat::Human => {
            println!(
                "{} Extracted {} into {}",
                style("✓").green().bold(),
                style(archive.display()).cyan(),
                style(outcome.target_dir.display()).bold()
            );
            print_entries(&outcome.extracted_files);
        }
    }

    Ok(())
}

pub async fn init(core: &EmufetchCore, base: &Path, format: OutputFormat) -> Result<()> {
    let folders = core.create_skeleton(base).await?;

    match format {
        OutputFormat::Json => print_json(&folders)?,
        _ => {
            println!(
                "{} Library layout ready under {}",
                style("✓").green().bold(),
                style(base.display()).bold()
            );
            print_paths(&folders);
        }
    }

    Ok(())
}

// ============================================================================
// Settings Commands
// ============================================================================

pub async fn settings_action(
    store: &SettingsStore,
    action: Option<SettingsAction>,
    format: OutputFormat,
) -> Result<()> {
    match action {
        None | Some(SettingsAction::Show) => {
            let settings = store.load().await?;

            match format {
                OutputFormat::Json => print_json(&settings)?,
                _ => {
                    println!("emufetch settings ({}):", store.path().display());
                    println!();
                    for key in SETTING_KEYS {
                        println!("  {}: {}", key, get_setting(&settings, key)?);
                    }
                }
            }
        }

        Some(SettingsAction::Path) => println!("{}", store.path().display()),

        Some(SettingsAction::Get { key }) => {
            let settings = store.load().await?;
            println!("{}", get_setting(&settings, &key)?);
        }

        Some(SettingsAction::Set { key, value }) => {
            let mut settings = store.load().await?;
            set_setting(&mut settings, &key, &value)?;
            store.save(&settings).await?;
            println!("{} Setting updated", style("✓").green().bold());
        }

        Some(SettingsAction::Reset { yes }) => {
            let confirmed = yes
                || dialoguer::Confirm::new()
                    .with_prompt("Reset all settings to defaults?")
                    .default(false)
                    .interact()?;

            if confirmed {
                store.reset().await?;
                println!("{} Settings reset to defaults", style("✓").green().bold());
            }
        }
    }

    Ok(())
}

const SETTING_KEYS: [&str; 6] = [
    "seven_zip_path",
    "scratch_dir",
    "user_agent",
    "connect_timeout_secs",
    "drive_host",
    "drive_endpoint",
];

fn get_setting(settings: &Settings, key: &str) -> Result<String> {
    Ok(match key {
        "seven_zip_path" => settings.seven_zip_path.display().to_string(),
        "scratch_dir" => settings.scratch_dir().display().to_string(),
        "user_agent" => settings.user_agent.clone(),
        "connect_timeout_secs" => settings.connect_timeout_secs.to_string(),
        "drive_host" => settings.drive_host.clone(),
        "drive_endpoint" => settings.drive_endpoint.clone(),
        _ => return Err(anyhow!("Unknown setting: {}", key)),
    })
}

fn set_setting(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    match key {
        "seven_zip_path" => settings.seven_zip_path = PathBuf::from(value),
        "scratch_dir" => {
            settings.scratch_dir = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        "user_agent" => settings.user_agent = value.to_string(),
        "connect_timeout_secs" => settings.connect_timeout_secs = value.parse()?,
        "drive_host" => settings.drive_host = value.to_string(),
        "drive_endpoint" => settings.drive_endpoint = value.to_string(),
        _ => return Err(anyhow!("Unknown setting: {}", key)),
    }
    Ok(())
}
