//! # pdash
//!
//! Command-line access to process-dashboard datafiles: parse value text,
//! list a file's values, and set, freeze or thaw individual names.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdash_core::{SaveableValue, ValueFactory, ValueKind};
use pdash_store::{DataRepository, Datafile, PdashSettings, RepositoryConfig};
use pdash_telemetry::{init_telemetry, TelemetryConfig};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "pdash", about = "Process dashboard data tool")]
struct Cli {
    /// Settings file (defaults to `~/.pdash/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Global definitions inherited by every datafile.
    #[arg(long, global = true)]
    defaults: Option<PathBuf>,

    /// Name prefix the datafile is opened under.
    #[arg(long, global = true, default_value = "")]
    prefix: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse value text and describe the result.
    Parse { text: String },
    /// List every value in a datafile.
    Show { file: PathBuf },
    /// Set `name` to the value text `value` and save.
    Set {
        file: PathBuf,
        name: String,
        value: String,
    },
    /// Freeze the current value of `name` and save.
    Freeze { file: PathBuf, name: String },
    /// Restore the value `name` had when it was frozen and save.
    Thaw { file: PathBuf, name: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    kind: Option<ValueKind>,
    defined: bool,
    editable: bool,
    save_string: String,
    formatted: String,
}

impl ValueReport {
    fn new(name: Option<String>, value: Option<&SaveableValue>) -> Self {
        match value {
            Some(value) => Self {
                name,
                kind: Some(value.kind()),
                defined: value.simple_value().map_or(true, |v| v.is_defined()),
                editable: value.is_editable(),
                save_string: value.save_string(),
                formatted: value.format(),
            },
            None => Self {
                name,
                kind: None,
                defined: false,
                editable: false,
                save_string: "null".to_string(),
                formatted: String::new(),
            },
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => pdash_store::load_settings_from_path(path),
        None => pdash_store::load_settings(),
    }
    .context("Failed to load settings")?;

    init_telemetry(&TelemetryConfig::from_level_name(
        &settings.log_level,
        settings.log_json,
    ));
    tracing::debug!(data_dir = %settings.data_dir.display(), "settings loaded");

    match &cli.command {
        Command::Parse { text } => {
            let value = ValueFactory::new()
                .parse(text)
                .with_context(|| format!("Cannot parse {text:?}"))?;
            print_json(&ValueReport::new(None, value.as_ref()))
        }
        Command::Show { file } => {
            let (repo, df) = open(&cli, &settings, file)?;
            let reports: Vec<ValueReport> = repo
                .names_with_prefix(&format!("{}/", df.prefix()))
                .into_iter()
                .map(|name| {
                    let value = repo.get_value(&name);
                    ValueReport::new(Some(name), value.as_ref())
                })
                .collect();
            print_json(&reports)
        }
        Command::Set { file, name, value } => {
            let (repo, df) = open(&cli, &settings, file)?;
            let name = df.qualify(name);
            repo.put_text(&name, value)
                .with_context(|| format!("Cannot set {name}"))?;
            save(&repo, &df)?;
            print_json(&ValueReport::new(Some(name.clone()), repo.get_value(&name).as_ref()))
        }
        Command::Freeze { file, name } => {
            let (repo, df) = open(&cli, &settings, file)?;
            let name = df.qualify(name);
            let frozen = repo.freeze_value(&name);
            save(&repo, &df)?;
            print_json(&ValueReport::new(Some(name), Some(&frozen)))
        }
        Command::Thaw { file, name } => {
            let (repo, df) = open(&cli, &settings, file)?;
            let name = df.qualify(name);
            let restored = repo
                .thaw_value(&name)
                .with_context(|| format!("Cannot thaw {name}"))?;
            save(&repo, &df)?;
            print_json(&ValueReport::new(Some(name), restored.as_ref()))
        }
    }
}

fn open(
    cli: &Cli,
    settings: &PdashSettings,
    file: &Path,
) -> Result<(DataRepository, Arc<Datafile>)> {
    let repo = DataRepository::new(RepositoryConfig::from(settings));
    if let Some(defaults) = &cli.defaults {
        let reader = std::fs::File::open(defaults)
            .with_context(|| format!("Failed to open {}", defaults.display()))?;
        repo.add_global_definitions(std::io::BufReader::new(reader))
            .with_context(|| format!("Failed to read {}", defaults.display()))?;
    }
    let path = resolve(settings, file);
    let df = repo
        .open_datafile(&cli.prefix, &path)
        .with_context(|| format!("Failed to open datafile {}", path.display()))?;
    Ok((repo, df))
}

fn save(repo: &DataRepository, df: &Datafile) -> Result<()> {
    anyhow::ensure!(
        !df.is_read_only(),
        "datafile {} is read-only",
        df.path().display()
    );
    repo.save_datafile(df)
        .with_context(|| format!("Failed to save {}", df.path().display()))
}

/// Relative paths that do not exist here are looked up in the data dir.
fn resolve(settings: &PdashSettings, file: &Path) -> PathBuf {
    if file.is_absolute() || file.exists() {
        file.to_path_buf()
    } else {
        settings.data_dir.join(file)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
