//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    BackupsCommand, CliArgs, Command, ExportArgs, ExportOverrides, FilesCommand,
    GlobalOverrides, PrefsCommand, RenderArgs,
};

use std::{num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::{
    application::export::{
        ExportOptions,
        options::{MAX_QUALITY, MAX_SCALE, MIN_QUALITY, MIN_SCALE},
    },
    domain::types::{Margins, Orientation, PageSize},
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "marksmith";
const ENV_PREFIX: &str = "MARKSMITH";
const DEFAULT_DATABASE_URL: &str = "sqlite://marksmith.db";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 4;
const DEFAULT_MAX_BACKUPS_PER_FILE: u32 = 20;
const DEFAULT_MARGIN_MM: f64 = 10.0;
const DEFAULT_QUALITY: f32 = 0.95;
const DEFAULT_SCALE: f32 = 2.0;
const DEFAULT_YIELD_INTERVAL_MS: u64 = 0;
pub(crate) const DEFAULT_RASTER_COMMAND: &str = "wkhtmltoimage";
const DEFAULT_RASTER_TIMEOUT_SECS: u64 = 60;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub export: ExportSettings,
    pub raster: RasterSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub max_backups_per_file: NonZeroU32,
}

/// Defaults applied to every PDF export started from the command line.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub page_size: PageSize,
    pub orientation: Orientation,
    pub margin_mm: f64,
    pub quality: f32,
    pub scale: f32,
    pub yield_interval: Duration,
}

impl ExportSettings {
    /// Export options for `filename` seeded from these defaults.
    pub fn options(&self, filename: impl Into<String>) -> ExportOptions {
        ExportOptions {
            page_size: self.page_size,
            orientation: self.orientation,
            margins: Margins::uniform(self.margin_mm),
            quality: self.quality,
            scale: self.scale,
            ..ExportOptions::new(filename)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RasterSettings {
    pub command_path: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    raw.apply_global_overrides(&cli.global);
    if let Command::Export(args) = &cli.command {
        raw.apply_export_overrides(&args.overrides);
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the process arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    storage: RawStorageSettings,
    export: RawExportSettings,
    raster: RawRasterSettings,
}

impl RawSettings {
    fn apply_global_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_export_overrides(&mut self, overrides: &ExportOverrides) {
        if let Some(page_size) = overrides.page_size.as_ref() {
            self.export.page_size = Some(page_size.clone());
        }
        if let Some(orientation) = overrides.orientation.as_ref() {
            self.export.orientation = Some(orientation.clone());
        }
        if let Some(margin) = overrides.margin_mm {
            self.export.margin_mm = Some(margin);
        }
        if let Some(quality) = overrides.quality {
            self.export.quality = Some(quality);
        }
        if let Some(scale) = overrides.scale {
            self.export.scale = Some(scale);
        }
        if let Some(path) = overrides.raster_command.as_ref() {
            self.raster.command_path = Some(path.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            storage,
            export,
            raster,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let storage = build_storage_settings(storage)?;
        let export = build_export_settings(export)?;
        let raster = build_raster_settings(raster)?;

        Ok(Self {
            logging,
            database,
            storage,
            export,
            raster,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database
        .url
        .and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    if !url.starts_with("sqlite:") {
        return Err(LoadError::invalid(
            "database.url",
            format!("expected a sqlite URL, got `{url}`"),
        ));
    }

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let max_backups_per_file = non_zero_u32(
        storage
            .max_backups_per_file
            .unwrap_or(DEFAULT_MAX_BACKUPS_PER_FILE.into()),
        "storage.max_backups_per_file",
    )?;

    Ok(StorageSettings {
        max_backups_per_file,
    })
}

fn build_export_settings(export: RawExportSettings) -> Result<ExportSettings, LoadError> {
    let page_size = match export.page_size {
        Some(value) => PageSize::from_str(value.as_str())
            .map_err(|err| LoadError::invalid("export.page_size", err.to_string()))?,
        None => PageSize::default(),
    };
    let orientation = match export.orientation {
        Some(value) => Orientation::from_str(value.as_str())
            .map_err(|err| LoadError::invalid("export.orientation", err.to_string()))?,
        None => Orientation::default(),
    };

    let margin_mm = export.margin_mm.unwrap_or(DEFAULT_MARGIN_MM);
    if !margin_mm.is_finite() || margin_mm < 0.0 {
        return Err(LoadError::invalid(
            "export.margin_mm",
            "must be a non-negative number",
        ));
    }

    let quality = export.quality.unwrap_or(DEFAULT_QUALITY);
    if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
        return Err(LoadError::invalid(
            "export.quality",
            format!("must be within [{MIN_QUALITY}, {MAX_QUALITY}]"),
        ));
    }

    let scale = export.scale.unwrap_or(DEFAULT_SCALE);
    if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
        return Err(LoadError::invalid(
            "export.scale",
            format!("must be within [{MIN_SCALE}, {MAX_SCALE}]"),
        ));
    }

    let yield_interval = Duration::from_millis(
        export
            .yield_interval_ms
            .unwrap_or(DEFAULT_YIELD_INTERVAL_MS),
    );

    Ok(ExportSettings {
        page_size,
        orientation,
        margin_mm,
        quality,
        scale,
        yield_interval,
    })
}

fn build_raster_settings(raster: RawRasterSettings) -> Result<RasterSettings, LoadError> {
    let command_path = raster
        .command_path
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_RASTER_COMMAND));

    let timeout_secs = raster.timeout_secs.unwrap_or(DEFAULT_RASTER_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "raster.timeout_secs",
            "must be greater than zero",
        ));
    }

    Ok(RasterSettings {
        command_path,
        timeout: Duration::from_secs(timeout_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    max_backups_per_file: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExportSettings {
    page_size: Option<String>,
    orientation: Option<String>,
    margin_mm: Option<f64>,
    quality: Option<f32>,
    scale: Option<f32>,
    yield_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRasterSettings {
    command_path: Option<PathBuf>,
    timeout_secs: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
