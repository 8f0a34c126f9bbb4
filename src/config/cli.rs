use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use uuid::Uuid;

use crate::domain::types::ExportFormat;

/// Command-line arguments for the Marksmith binary.
#[derive(Debug, Parser)]
#[command(
    name = "marksmith",
    version,
    about = "Markdown workspace with sanitized preview and paginated PDF export"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "MARKSMITH_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub global: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Render a markdown file to sanitized HTML.
    Render(RenderArgs),
    /// Export a markdown file as Markdown or PDF.
    Export(ExportArgs),
    /// Manage stored files.
    #[command(subcommand)]
    Files(FilesCommand),
    /// Read and write editor preferences.
    #[command(subcommand)]
    Prefs(PrefsCommand),
    /// Inspect and restore file backups.
    #[command(subcommand)]
    Backups(BackupsCommand),
}

#[derive(Debug, Args, Clone)]
pub struct RenderArgs {
    /// Markdown source file.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Write the HTML here instead of stdout.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct ExportArgs {
    /// Markdown source file.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,

    /// Output format (markdown|pdf).
    #[arg(long, value_name = "FORMAT")]
    pub format: ExportFormat,

    /// Destination path; defaults to the source name with the format's extension.
    #[arg(long, short, value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Document title embedded in the PDF metadata.
    #[arg(long, value_name = "TITLE")]
    pub title: Option<String>,

    /// Document author embedded in the PDF metadata.
    #[arg(long, value_name = "AUTHOR")]
    pub author: Option<String>,

    #[command(flatten)]
    pub overrides: ExportOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ExportOverrides {
    /// Override the page size (a4|letter|legal).
    #[arg(long = "page-size", value_name = "SIZE")]
    pub page_size: Option<String>,

    /// Override the page orientation (portrait|landscape).
    #[arg(long, value_name = "ORIENTATION")]
    pub orientation: Option<String>,

    /// Override the uniform page margin in millimetres.
    #[arg(long = "margin-mm", value_name = "MM")]
    pub margin_mm: Option<f64>,

    /// Override the page image quality (0.1–1.0).
    #[arg(long, value_name = "QUALITY")]
    pub quality: Option<f32>,

    /// Override the rasterization scale (0.5–5.0).
    #[arg(long, value_name = "SCALE")]
    pub scale: Option<f32>,

    /// Override the HTML-to-image command used for PDF export.
    #[arg(long = "raster-command", value_name = "PATH", value_hint = ValueHint::CommandName)]
    pub raster_command: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum FilesCommand {
    /// List stored files, most recently updated first.
    List,
    /// Print a file's content.
    Show { id: Uuid },
    /// Store a file read from disk.
    Import {
        #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
        path: PathBuf,
        /// Name to store the file under; defaults to the file name on disk.
        #[arg(long, value_name = "NAME")]
        name: Option<String>,
    },
    /// Replace a stored file's content with a file read from disk.
    Save {
        id: Uuid,
        #[arg(value_name = "PATH", value_hint = ValueHint::FilePath)]
        path: PathBuf,
    },
    /// Rename a stored file.
    Rename { id: Uuid, name: String },
    /// Delete a stored file and its backups.
    Delete { id: Uuid },
}

#[derive(Debug, Subcommand, Clone)]
pub enum PrefsCommand {
    /// List all preferences.
    List,
    /// Print one preference value as JSON.
    Get { key: String },
    /// Store a preference; the value is parsed as JSON.
    Set { key: String, value: String },
}

#[derive(Debug, Subcommand, Clone)]
pub enum BackupsCommand {
    /// List backups of a file, newest first.
    List { file_id: Uuid },
    /// Restore a backup into its file.
    Restore { backup_id: Uuid },
}
