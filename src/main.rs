use std::{path::Path, process, sync::Arc};

use marksmith::{
    application::{
        error::AppError,
        export::{
            ExportError, ExportPipeline, HtmlSurface, PipelineSettings, ProgressEvent,
            ProgressSink, export_markdown,
        },
        render::{RenderProfile, RenderRequest, RenderService, render_service},
        repos::{BackupsRepo, FilesRepo, PreferencesRepo},
        workspace::WorkspaceService,
    },
    config::{self, BackupsCommand, FilesCommand, PrefsCommand},
    domain::{entities::FileRecord, types::ExportFormat},
    infra::{
        db::SqliteRepositories, error::InfraError, pdf::PdfAssembler, raster::CommandRasterizer,
        telemetry,
    },
};
use time::format_description::well_known::Rfc3339;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        if !matches!(&error, AppError::Export(err) if !err.is_user_visible()) {
            report_application_error(&error);
        }
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match cli_args.command {
        config::Command::Render(args) => run_render(args).await,
        config::Command::Export(args) => run_export(&settings, args).await,
        config::Command::Files(command) => run_files(&settings, command).await,
        config::Command::Prefs(command) => run_prefs(&settings, command).await,
        config::Command::Backups(command) => run_backups(&settings, command).await,
    }
}

async fn run_render(args: config::RenderArgs) -> Result<(), AppError> {
    let source = read_source(&args.file).await?;
    let output = render_service().render(&RenderRequest::new(source))?;

    info!(
        target = "marksmith::render",
        words = output.stats.words,
        code_blocks = output.stats.code_blocks,
        reading_time_minutes = output.stats.reading_time_minutes,
        "Markdown rendered"
    );

    match args.output {
        Some(path) => write_output(&path, output.html.as_bytes()).await,
        None => {
            println!("{}", output.html);
            Ok(())
        }
    }
}

async fn run_export(settings: &config::Settings, args: config::ExportArgs) -> Result<(), AppError> {
    let source = read_source(&args.file).await?;
    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| args.file.with_extension(args.format.extension()));
    let filename = output_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let artifact = match args.format {
        ExportFormat::Markdown => export_markdown(&source, &filename)?,
        ExportFormat::Pdf => {
            let rendered = render_service()
                .render(&RenderRequest::new(source).with_profile(RenderProfile::Export))?;
            let mut surface = HtmlSurface::new(rendered.html);

            let mut options = settings.export.options(filename);
            if let Some(title) = args.title {
                options.title = title;
            }
            if let Some(author) = args.author {
                options.author = author;
            }

            let progress: Arc<dyn ProgressSink> = Arc::new(|event: &ProgressEvent| {
                eprintln!(
                    "[{:>3}%] {:<11} {}",
                    event.percent,
                    event.stage.as_str(),
                    event.message
                );
            });
            let pipeline = ExportPipeline::new(
                Arc::new(CommandRasterizer::new(
                    settings.raster.command_path.clone(),
                    settings.raster.timeout,
                )),
                Arc::new(PdfAssembler),
                progress,
            )
            .with_settings(PipelineSettings {
                yield_interval: settings.export.yield_interval,
            });

            let cancel = pipeline.cancel_handle();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            let result = pipeline.start_export(&mut surface, &options).await;
            interrupt.abort();

            match result {
                Ok(artifact) => artifact,
                Err(ExportError::Cancelled) => {
                    info!(target = "marksmith::export", "Export cancelled by user");
                    return Err(ExportError::Cancelled.into());
                }
                Err(err) => return Err(err.into()),
            }
        }
    };

    let destination = output_path.with_file_name(&artifact.filename);
    write_output(&destination, &artifact.bytes).await?;
    info!(
        target = "marksmith::export",
        path = %destination.display(),
        content_type = artifact.content_type,
        bytes = artifact.bytes.len(),
        pages = artifact.pages.unwrap_or_default(),
        "Export written"
    );
    Ok(())
}

async fn run_files(settings: &config::Settings, command: FilesCommand) -> Result<(), AppError> {
    let workspace = init_workspace(settings).await?;
    match command {
        FilesCommand::List => {
            for file in workspace.list_files().await? {
                println!(
                    "{}\t{}\t{}",
                    file.id,
                    format_timestamp(&file)?,
                    file.name
                );
            }
        }
        FilesCommand::Show { id } => {
            let file = workspace.open_file(id).await?;
            print!("{}", file.content);
        }
        FilesCommand::Import { path, name } => {
            let content = read_source(&path).await?;
            let name = name.unwrap_or_else(|| default_name(&path));
            let file = workspace.create_file(&name, content).await?;
            println!("{}", file.id);
        }
        FilesCommand::Save { id, path } => {
            let content = read_source(&path).await?;
            workspace.save_file(id, content).await?;
        }
        FilesCommand::Rename { id, name } => {
            workspace.rename_file(id, &name).await?;
        }
        FilesCommand::Delete { id } => {
            workspace.delete_file(id).await?;
        }
    }
    Ok(())
}

async fn run_prefs(settings: &config::Settings, command: PrefsCommand) -> Result<(), AppError> {
    let workspace = init_workspace(settings).await?;
    match command {
        PrefsCommand::List => {
            for preference in workspace.preferences().await? {
                println!("{}\t{}", preference.key, preference.value);
            }
        }
        PrefsCommand::Get { key } => match workspace.preference(&key).await? {
            Some(value) => println!("{value}"),
            None => return Err(AppError::NotFound),
        },
        PrefsCommand::Set { key, value } => {
            let value = serde_json::from_str(&value)
                .map_err(|err| AppError::validation(format!("value is not valid JSON: {err}")))?;
            workspace.set_preference(&key, value).await?;
        }
    }
    Ok(())
}

async fn run_backups(settings: &config::Settings, command: BackupsCommand) -> Result<(), AppError> {
    let workspace = init_workspace(settings).await?;
    match command {
        BackupsCommand::List { file_id } => {
            for backup in workspace.backups(file_id).await? {
                let created_at = backup
                    .created_at
                    .format(&Rfc3339)
                    .map_err(|err| AppError::unexpected(err.to_string()))?;
                println!("{}\t{}\t{}", backup.id, created_at, backup.checksum);
            }
        }
        BackupsCommand::Restore { backup_id } => {
            let file = workspace.restore_backup(backup_id).await?;
            println!("{}", file.id);
        }
    }
    Ok(())
}

async fn init_workspace(settings: &config::Settings) -> Result<WorkspaceService, AppError> {
    let pool = SqliteRepositories::connect(
        &settings.database.url,
        settings.database.max_connections.get(),
    )
    .await
    .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    SqliteRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    let repositories = Arc::new(SqliteRepositories::new(pool));
    let files: Arc<dyn FilesRepo> = repositories.clone();
    let preferences: Arc<dyn PreferencesRepo> = repositories.clone();
    let backups: Arc<dyn BackupsRepo> = repositories;

    Ok(WorkspaceService::new(
        files,
        preferences,
        backups,
        settings.storage.max_backups_per_file.get() as usize,
    ))
}

async fn read_source(path: &Path) -> Result<String, AppError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}

async fn write_output(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(InfraError::from)?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))
}

fn default_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn format_timestamp(file: &FileRecord) -> Result<String, AppError> {
    file.updated_at
        .format(&Rfc3339)
        .map_err(|err| AppError::unexpected(err.to_string()))
}
