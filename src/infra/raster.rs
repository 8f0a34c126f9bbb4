//! Rasterizer backed by an external HTML-to-PNG command such as `wkhtmltoimage`.

use std::{
    io::ErrorKind,
    path::PathBuf,
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use image::{ImageFormat, RgbaImage};
use tokio::process::Command;
use tracing::{info, warn};

use crate::application::export::{ContentSurface, RasterError, RasterOptions, Rasterizer};

#[derive(Debug, Clone)]
pub struct CommandRasterizer {
    command_path: PathBuf,
    timeout: Duration,
}

impl CommandRasterizer {
    pub fn new(command_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            command_path: command_path.into(),
            timeout,
        }
    }

    async fn run_command(
        &self,
        input: &std::path::Path,
        output: &std::path::Path,
        options: RasterOptions,
    ) -> Result<(), RasterError> {
        let started_at = Instant::now();
        let device_width = (f64::from(options.width_px) * f64::from(options.scale)).round() as u32;

        let child = Command::new(&self.command_path)
            .arg("--quiet")
            .arg("--format")
            .arg("png")
            .arg("--width")
            .arg(device_width.to_string())
            .arg("--zoom")
            .arg(format!("{:.3}", options.scale))
            .arg("--disable-smart-width")
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(result) => result.map_err(|err| {
                warn!(
                    target = "infra::raster",
                    op = "raster::spawn",
                    result = "error",
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    error = %err,
                    "Failed to spawn rasterizer command"
                );
                if err.kind() == ErrorKind::NotFound {
                    RasterError::Unavailable(format!(
                        "`{}` not found",
                        self.command_path.display()
                    ))
                } else {
                    RasterError::Failed(err.to_string())
                }
            })?,
            Err(_) => {
                warn!(
                    target = "infra::raster",
                    op = "raster::run",
                    result = "timeout",
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Rasterizer command timed out"
                );
                return Err(RasterError::Failed(format!(
                    "timed out after {} ms",
                    self.timeout.as_millis()
                )));
            }
        };

        if !output.status.success() {
            let exit_code = output.status.code().map(i64::from).unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "infra::raster",
                op = "raster::run",
                result = "error",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code,
                stderr = %stderr,
                "Rasterizer command failed"
            );
            return Err(RasterError::Failed(format!(
                "exit {exit_code}: {}",
                stderr.trim()
            )));
        }

        info!(
            target = "infra::raster",
            op = "raster::run",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            device_width,
            "Surface rasterized"
        );
        Ok(())
    }
}

#[async_trait]
impl Rasterizer for CommandRasterizer {
    async fn rasterize(
        &self,
        surface: &dyn ContentSurface,
        options: RasterOptions,
    ) -> Result<RgbaImage, RasterError> {
        let workdir = tempfile::tempdir().map_err(|err| RasterError::Failed(err.to_string()))?;
        let input_path = workdir.path().join("surface.html");
        let output_path = workdir.path().join("surface.png");

        tokio::fs::write(&input_path, surface.to_document())
            .await
            .map_err(|err| RasterError::Failed(format!("failed to write surface: {err}")))?;

        self.run_command(&input_path, &output_path, options).await?;

        let bytes = tokio::fs::read(&output_path)
            .await
            .map_err(|err| RasterError::Decode(format!("missing output image: {err}")))?;
        let bitmap = image::load_from_memory_with_format(&bytes, ImageFormat::Png)
            .map_err(|err| RasterError::Decode(err.to_string()))?
            .to_rgba8();

        Ok(bitmap)
    }
}
