use crate::config::EncoderConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Lines of encoder diagnostics carried in a failure
const DIAGNOSTIC_TAIL_LINES: usize = 12;

/// Turns a numbered image sequence into a video file
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    /// Encode the frames matching `input_pattern` (printf-style `%d`) into
    /// `output`. Returns once the output file exists and is non-empty.
    async fn encode(&self, input_pattern: &Path, output: &Path) -> Result<()>;
}

/// ffmpeg run as a child process
pub struct FfmpegEncoder {
    config: EncoderConfig,
}

impl FfmpegEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn build_args(&self, input_pattern: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-framerate".into(),
            self.config.input_framerate.to_string().into(),
            "-i".into(),
            input_pattern.as_os_str().to_owned(),
            "-c:v".into(),
            self.config.codec.clone().into(),
            "-r".into(),
            self.config.output_framerate.to_string().into(),
            "-pix_fmt".into(),
            self.config.pixel_format.clone().into(),
        ];
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, input_pattern: &Path, output: &Path) -> Result<()> {
        let started = Instant::now();

        // output() drains stdout and stderr while waiting, so a chatty
        // encoder can never stall on a full pipe
        let result = Command::new(&self.config.binary)
            .args(self.build_args(input_pattern, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::Encoder(format!("Failed to start {:?}: {}", self.config.binary, e))
            })?;

        let diagnostics = String::from_utf8_lossy(&result.stderr);
        for line in diagnostics.lines() {
            debug!("ffmpeg: {}", line);
        }

        if !result.status.success() {
            return Err(Error::Encoder(format!(
                "Encoder exited with {}: {}",
                result.status,
                tail(&diagnostics, DIAGNOSTIC_TAIL_LINES)
            ))
            .into());
        }

        let produced = tokio::fs::metadata(output)
            .await
            .map(|meta| meta.len() > 0)
            .unwrap_or(false);
        if !produced {
            return Err(Error::Encoder(format!(
                "Encoder produced no output at {:?}: {}",
                output,
                tail(&diagnostics, DIAGNOSTIC_TAIL_LINES)
            ))
            .into());
        }

        info!("Encoded {:?} in {} ms", output, started.elapsed().as_millis());

        Ok(())
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join(" | ")
}
