use crate::config::FfmpegSettings;
use crate::effects::{build_filter_chain, VideoEffects};
use crate::jobs::{JobRegistry, JobStatus, Resolution};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug)]
pub struct VideoMeta {
    pub duration: f64,
    pub resolution: Option<Resolution>,
    pub file_size: Option<u64>,
}

/// Probe a video file with ffprobe for duration, resolution and size.
pub async fn probe<P: AsRef<Path>>(file_path: P) -> Result<VideoMeta> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg("-show_streams")
        .arg(file_path.as_ref())
        .output()
        .await
        .context("Failed to execute ffprobe")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("ffprobe failed: {}", stderr.trim());
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoMeta> {
    let parsed: ProbeOutput =
        serde_json::from_slice(stdout).context("Failed to parse ffprobe output")?;

    let duration = parsed
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse().ok())
        .unwrap_or(0.0);

    let resolution = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .and_then(|s| {
            Some(Resolution {
                width: s.width?,
                height: s.height?,
            })
        });

    let file_size = parsed.format.size.and_then(|s| s.trim().parse().ok());

    Ok(VideoMeta {
        duration,
        resolution,
        file_size,
    })
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to run ffmpeg: {0}")]
    Io(#[from] std::io::Error),
    #[error("ffmpeg failed: {0}")]
    Failed(String),
}

/// ffmpeg's -progress output, one key=value per line. out_time_ms is
/// microseconds despite the name; newer builds emit out_time_us as well.
#[derive(Debug, Default)]
struct ProgressState {
    out_time_secs: f64,
}

impl ProgressState {
    fn update(&mut self, key: &str, value: &str) {
        if matches!(key, "out_time_ms" | "out_time_us") {
            if let Ok(us) = value.parse::<f64>() {
                self.out_time_secs = us / 1_000_000.0;
            }
        }
    }
}

/// 100 is reserved for completion, so live progress tops out at 99.
fn percent_of(out_time_secs: f64, total_secs: f64) -> u8 {
    ((out_time_secs / total_secs) * 100.0).round().clamp(0.0, 99.0) as u8
}

fn failure_message(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("ffmpeg exited with an error")
        .to_string()
}

/// Run the transcode for one job. Progress flows through the registry while
/// the process runs; the terminal outcome is written exactly once and also
/// returned so the spawning task can log it.
pub async fn run_transcode(
    registry: &JobRegistry,
    job_id: Uuid,
    input: &Path,
    output: &Path,
    duration: Option<f64>,
    effects: &VideoEffects,
    settings: &FfmpegSettings,
) -> Result<(), TranscodeError> {
    let result = transcode_inner(registry, job_id, input, output, duration, effects, settings).await;

    match &result {
        Ok(()) => {
            registry.complete(job_id).await;
            info!("[transcode] ✅ Job {} complete", job_id);
        }
        Err(e) => {
            registry.fail(job_id, e.to_string()).await;
        }
    }
    result
}

async fn transcode_inner(
    registry: &JobRegistry,
    job_id: Uuid,
    input: &Path,
    output: &Path,
    duration: Option<f64>,
    effects: &VideoEffects,
    settings: &FfmpegSettings,
) -> Result<(), TranscodeError> {
    if let Some(dir) = output.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }

    let filter_chain = build_filter_chain(effects);

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-i").arg(input);
    if !filter_chain.is_empty() {
        cmd.arg("-vf").arg(&filter_chain);
    }
    cmd.arg("-c:v")
        .arg("libx264")
        .arg("-crf")
        .arg(effects.output_quality.crf().to_string())
        .arg("-preset")
        .arg(&settings.preset)
        .arg("-c:a")
        .arg(&settings.audio_codec)
        .arg("-movflags")
        .arg("+faststart")
        .arg("-progress")
        .arg("pipe:1")
        .arg("-nostats")
        .arg("-y")
        .arg(output)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    info!(
        "[transcode] 🎬 Job {} started (filters: {})",
        job_id,
        if filter_chain.is_empty() {
            "none"
        } else {
            filter_chain.as_str()
        }
    );

    let mut child = cmd.spawn()?;

    registry
        .update(job_id, |j| {
            if !j.status.is_terminal() {
                j.status = JobStatus::Processing;
                j.progress = 0;
            }
        })
        .await;

    // Drain stderr concurrently so a chatty ffmpeg never blocks on a full pipe.
    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut buf).await;
        }
        buf
    });

    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        let mut state = ProgressState::default();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some((key, value)) = line.split_once('=') {
                state.update(key.trim(), value.trim());
            }
            if let Some(total) = duration.filter(|d| *d > 0.0) {
                registry
                    .set_progress(job_id, percent_of(state.out_time_secs, total))
                    .await;
            }
        }
    }

    let status = child.wait().await?;
    let stderr_buf = stderr_task.await.unwrap_or_default();

    if status.success() {
        Ok(())
    } else {
        Err(TranscodeError::Failed(failure_message(&stderr_buf)))
    }
}
