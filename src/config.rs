use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub port: u16,
    pub temp_dir: Option<String>,
    pub max_upload_size: u64,
    pub allowed_extensions: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: 3000,
            temp_dir: None,
            max_upload_size: 1024 * 1024 * 1024, // 1 GiB
            allowed_extensions: default_extensions(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub job_expiry_secs: u64,
    pub cleanup_interval_secs: u64,
    pub download_linger_secs: u64,
    pub max_concurrent_transcodes: Option<usize>, // None = auto-detect
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            job_expiry_secs: 60 * 60,
            cleanup_interval_secs: 15 * 60,
            download_linger_secs: 5,
            max_concurrent_transcodes: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FfmpegSettings {
    pub preset: String,
    pub audio_codec: String,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            preset: "medium".to_string(),
            audio_codec: "copy".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub server: ServerSection,
    pub limits: LimitsSection,
    pub ffmpeg: FfmpegSettings,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub temp_dir: PathBuf,
    pub max_upload_size: u64,
    pub allowed_extensions: Vec<String>,
    pub job_expiry: Duration,
    pub cleanup_interval: Duration,
    pub download_linger: Duration,
    pub max_concurrent_transcodes: usize,
    pub ffmpeg: FfmpegSettings,
}

fn default_extensions() -> Vec<String> {
    ["mp4", "webm", "avi", "mov", "mkv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_concurrent_transcodes() -> usize {
    // Full libx264 encodes are heavier than stream copies, so stay well
    // under the core count.
    (num_cpus::get() / 2).clamp(1, 4)
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let base_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let config_path = base_dir.join("config.toml");
        let config_file = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str::<ConfigFile>(&content)?
        } else {
            ConfigFile::default()
        };

        // Env vars override the config file
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(config_file.server.port);

        let temp_dir_str = std::env::var("VIDEO_TEMP_DIR")
            .ok()
            .or(config_file.server.temp_dir);

        let temp_dir = match temp_dir_str {
            Some(dir) if dir.starts_with('/') => PathBuf::from(dir),
            Some(dir) => base_dir.join(dir),
            None => std::env::temp_dir().join("video-processing"),
        };

        let max_upload_size = std::env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config_file.server.max_upload_size);

        let job_expiry_secs = std::env::var("JOB_EXPIRY_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config_file.limits.job_expiry_secs);

        let cleanup_interval_secs = std::env::var("CLEANUP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config_file.limits.cleanup_interval_secs);

        let download_linger_secs = std::env::var("DOWNLOAD_LINGER_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(config_file.limits.download_linger_secs);

        let max_concurrent_transcodes = std::env::var("MAX_CONCURRENT_TRANSCODES")
            .ok()
            .and_then(|v| v.parse().ok())
            .or(config_file
                .limits
                .max_concurrent_transcodes
                .filter(|&v| v > 0))
            .unwrap_or_else(default_concurrent_transcodes);

        Ok(Self {
            port,
            temp_dir,
            max_upload_size,
            allowed_extensions: config_file.server.allowed_extensions,
            job_expiry: Duration::from_secs(job_expiry_secs),
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
            download_linger: Duration::from_secs(download_linger_secs),
            max_concurrent_transcodes,
            ffmpeg: config_file.ffmpeg,
        })
    }

    // Backward compatibility
    pub fn from_env() -> Self {
        Self::load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let server = ServerSection::default();
        let limits = LimitsSection::default();

        Self {
            port: server.port,
            temp_dir: std::env::temp_dir().join("video-processing"),
            max_upload_size: server.max_upload_size,
            allowed_extensions: server.allowed_extensions,
            job_expiry: Duration::from_secs(limits.job_expiry_secs),
            cleanup_interval: Duration::from_secs(limits.cleanup_interval_secs),
            download_linger: Duration::from_secs(limits.download_linger_secs),
            max_concurrent_transcodes: default_concurrent_transcodes(),
            ffmpeg: FfmpegSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.max_upload_size, 1024 * 1024 * 1024);
        assert_eq!(config.job_expiry, Duration::from_secs(3600));
        assert_eq!(config.cleanup_interval, Duration::from_secs(900));
        assert_eq!(config.download_linger, Duration::from_secs(5));
        assert!(config.allowed_extensions.contains(&"mp4".to_string()));
        assert!(config.max_concurrent_transcodes >= 1);
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let file: ConfigFile = toml::from_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(file.server.port, 8080);
        assert_eq!(file.server.max_upload_size, 1024 * 1024 * 1024);
        assert_eq!(file.limits.job_expiry_secs, 3600);
        assert_eq!(file.ffmpeg.preset, "medium");
    }

    #[test]
    fn ffmpeg_section_overrides() {
        let file: ConfigFile =
            toml::from_str("[ffmpeg]\npreset = \"veryfast\"\naudio_codec = \"aac\"\n").unwrap();
        assert_eq!(file.ffmpeg.preset, "veryfast");
        assert_eq!(file.ffmpeg.audio_codec, "aac");
    }
}
