use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, BridgeError};

// Default values for fields that older config files may omit
fn default_event_buffer() -> usize {
    64
}

fn default_thumbnail_quality() -> u8 {
    75
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub media: MediaConfig,
    pub storage: StorageConfig,
    pub workers: WorkerConfig,
    pub thumbnail: ThumbnailConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Video encoder used for full transcodes
    pub video_codec: String,
    /// Target video bitrate in kbit/s
    pub video_bitrate_kbps: u32,
    /// Output frame rate
    pub frame_rate: u32,
    /// Output audio channel count
    pub audio_channels: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Name of the library sub-directory finished media is saved under
    pub app_name: String,
    /// Root of shared storage; the library lives at `<external_root>/Movies/<app_name>`
    /// and `primary:` storage documents resolve relative to it
    pub external_root: PathBuf,
    /// Private cache for transcodes kept out of the library, and for thumbnails
    pub cache_dir: PathBuf,
    /// Working directory root for trims
    pub temp_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum number of requests running at once
    pub max_concurrent: usize,
    /// Capacity of each request's event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// JPEG quality (1-100)
    #[serde(default = "default_thumbnail_quality")]
    pub quality: u8,
    pub max_width: u32,
    pub max_height: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Command notified about new library media; the file path is appended.
    /// Empty means notifications are only logged.
    #[serde(default)]
    pub command: Vec<String>,
}

impl StorageConfig {
    /// Persistent, user-visible directory for finished media
    pub fn library_dir(&self) -> PathBuf {
        self.external_root.join("Movies").join(&self.app_name)
    }

    /// Copy with every root anchored on the current directory
    pub fn to_absolute(&self) -> Result<Self> {
        Ok(Self {
            app_name: self.app_name.clone(),
            external_root: absolute_dir(&self.external_root)?,
            cache_dir: absolute_dir(&self.cache_dir)?,
            temp_dir: absolute_dir(&self.temp_dir)?,
        })
    }
}

fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    std::path::absolute(dir)
        .map_err(|e| BridgeError::DirectoryUnavailable(format!("{}: {}", dir.display(), e)))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                video_codec: "libx264".to_string(),
                // Source material is typically ~512 kbps; 1024 + 1024 + 512
                video_bitrate_kbps: 2560,
                frame_rate: 30,
                audio_channels: 1,
            },
            storage: StorageConfig {
                app_name: "vidbridge".to_string(),
                external_root: PathBuf::from("."),
                cache_dir: PathBuf::from(".vidbridge").join("cache"),
                temp_dir: PathBuf::from(".vidbridge").join("tmp"),
            },
            workers: WorkerConfig {
                max_concurrent: 4,
                event_buffer: default_event_buffer(),
            },
            thumbnail: ThumbnailConfig {
                quality: default_thumbnail_quality(),
                max_width: 512,
                max_height: 384,
            },
            scan: ScanConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| BridgeError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.media.binary_path.trim().is_empty() {
            return Err(BridgeError::Config("media.binary_path must not be empty".to_string()));
        }
        if self.workers.max_concurrent == 0 {
            return Err(BridgeError::Config("workers.max_concurrent must be at least 1".to_string()));
        }
        if self.workers.event_buffer == 0 {
            return Err(BridgeError::Config("workers.event_buffer must be at least 1".to_string()));
        }
        if !(1..=100).contains(&self.thumbnail.quality) {
            return Err(BridgeError::Config(format!(
                "thumbnail.quality must be within 1..=100, got {}",
                self.thumbnail.quality
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_library_dir() {
        let config = Config::default();
        assert_eq!(
            config.storage.library_dir(),
            PathBuf::from(".").join("Movies").join("vidbridge")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_to_absolute() {
        let storage = Config::default().storage.to_absolute().unwrap();
        let cwd = std::env::current_dir().unwrap();

        assert_eq!(storage.cache_dir, cwd.join(".vidbridge").join("cache"));
        assert_eq!(storage.temp_dir, cwd.join(".vidbridge").join("tmp"));
        assert!(storage.library_dir().is_absolute());
        assert_eq!(storage.app_name, "vidbridge");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vidbridge.toml");

        let mut config = Config::default();
        config.storage.app_name = "Shotclip".to_string();
        config.scan.command = vec!["touch".to_string()];
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.storage.app_name, "Shotclip");
        assert_eq!(loaded.scan.command, vec!["touch".to_string()]);
        assert_eq!(loaded.thumbnail.quality, 75);
    }

    #[test]
    fn test_rejects_zero_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");

        let mut config = Config::default();
        config.workers.max_concurrent = 0;
        config.save_to_file(&path).unwrap();

        assert!(matches!(Config::from_file(&path), Err(BridgeError::Config(_))));
    }
}
