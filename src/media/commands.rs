use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use crate::config::{Config, MediaConfig, StorageConfig};
use crate::error::{BridgeError, Result};
use crate::request::{Operation, TranscodeRequest};

/// Media processing command: binary plus ordered argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCommand {
    pub binary_path: String,
    pub args: Vec<String>,
    pub description: String,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            binary_path: binary_path.into(),
            args: Vec::new(),
            description: description.into(),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Seek before the following input (keyframe granularity)
    pub fn seek<S: Into<String>>(self, position: S) -> Self {
        self.arg("-ss").arg(position)
    }

    /// Limit output duration
    pub fn duration<S: Into<String>>(self, duration: S) -> Self {
        self.arg("-t").arg(duration)
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set video bitrate in kbit/s
    pub fn video_bitrate(self, kbps: u32) -> Self {
        self.arg("-b:v").arg(format!("{}k", kbps))
    }

    /// Set output frame rate
    pub fn frame_rate(self, fps: u32) -> Self {
        self.arg("-r").arg(fps.to_string())
    }

    /// Copy all streams without re-encoding
    pub fn copy_streams(self) -> Self {
        self.arg("-c").arg("copy")
    }

    /// Set audio channels
    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    /// Full argument vector with the binary first
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.binary_path.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Run to completion and return standard output.
    /// Used for short commands whose output is the result (version checks, frame grabs).
    pub async fn capture_stdout(&self) -> Result<Vec<u8>> {
        debug!("Executing media processing command: {} {:?}", self.binary_path, self.args);
        debug!("Description: {}", self.description);

        let output = Command::new(&self.binary_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| BridgeError::LaunchFailed(format!("{}: {}", self.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BridgeError::ProcessFailed(format!(
                "{} failed ({}): {}",
                self.description,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output.stdout)
    }
}

/// What a request turns into once its paths are known
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    /// Run the media binary
    Process {
        command: MediaCommand,
        /// Working directory for intermediate files
        work_dir: PathBuf,
        /// File that must exist afterwards, if the operation produces one
        output_path: Option<PathBuf>,
    },
    /// Grab a still frame through the thumbnail extractor
    Thumbnail {
        input_path: PathBuf,
        output_path: PathBuf,
    },
}

/// Builds media commands and output locations for requests
pub struct CommandBuilder {
    media: MediaConfig,
    storage: StorageConfig,
}

impl CommandBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            media: config.media.clone(),
            storage: config.storage.clone(),
        }
    }

    /// Build the plan for `request`. `input` is the resolved input file and is
    /// required for every operation except raw commands.
    pub fn build(&self, request: &TranscodeRequest, input: Option<&Path>) -> Result<Plan> {
        // The media process runs inside the work dir, so every location handed
        // to it must be absolute
        let storage = self.storage.to_absolute()?;

        if request.operation() == Operation::RawCommand {
            return self.raw(&storage, request);
        }

        let input = input.ok_or_else(|| {
            BridgeError::InvalidRequest(format!(
                "{} requires a resolved input file",
                request.operation().action_name()
            ))
        })?;

        match request.operation() {
            Operation::Transcode => self.transcode(&storage, request, input),
            Operation::Trim => self.trim(&storage, request, input),
            Operation::Thumbnail => self.thumbnail(&storage, request, input),
            Operation::RawCommand => unreachable!("raw commands are built above"),
        }
    }

    fn transcode(&self, storage: &StorageConfig, request: &TranscodeRequest, input: &Path) -> Result<Plan> {
        let output_dir = if request.save_to_library() {
            storage.library_dir()
        } else {
            storage.cache_dir.clone()
        };
        ensure_dir(&output_dir)?;
        ensure_dir(&storage.cache_dir)?;

        let output_path = output_dir.join(format!(
            "VID_{}{}",
            output_name(request),
            request.container_format().extension()
        ));
        let cap = request.quality().dimension_cap();

        let mut command = MediaCommand::new(&self.media.binary_path, "Transcode")
            .overwrite()
            .input(input);
        if let Some(duration) = request.duration() {
            command = command.duration(format_duration(duration));
        }
        let command = command
            .video_codec(&self.media.video_codec)
            .video_bitrate(self.media.video_bitrate_kbps)
            .video_filter(format!(
                "scale={cap}:{cap}:force_original_aspect_ratio=decrease:force_divisible_by=2"
            ))
            .frame_rate(self.media.frame_rate)
            .audio_channels(self.media.audio_channels)
            .arg("-strict")
            .arg("experimental")
            .output(&output_path);

        Ok(Plan::Process {
            command,
            work_dir: storage.cache_dir.clone(),
            output_path: Some(output_path),
        })
    }

    fn trim(&self, storage: &StorageConfig, request: &TranscodeRequest, input: &Path) -> Result<Plan> {
        let range = request.trim_range().ok_or_else(|| {
            BridgeError::InvalidRange("trim request carries no trim points".to_string())
        })?;
        if range.duration() <= 0.0 {
            return Err(BridgeError::InvalidRange("failed to trim video; duration is 0".to_string()));
        }

        let extension = input
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .ok_or_else(|| {
                BridgeError::InvalidLocator(format!("{} has no file extension", input.display()))
            })?;

        let work_dir = storage.temp_dir.join(extension);
        ensure_dir(&work_dir)?;
        let output_path = work_dir.join(format!("{}.{}", output_name(request), extension));

        let command = MediaCommand::new(&self.media.binary_path, "Fast trim")
            .overwrite()
            .seek(format_duration(range.start()))
            .input(input)
            .duration(format_duration(range.duration()))
            .copy_streams()
            .output(&output_path);

        Ok(Plan::Process {
            command,
            work_dir,
            output_path: Some(output_path),
        })
    }

    fn thumbnail(&self, storage: &StorageConfig, request: &TranscodeRequest, input: &Path) -> Result<Plan> {
        ensure_dir(&storage.cache_dir)?;
        let output_path = storage
            .cache_dir
            .join(format!("PIC_{}.jpg", output_name(request)));

        Ok(Plan::Thumbnail {
            input_path: input.to_path_buf(),
            output_path,
        })
    }

    fn raw(&self, storage: &StorageConfig, request: &TranscodeRequest) -> Result<Plan> {
        ensure_dir(&storage.cache_dir)?;
        let command = MediaCommand::new(&self.media.binary_path, "Raw command")
            .args(request.raw_args().iter().cloned());

        Ok(Plan::Process {
            command,
            work_dir: storage.cache_dir.clone(),
            output_path: None,
        })
    }
}

fn output_name(request: &TranscodeRequest) -> String {
    request
        .output_name()
        .map(str::to_string)
        .unwrap_or_else(default_output_name)
}

/// Timestamp name used when the caller gives none, e.g. `20261017_142503`
pub fn default_output_name() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Create `dir` and its parents. An existing directory is left untouched.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .map_err(|e| BridgeError::DirectoryUnavailable(format!("{}: {}", dir.display(), e)))
}

/// Format seconds as `0H:0M:0S`.
///
/// Every field gets exactly one literal leading zero (so 12 minutes is `012`).
/// Seconds keep their full fractional part; whole seconds print without one.
pub fn format_duration(seconds: f64) -> String {
    let mut remaining = seconds;
    let hours = (remaining / 3600.0).trunc();
    remaining -= hours * 3600.0;
    let minutes = (remaining / 60.0).trunc();
    remaining -= minutes * 60.0;

    format!("0{}:0{}:0{}", hours as i64, minutes as i64, remaining)
}
