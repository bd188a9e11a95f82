//! Request model shared by the dispatcher, the command builder and the CLI.
//!
//! A [`TranscodeRequest`] is built once per call, either through the typed
//! constructors or from the caller's options object, and is not modified
//! afterwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    Transcode,
    Trim,
    Thumbnail,
    RawCommand,
}

impl Operation {
    /// Map a caller-facing action name onto an operation
    pub fn from_action(action: &str) -> Result<Self> {
        match action {
            "transcodeVideo" => Ok(Operation::Transcode),
            "trim" => Ok(Operation::Trim),
            "createThumbnail" => Ok(Operation::Thumbnail),
            "execFFMPEG" => Ok(Operation::RawCommand),
            other => Err(BridgeError::UnknownOperation(other.to_string())),
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            Operation::Transcode => "transcodeVideo",
            Operation::Trim => "trim",
            Operation::Thumbnail => "createThumbnail",
            Operation::RawCommand => "execFFMPEG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    Low,
    Medium,
    #[default]
    High,
}

impl Quality {
    /// Wire code: 0 = high, 1 = medium, 2 = low. Anything else is high.
    pub fn from_code(code: i64) -> Self {
        match code {
            2 => Quality::Low,
            1 => Quality::Medium,
            _ => Quality::High,
        }
    }

    /// Output dimension cap, applied to both width and height
    pub fn dimension_cap(&self) -> u32 {
        match self {
            Quality::Low => 320,
            Quality::Medium => 480,
            Quality::High => 640,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContainerFormat {
    M4v,
    #[default]
    Mp4,
    M4a,
    Mov,
}

impl ContainerFormat {
    /// Wire code: 0 = m4v, 1 = mp4, 2 = m4a, 3 = quicktime. Anything else is mp4.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => ContainerFormat::M4v,
            2 => ContainerFormat::M4a,
            3 => ContainerFormat::Mov,
            _ => ContainerFormat::Mp4,
        }
    }

    /// File extension including the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            ContainerFormat::Mov => ".mov",
            ContainerFormat::M4a => ".m4a",
            ContainerFormat::M4v => ".m4v",
            ContainerFormat::Mp4 => ".mp4",
        }
    }
}

/// Start/end points of a fast trim, in seconds. `end` is always after `start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimRange {
    start: f64,
    end: f64,
}

impl TrimRange {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(BridgeError::InvalidRange(format!(
                "trim points must be finite (start={}, end={})",
                start, end
            )));
        }
        if start < 0.0 {
            return Err(BridgeError::InvalidRange(format!("trim start {} is negative", start)));
        }
        if end == start {
            return Err(BridgeError::InvalidRange("failed to trim video; duration is 0".to_string()));
        }
        if end < start {
            return Err(BridgeError::InvalidRange(format!(
                "trim end {} is before trim start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    operation: Operation,
    input_locator: String,
    output_name: Option<String>,
    quality: Quality,
    container_format: ContainerFormat,
    save_to_library: bool,
    delete_input_on_success: bool,
    duration: Option<f64>,
    trim: Option<TrimRange>,
    raw_args: Vec<String>,
}

/// Options object as sent by the calling application
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireOptions {
    file_uri: Option<String>,
    output_file_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_code")]
    quality: Option<i64>,
    #[serde(default, deserialize_with = "lenient_code")]
    output_file_type: Option<i64>,
    save_to_library: Option<bool>,
    delete_input_file: Option<bool>,
    duration: Option<f64>,
    trim_start: Option<f64>,
    trim_end: Option<f64>,
    cmd: Option<Vec<String>>,
}

/// Integer code that may arrive as any JSON number or a numeric string.
/// Anything else is treated as absent.
fn lenient_code<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let code = match &value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.trunc() as i64),
        _ => None,
    };
    Ok(code)
}

impl TranscodeRequest {
    fn base(operation: Operation, input_locator: String) -> Self {
        Self {
            operation,
            input_locator,
            output_name: None,
            quality: Quality::default(),
            container_format: ContainerFormat::default(),
            save_to_library: true,
            delete_input_on_success: false,
            duration: None,
            trim: None,
            raw_args: Vec::new(),
        }
    }

    /// Full re-encode with default quality (high) and container (mp4), saved to the library
    pub fn transcode<S: Into<String>>(input_locator: S) -> Self {
        Self::base(Operation::Transcode, input_locator.into())
    }

    pub fn trim<S: Into<String>>(input_locator: S, start: f64, end: f64) -> Result<Self> {
        let mut request = Self::base(Operation::Trim, input_locator.into());
        request.trim = Some(TrimRange::new(start, end)?);
        request.save_to_library = false;
        Ok(request)
    }

    pub fn thumbnail<S: Into<String>>(input_locator: S) -> Self {
        let mut request = Self::base(Operation::Thumbnail, input_locator.into());
        request.save_to_library = false;
        request
    }

    /// Arguments are passed to the media binary verbatim
    pub fn raw<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut request = Self::base(Operation::RawCommand, String::new());
        request.raw_args = args.into_iter().map(Into::into).collect();
        request.save_to_library = false;
        request
    }

    pub fn with_output_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_name = Some(name.into());
        self
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_container_format(mut self, format: ContainerFormat) -> Self {
        self.container_format = format;
        self
    }

    pub fn with_save_to_library(mut self, save: bool) -> Self {
        self.save_to_library = save;
        self
    }

    pub fn with_delete_input(mut self, delete: bool) -> Self {
        self.delete_input_on_success = delete;
        self
    }

    /// Limit the transcoded output to `seconds`; zero or less means no limit
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = (seconds.is_finite() && seconds > 0.0).then_some(seconds);
        self
    }

    /// Build a request from the caller's options object.
    ///
    /// `options` may be the object itself or an argument array whose first
    /// element is the object.
    pub fn from_options(operation: Operation, options: &Value) -> Result<Self> {
        let options = match options {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let wire: WireOptions = match options {
            Value::Null => WireOptions::default(),
            Value::Object(_) => serde_json::from_value(options)
                .map_err(|e| BridgeError::InvalidRequest(format!("malformed options: {}", e)))?,
            other => {
                return Err(BridgeError::InvalidRequest(format!(
                    "options must be an object, got {}",
                    other
                )));
            }
        };

        let require_uri = |uri: Option<String>| {
            uri.ok_or_else(|| BridgeError::InvalidRequest("missing required option 'fileUri'".to_string()))
        };

        let mut request = match operation {
            Operation::Transcode => {
                let mut request = Self::transcode(require_uri(wire.file_uri)?)
                    .with_quality(wire.quality.map(Quality::from_code).unwrap_or_default())
                    .with_container_format(
                        wire.output_file_type.map(ContainerFormat::from_code).unwrap_or_default(),
                    )
                    .with_save_to_library(wire.save_to_library.unwrap_or(true))
                    .with_delete_input(wire.delete_input_file.unwrap_or(false));
                if let Some(duration) = wire.duration {
                    request = request.with_duration(duration);
                }
                request
            }
            Operation::Trim => {
                let end = wire
                    .trim_end
                    .ok_or_else(|| BridgeError::InvalidRequest("missing required option 'trimEnd'".to_string()))?;
                Self::trim(require_uri(wire.file_uri)?, wire.trim_start.unwrap_or(0.0), end)?
            }
            Operation::Thumbnail => Self::thumbnail(require_uri(wire.file_uri)?),
            Operation::RawCommand => {
                let args = wire
                    .cmd
                    .ok_or_else(|| BridgeError::InvalidRequest("missing required option 'cmd'".to_string()))?;
                Self::raw(args)
            }
        };

        if operation != Operation::RawCommand {
            request.output_name = wire.output_file_name;
        }
        Ok(request)
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn input_locator(&self) -> &str {
        &self.input_locator
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output_name.as_deref()
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn container_format(&self) -> ContainerFormat {
        self.container_format
    }

    pub fn save_to_library(&self) -> bool {
        self.save_to_library
    }

    pub fn delete_input_on_success(&self) -> bool {
        self.delete_input_on_success
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    pub fn trim_range(&self) -> Option<TrimRange> {
        self.trim
    }

    pub fn raw_args(&self) -> &[String] {
        &self.raw_args
    }
}
