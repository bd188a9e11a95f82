//! Request dispatch.
//!
//! [`Dispatcher::submit`] returns as soon as the request is accepted. The
//! request then runs on the shared worker pool through
//! `Resolving -> Building -> Running`, and everything it has to say comes back
//! through the returned [`ResponseStream`]: zero or more progress responses
//! followed by exactly one terminal response.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{BridgeError, Result};
use crate::media::{
    write_jpeg, CommandBuilder, FfmpegThumbnailExtractor, MediaScanner, MediaScannerFactory, Plan,
    ProcessOutcome, ProcessRunner, ProgressEvent, ProgressSink, ThumbnailExtractor,
};
use crate::request::{Operation, TranscodeRequest};
use crate::resolve::{ContentResolver, LocalContentResolver, PathResolver};

/// Pipeline stage of a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Resolving,
    Building,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Resolving => "resolving",
            Stage::Building => "building",
            Stage::Running => "running",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Message delivered to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Response {
    /// One line of media processor output; more responses follow
    Progress { progress: String },
    /// Terminal success, with the output file for operations that produce one
    Success {
        #[serde(rename = "outputFilePath", skip_serializing_if = "Option::is_none")]
        output_path: Option<String>,
    },
    /// Terminal failure
    Failure { message: String },
}

impl Response {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Response::Progress { .. })
    }

    /// Whether the caller should keep listening after this response
    pub fn keep_callback(&self) -> bool {
        !self.is_terminal()
    }

    /// Single-line JSON form carrying the keep-listening marker
    pub fn to_json(&self) -> Result<String> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Envelope<'a> {
            keep_callback: bool,
            #[serde(flatten)]
            response: &'a Response,
        }

        Ok(serde_json::to_string(&Envelope {
            keep_callback: self.keep_callback(),
            response: self,
        })?)
    }
}

/// Responses of one submitted request
pub struct ResponseStream {
    request_id: Uuid,
    rx: mpsc::Receiver<Response>,
}

impl ResponseStream {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Next response; `None` once the terminal response has been taken
    pub async fn recv(&mut self) -> Option<Response> {
        self.rx.recv().await
    }

    /// Drain every response up to and including the terminal one
    pub async fn collect(mut self) -> Vec<Response> {
        let mut responses = Vec::new();
        while let Some(response) = self.recv().await {
            responses.push(response);
        }
        responses
    }
}

/// Forwards runner output to the caller as progress responses
struct ResponseSink(mpsc::Sender<Response>);

#[async_trait]
impl ProgressSink for ResponseSink {
    async fn progress(&mut self, event: ProgressEvent) {
        let _ = self
            .0
            .send(Response::Progress {
                progress: event.raw_line,
            })
            .await;
    }
}

pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    workers: Arc<Semaphore>,
    event_buffer: usize,
}

impl Dispatcher {
    /// Dispatcher with the default host collaborators for `config`
    pub fn new(config: &Config) -> Result<Self> {
        let content: Arc<dyn ContentResolver> =
            Arc::new(LocalContentResolver::new(config.storage.external_root.clone()));
        let thumbnails: Arc<dyn ThumbnailExtractor> =
            Arc::new(FfmpegThumbnailExtractor::new(&config.media, &config.thumbnail));
        let scanner = MediaScannerFactory::create_scanner(&config.scan)?;

        Ok(Self::with_collaborators(config, content, thumbnails, scanner))
    }

    pub fn with_collaborators(
        config: &Config,
        content: Arc<dyn ContentResolver>,
        thumbnails: Arc<dyn ThumbnailExtractor>,
        scanner: Arc<dyn MediaScanner>,
    ) -> Self {
        let pipeline = Pipeline {
            resolver: PathResolver::new(content),
            builder: CommandBuilder::new(config),
            runner: ProcessRunner::new(&config.media.binary_path),
            thumbnails,
            scanner,
            thumbnail_quality: config.thumbnail.quality,
        };

        Self {
            pipeline: Arc::new(pipeline),
            workers: Arc::new(Semaphore::new(config.workers.max_concurrent.max(1))),
            event_buffer: config.workers.event_buffer.max(1),
        }
    }

    /// Accept a request by action name and options object.
    ///
    /// Malformed options and unknown actions are rejected here, before any
    /// work is scheduled.
    pub fn dispatch(&self, action: &str, options: &Value) -> Result<ResponseStream> {
        let operation = Operation::from_action(action)?;
        let request = TranscodeRequest::from_options(operation, options)?;
        Ok(self.submit(request))
    }

    /// Schedule `request` on the worker pool. Must be called from within a tokio runtime.
    pub fn submit(&self, request: TranscodeRequest) -> ResponseStream {
        let request_id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.event_buffer);
        let pipeline = Arc::clone(&self.pipeline);
        let workers = Arc::clone(&self.workers);

        let span = info_span!(
            "request",
            id = %request_id,
            operation = request.operation().action_name()
        );
        debug!(parent: &span, "Stage: {}", Stage::Received);

        let job_span = span.clone();
        tokio::spawn(
            async move {
                let terminal = match workers.acquire_owned().await {
                    Ok(_permit) => {
                        let progress_tx = tx.clone();
                        let job = tokio::spawn(
                            async move { pipeline.execute(request, ResponseSink(progress_tx)).await }
                                .instrument(job_span),
                        );
                        // A panic inside the job surfaces here as a JoinError
                        match job.await {
                            Ok(result) => result,
                            Err(e) => Err(BridgeError::Unexpected(e.to_string())),
                        }
                    }
                    Err(_) => Err(BridgeError::Unexpected("worker pool is closed".to_string())),
                };

                let response = match terminal {
                    Ok(output) => {
                        info!("Stage: {}", Stage::Succeeded);
                        Response::Success {
                            output_path: output.map(|path| path.display().to_string()),
                        }
                    }
                    Err(e) => {
                        warn!("Stage: {}: {}", Stage::Failed, e);
                        Response::Failure { message: e.to_string() }
                    }
                };
                let _ = tx.send(response).await;
            }
            .instrument(span),
        );

        ResponseStream { request_id, rx }
    }
}

struct Pipeline {
    resolver: PathResolver,
    builder: CommandBuilder,
    runner: ProcessRunner,
    thumbnails: Arc<dyn ThumbnailExtractor>,
    scanner: Arc<dyn MediaScanner>,
    thumbnail_quality: u8,
}

impl Pipeline {
    async fn execute(&self, request: TranscodeRequest, mut sink: ResponseSink) -> Result<Option<PathBuf>> {
        debug!("Stage: {}", Stage::Resolving);
        let input = match request.operation() {
            Operation::RawCommand => None,
            _ => Some(self.resolver.resolve(request.input_locator())?),
        };

        debug!("Stage: {}", Stage::Building);
        let plan = self.builder.build(&request, input.as_deref())?;

        debug!("Stage: {}", Stage::Running);
        match plan {
            Plan::Process {
                command,
                work_dir,
                output_path,
            } => {
                let outcome = self
                    .runner
                    .run(&command, Some(&work_dir), output_path.as_deref(), &mut sink)
                    .await?;
                drop(sink);
                check_outcome(&command.description, &outcome, output_path.as_deref())?;
                if let (Some(output), Some(input)) = (&output_path, &input) {
                    self.after_transcode(&request, input, output).await;
                }
                Ok(output_path)
            }
            Plan::Thumbnail {
                input_path,
                output_path,
            } => {
                let image = self.thumbnails.extract(&input_path).await?;
                let quality = self.thumbnail_quality;
                let path = output_path.clone();
                tokio::task::spawn_blocking(move || write_jpeg(&image, &path, quality))
                    .await
                    .map_err(|e| BridgeError::Unexpected(e.to_string()))??;
                Ok(Some(output_path))
            }
        }
    }

    /// Library notification and input clean-up; neither affects the result
    async fn after_transcode(&self, request: &TranscodeRequest, input: &Path, output: &Path) {
        if request.operation() != Operation::Transcode {
            return;
        }
        if request.save_to_library() {
            if let Err(e) = self.scanner.scan_file(output).await {
                warn!("Media scan notification for {} failed: {}", output.display(), e);
            }
        }
        if request.delete_input_on_success() {
            match tokio::fs::remove_file(input).await {
                Ok(()) => info!("Deleted input file {}", input.display()),
                Err(e) => warn!("Failed to delete input file {}: {}", input.display(), e),
            }
        }
    }
}

fn check_outcome(description: &str, outcome: &ProcessOutcome, output_path: Option<&Path>) -> Result<()> {
    if !outcome.exited_cleanly() {
        let status = outcome
            .exit_code
            .map_or_else(|| "a signal".to_string(), |code| format!("exit code {}", code));
        return Err(BridgeError::ProcessFailed(format!("{} terminated with {}", description, status)));
    }
    if let Some(path) = output_path {
        if !outcome.output_file_exists {
            return Err(BridgeError::ProcessFailed(format!(
                "{} produced no output file at {}",
                description,
                path.display()
            )));
        }
    }
    Ok(())
}
