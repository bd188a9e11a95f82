//! vidbridge - video transcoding bridge over an external ffmpeg binary
//!
//! Command-line front end: builds requests, hands them to the dispatcher and
//! renders the streamed responses.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tracing::{info, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vidbridge::cli::{Args, Commands};
use vidbridge::config::Config;
use vidbridge::dispatch::{Dispatcher, Response, ResponseStream};
use vidbridge::error::BridgeError;
use vidbridge::media::ProcessRunner;
use vidbridge::request::{ContainerFormat, Quality, TranscodeRequest};

const DEFAULT_CONFIG_FILE: &str = "vidbridge.toml";

enum Submission {
    Typed(TranscodeRequest),
    Action { action: String, options: serde_json::Value },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_guard = setup_logging(args.verbose)?;

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new(DEFAULT_CONFIG_FILE).exists() {
                info!("Found {} in current directory, loading...", DEFAULT_CONFIG_FILE);
                Config::from_file(DEFAULT_CONFIG_FILE)?
            } else {
                Config::default()
            }
        }
    };

    let submission = match args.command {
        Commands::Check => {
            let version = ProcessRunner::new(&config.media.binary_path)
                .check_availability()
                .await?;
            println!("{}", version);
            return Ok(());
        }
        Commands::InitConfig { path, force } => {
            if path.exists() && !force {
                return Err(BridgeError::Config(format!(
                    "{} already exists; use --force to overwrite",
                    path.display()
                ))
                .into());
            }
            config.save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
            return Ok(());
        }
        Commands::Transcode {
            input,
            name,
            quality,
            format,
            duration,
            no_library,
            delete_input,
        } => {
            let mut request = TranscodeRequest::transcode(input)
                .with_quality(parse_quality(&quality)?)
                .with_container_format(parse_container_format(&format)?)
                .with_save_to_library(!no_library)
                .with_delete_input(delete_input);
            if let Some(name) = name {
                request = request.with_output_name(name);
            }
            if let Some(duration) = duration {
                request = request.with_duration(duration);
            }
            Submission::Typed(request)
        }
        Commands::Trim { input, start, end, name } => {
            let request = TranscodeRequest::trim(input, start, end)?;
            Submission::Typed(match name {
                Some(name) => request.with_output_name(name),
                None => request,
            })
        }
        Commands::Thumbnail { input, name } => {
            let request = TranscodeRequest::thumbnail(input);
            Submission::Typed(match name {
                Some(name) => request.with_output_name(name),
                None => request,
            })
        }
        Commands::Exec { args } => Submission::Typed(TranscodeRequest::raw(args)),
        Commands::Request { action, options } => Submission::Action {
            action,
            options: serde_json::from_str(&options)?,
        },
    };

    let dispatcher = Dispatcher::new(&config)?;
    let stream = match submission {
        Submission::Typed(request) => dispatcher.submit(request),
        Submission::Action { action, options } => dispatcher.dispatch(&action, &options)?,
    };

    let terminal = if args.json {
        print_json_lines(stream).await?
    } else {
        show_progress(stream).await
    };

    match terminal {
        Some(Response::Success { output_path }) => {
            if !args.json {
                match output_path {
                    Some(path) => println!("{}", path),
                    None => println!("Done"),
                }
            }
            Ok(())
        }
        Some(Response::Failure { message }) => {
            if !args.json {
                eprintln!("Error: {}", message);
            }
            // Flush the file log before exiting
            drop(log_guard);
            std::process::exit(1);
        }
        _ => Err(BridgeError::Unexpected("request ended without a result".to_string()).into()),
    }
}

/// Print every response as one JSON line; returns the terminal response
async fn print_json_lines(mut stream: ResponseStream) -> Result<Option<Response>> {
    while let Some(response) = stream.recv().await {
        println!("{}", response.to_json()?);
        if response.is_terminal() {
            return Ok(Some(response));
        }
    }
    Ok(None)
}

/// Show the latest progress line on a spinner; returns the terminal response
async fn show_progress(mut stream: ResponseStream) -> Option<Response> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    while let Some(response) = stream.recv().await {
        match response {
            Response::Progress { progress } => pb.set_message(progress),
            terminal => {
                pb.finish_and_clear();
                return Some(terminal);
            }
        }
    }
    pb.finish_and_clear();
    None
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".vidbridge").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Daily rotation
    let file_appender = rolling::daily(&log_dir, "vidbridge.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = log_level(verbose);

    // Console output goes to stderr so stdout stays machine-readable
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(verbose)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("vidbridge.log").display()
    );

    Ok(guard)
}

/// Level for both layers; INFO keeps request milestones in the file log
fn log_level(verbose: bool) -> Level {
    if verbose { Level::DEBUG } else { Level::INFO }
}

/// Parse quality from string
fn parse_quality(quality: &str) -> Result<Quality> {
    match quality.to_lowercase().as_str() {
        "high" => Ok(Quality::High),
        "medium" => Ok(Quality::Medium),
        "low" => Ok(Quality::Low),
        _ => Err(BridgeError::Config(format!(
            "Invalid quality '{}'. Valid values: high, medium, low",
            quality
        ))
        .into()),
    }
}

/// Parse output container from string
fn parse_container_format(format: &str) -> Result<ContainerFormat> {
    match format.to_lowercase().as_str() {
        "mp4" => Ok(ContainerFormat::Mp4),
        "m4v" => Ok(ContainerFormat::M4v),
        "m4a" => Ok(ContainerFormat::M4a),
        "mov" | "quicktime" => Ok(ContainerFormat::Mov),
        _ => Err(BridgeError::Config(format!(
            "Invalid format '{}'. Valid values: mp4, m4v, m4a, mov",
            format
        ))
        .into()),
    }
}
