use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print every response as a JSON line instead of a progress spinner
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Re-encode a video at a target quality into a target container
    Transcode {
        /// Input locator (path, file:// or content: reference)
        #[arg(short, long)]
        input: String,

        /// Output base name; defaults to the current timestamp
        #[arg(short, long)]
        name: Option<String>,

        /// Output quality
        #[arg(short, long, default_value = "high")]
        quality: String,

        /// Output container
        #[arg(short, long, default_value = "mp4")]
        format: String,

        /// Limit the output to this many seconds
        #[arg(short, long)]
        duration: Option<f64>,

        /// Write to the cache directory instead of the media library
        #[arg(long)]
        no_library: bool,

        /// Delete the input after a successful transcode
        #[arg(long)]
        delete_input: bool,
    },

    /// Cut a time range out of a video without re-encoding
    Trim {
        /// Input locator (path, file:// or content: reference)
        #[arg(short, long)]
        input: String,

        /// Start of the range in seconds
        #[arg(short, long, default_value = "0")]
        start: f64,

        /// End of the range in seconds
        #[arg(short, long)]
        end: f64,

        /// Output base name; defaults to the current timestamp
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Save a still frame of a video as JPEG
    Thumbnail {
        /// Input locator (path, file:// or content: reference)
        #[arg(short, long)]
        input: String,

        /// Output base name; defaults to the current timestamp
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Run the media processor with arbitrary arguments
    Exec {
        /// Arguments passed verbatim
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        args: Vec<String>,
    },

    /// Submit a request as an action name and a JSON options object
    Request {
        /// Action name (transcodeVideo, trim, createThumbnail, execFFMPEG)
        action: String,

        /// Options object or argument array, as JSON
        #[arg(default_value = "{}")]
        options: String,
    },

    /// Check that the media processor can be launched
    Check,

    /// Write a configuration file with default values
    InitConfig {
        /// Destination path
        #[arg(default_value = "vidbridge.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_takes_hyphenated_args() {
        let args = Args::try_parse_from(["vidbridge", "exec", "--", "-i", "a.mp4", "-vf", "scale=2:2", "b.gif"]).unwrap();
        match args.command {
            Commands::Exec { args } => assert_eq!(args, vec!["-i", "a.mp4", "-vf", "scale=2:2", "b.gif"]),
            _ => panic!("expected exec"),
        }
    }

    #[test]
    fn test_trim_defaults_start() {
        let args = Args::try_parse_from(["vidbridge", "--json", "trim", "-i", "clip.mov", "-e", "4.5"]).unwrap();
        assert!(args.json);
        match args.command {
            Commands::Trim { input, start, end, name } => {
                assert_eq!(input, "clip.mov");
                assert_eq!(start, 0.0);
                assert_eq!(end, 4.5);
                assert!(name.is_none());
            }
            _ => panic!("expected trim"),
        }
    }

    #[test]
    fn test_request_default_options() {
        let args = Args::try_parse_from(["vidbridge", "request", "createThumbnail"]).unwrap();
        match args.command {
            Commands::Request { action, options } => {
                assert_eq!(action, "createThumbnail");
                assert_eq!(options, "{}");
            }
            _ => panic!("expected request"),
        }
    }
}
