//! vidbridge - video transcoding bridge
//!
//! Resolves caller-supplied input locators to local files, builds ffmpeg
//! command lines for transcode, trim, thumbnail and raw-command requests, runs
//! them on a bounded worker pool and streams progress back to the caller.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod media;
pub mod request;
pub mod resolve;
