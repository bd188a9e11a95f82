// Media processing layer
//
// Everything that talks to the external media binary or the host's media services:
// - Commands: argument vectors and output locations per operation
// - Runner: process launch with streamed, line-oriented progress
// - Thumbnail: still-frame extraction and JPEG output
// - Scan: new-media notifications for the host's library index

pub mod commands;
pub mod runner;
pub mod scan;
pub mod thumbnail;

pub use commands::*;
pub use runner::*;
pub use scan::*;
pub use thumbnail::*;
