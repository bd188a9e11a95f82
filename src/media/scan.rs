use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::info;

use crate::config::ScanConfig;
use crate::error::{BridgeError, Result};

/// Notifies the host's media index that a new file was written to the library
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaScanner: Send + Sync {
    async fn scan_file(&self, path: &Path) -> Result<()>;
}

/// Scanner for hosts without a media index; records the notification in the log
pub struct LogOnlyScanner;

#[async_trait]
impl MediaScanner for LogOnlyScanner {
    async fn scan_file(&self, path: &Path) -> Result<()> {
        info!("New library media: {}", path.display());
        Ok(())
    }
}

/// Runs a configured hook with the new file path appended
pub struct CommandScanner {
    program: String,
    args: Vec<String>,
}

impl CommandScanner {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| BridgeError::Config("scan.command is empty".to_string()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl MediaScanner for CommandScanner {
    async fn scan_file(&self, path: &Path) -> Result<()> {
        info!("Notifying media index about {}", path.display());

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .await
            .map_err(|e| BridgeError::LaunchFailed(format!("{}: {}", self.program, e)))?;

        if !status.success() {
            return Err(BridgeError::ProcessFailed(format!(
                "media scan hook {} exited with {}",
                self.program, status
            )));
        }
        Ok(())
    }
}

/// Factory for the configured media scanner
pub struct MediaScannerFactory;

impl MediaScannerFactory {
    pub fn create_scanner(config: &ScanConfig) -> Result<Arc<dyn MediaScanner>> {
        if config.command.is_empty() {
            Ok(Arc::new(LogOnlyScanner))
        } else {
            Ok(Arc::new(CommandScanner::new(&config.command)?))
        }
    }
}
