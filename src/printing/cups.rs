//! CUPS command-line backend (`lpstat` / `lp`)

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;

use super::{PrintBackend, PrintOptions};
use crate::{Error, Result};

/// Talks to CUPS through its command-line tools
#[derive(Debug, Clone)]
pub struct CupsBackend {
    lpstat: String,
    lp: String,
}

impl Default for CupsBackend {
    fn default() -> Self {
        Self {
            lpstat: "lpstat".to_string(),
            lp: "lp".to_string(),
        }
    }
}

impl CupsBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check both tools are installed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Print`] naming the missing tool
    pub fn preflight(&self) -> Result<()> {
        for tool in [&self.lpstat, &self.lp] {
            let path = which::which(tool)
                .map_err(|_| Error::Print(format!("{tool} not found in PATH")))?;
            tracing::debug!(tool = %tool, path = %path.display(), "print tool found");
        }
        Ok(())
    }
}

#[async_trait]
impl PrintBackend for CupsBackend {
    async fn list_printers(&self) -> Result<String> {
        let output = Command::new(&self.lpstat)
            .arg("-p")
            .output()
            .await
            .map_err(|e| Error::Print(format!("failed to run {}: {e}", self.lpstat)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() || stdout.trim().is_empty() {
            return Err(Error::Print(format!(
                "cannot list printers ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(stdout)
    }

    async fn submit(&self, printer: &str, options: &PrintOptions, path: &Path) -> Result<String> {
        let output = Command::new(&self.lp)
            .args(options.lp_args(printer, path))
            .output()
            .await
            .map_err(|e| Error::Print(format!("failed to run {}: {e}", self.lp)))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() || !stderr.trim().is_empty() {
            return Err(Error::Print(format!(
                "print failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
