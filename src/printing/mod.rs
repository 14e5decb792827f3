//! Print backends for the Print Device
//!
//! The backend contract mirrors the CUPS command line: a listing query that
//! returns raw text, and a submit call taking a printer, fixed page options
//! and a file.

pub mod cups;
pub mod resolver;

use std::path::Path;

use async_trait::async_trait;

use crate::Result;
use crate::config::PrintConfig;

pub use cups::CupsBackend;
pub use resolver::{choose_printer, parse_listing};

const GOOGLE_CONTENT_HOST: &str = "lh3.googleusercontent.com/d/";
const GOOGLE_CONTENT_SIZE: &str = "=w2048-h2048";

/// Fixed page options for every job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintOptions {
    pub media: String,
    pub copies: u32,
    pub fit_to_page: bool,
    pub landscape: bool,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            media: "a4".to_string(),
            copies: 1,
            fit_to_page: true,
            landscape: false,
        }
    }
}

impl PrintOptions {
    #[must_use]
    pub fn from_config(config: &PrintConfig) -> Self {
        Self {
            media: config.media.clone(),
            ..Self::default()
        }
    }

    /// `lp` arguments for a job
    #[must_use]
    pub fn lp_args(&self, printer: &str, path: &Path) -> Vec<String> {
        let mut args = vec![
            "-d".to_string(),
            printer.to_string(),
            "-n".to_string(),
            self.copies.to_string(),
            "-o".to_string(),
            format!("media={}", self.media),
        ];
        if self.fit_to_page {
            args.extend(["-o".to_string(), "fit-to-page".to_string()]);
        }
        args.extend([
            "-o".to_string(),
            format!("landscape={}", if self.landscape { "yes" } else { "no" }),
            path.display().to_string(),
        ]);
        args
    }
}

/// OS print subsystem
#[async_trait]
pub trait PrintBackend: Send + Sync {
    /// Raw printer listing
    async fn list_printers(&self) -> Result<String>;

    /// Submit one job, returning the backend's acknowledgement
    async fn submit(&self, printer: &str, options: &PrintOptions, path: &Path) -> Result<String>;
}

/// Turn a shared image link into a directly downloadable one
///
/// Google content links are cut at their size suffix and asked for a
/// 2048px rendition; anything else passes through trimmed.
#[must_use]
pub fn direct_image_url(raw: &str) -> String {
    let url = raw.trim();
    if url.contains(GOOGLE_CONTENT_HOST) {
        let clean = url.split('=').next().unwrap_or(url);
        return format!("{clean}{GOOGLE_CONTENT_SIZE}");
    }
    url.to_string()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn google_links_get_full_size() {
        assert_eq!(
            direct_image_url(" https://lh3.googleusercontent.com/d/abc123=s220 "),
            "https://lh3.googleusercontent.com/d/abc123=w2048-h2048"
        );
        assert_eq!(
            direct_image_url("https://lh3.googleusercontent.com/d/abc123"),
            "https://lh3.googleusercontent.com/d/abc123=w2048-h2048"
        );
    }

    #[test]
    fn other_links_pass_through() {
        assert_eq!(
            direct_image_url("http://10.0.0.2:3000/images/a.png"),
            "http://10.0.0.2:3000/images/a.png"
        );
    }

    #[test]
    fn lp_arguments() {
        let args = PrintOptions::default().lp_args("EPSON_L4260_Series", &PathBuf::from("/tmp/p.jpg"));
        assert_eq!(
            args,
            vec![
                "-d",
                "EPSON_L4260_Series",
                "-n",
                "1",
                "-o",
                "media=a4",
                "-o",
                "fit-to-page",
                "-o",
                "landscape=no",
                "/tmp/p.jpg"
            ]
        );
    }
}
