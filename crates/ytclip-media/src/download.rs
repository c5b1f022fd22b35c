//! yt-dlp command builder.
//!
//! The retrieval tool either fetches the whole source or, with
//! `--download-sections`, only the requested time range.

use std::path::{Path, PathBuf};

use crate::process::ToolInvocation;

/// Best MP4 video with M4A audio, falling back to any MP4.
pub const DEFAULT_FORMAT_SELECTOR: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/mp4";

/// Builder for yt-dlp invocations.
#[derive(Debug, Clone)]
pub struct YtDlpCommand {
    url: String,
    format: String,
    section: Option<(f64, f64)>,
    output: PathBuf,
}

impl YtDlpCommand {
    /// Download `url` into `output` using the default format selector.
    pub fn new(url: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            url: url.into(),
            format: DEFAULT_FORMAT_SELECTOR.to_string(),
            section: None,
            output: output.as_ref().to_path_buf(),
        }
    }

    /// Override the format selector.
    pub fn format(mut self, selector: impl Into<String>) -> Self {
        self.format = selector.into();
        self
    }

    /// Only download `[start, end)` seconds, cut server-side.
    pub fn section(mut self, start: f64, end: f64) -> Self {
        self.section = Some((start, end));
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![self.url.clone(), "-f".to_string(), self.format.clone()];

        if let Some((start, end)) = self.section {
            args.push("--download-sections".to_string());
            args.push(section_spec(start, end));
        }

        args.push("-o".to_string());
        args.push(self.output.to_string_lossy().to_string());
        args
    }

    /// Turn into a runnable invocation of `program`.
    pub fn into_invocation(self, program: impl Into<String>) -> ToolInvocation {
        ToolInvocation::new(program).args(self.build_args())
    }
}

/// `--download-sections` value: `*<start>-<end>`, numbers in shortest form.
pub fn section_spec(start: f64, end: f64) -> String {
    format!("*{}-{}", start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_spec() {
        assert_eq!(section_spec(30.0, 40.0), "*30-40");
        assert_eq!(section_spec(0.0, 12.5), "*0-12.5");
    }

    #[test]
    fn test_full_download_args() {
        let args = YtDlpCommand::new("https://youtu.be/abc", "/tmp/w/extracted.mp4").build_args();
        assert_eq!(
            args,
            vec![
                "https://youtu.be/abc",
                "-f",
                DEFAULT_FORMAT_SELECTOR,
                "-o",
                "/tmp/w/extracted.mp4"
            ]
        );
    }

    #[test]
    fn test_section_download_args() {
        let args = YtDlpCommand::new("https://example/video", "out.mp4")
            .section(30.0, 40.0)
            .build_args();
        let pos = args.iter().position(|a| a == "--download-sections").unwrap();
        assert_eq!(args[pos + 1], "*30-40");
        assert_eq!(args.last().unwrap(), "out.mp4");
    }
}
