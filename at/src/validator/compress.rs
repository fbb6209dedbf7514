//! Compiler diagnostic compression
//!
//! Build logs are long and mostly noise. The digest keeps the run of tool
//! lines starting at the first `error:` and caps it to a character bound so it
//! fits into a corrective prompt.

use tracing::debug;

/// Default marker prefixed to compiler output lines by the build tool
pub const DEFAULT_MARKER: &str = "[javac]";

/// Default digest bound in characters
pub const DEFAULT_LIMIT: usize = 10_000;

#[derive(Debug, Clone)]
pub struct DiagnosticCompressor {
    marker: String,
    limit: usize,
}

impl Default for DiagnosticCompressor {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER, DEFAULT_LIMIT)
    }
}

impl DiagnosticCompressor {
    pub fn new(marker: impl Into<String>, limit: usize) -> Self {
        Self {
            marker: marker.into(),
            limit,
        }
    }

    /// Digest a compile log; `None` when the log has no `error:` line
    pub fn compress(&self, diagnostic: &str) -> Option<String> {
        debug!(len = diagnostic.len(), marker = %self.marker, "compress: called");
        let mut lines = diagnostic.lines().skip_while(|line| !line.contains("error:")).peekable();
        lines.peek()?;

        let mut digest = String::new();
        let mut chars = 0;
        for line in lines {
            if !line.contains(&self.marker) {
                break;
            }
            let line_chars = line.chars().count() + 1;
            if chars + line_chars > self.limit {
                debug!(digest_chars = chars, "compress: limit reached");
                break;
            }
            chars += line_chars;
            digest.push_str(line);
            digest.push('\n');
        }

        debug!(digest_len = digest.len(), "compress: done");
        Some(digest)
    }
}
