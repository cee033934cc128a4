use chrono::{FixedOffset, Utc};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

/// Which sinks a journal entry goes to. Selected per call.
#[derive(Debug, Clone, Copy)]
pub struct Sinks {
    pub console: bool,
    pub file: bool,
}

impl Sinks {
    pub fn both() -> Self {
        Self {
            console: true,
            file: true,
        }
    }
}

/// Append-only operation journal.
///
/// Records one line per application event, tagged with the operation that
/// produced it. Entirely fire-and-forget: a sink that cannot be written
/// never fails the request that produced the entry.
#[derive(Clone, Debug)]
pub struct Journal {
    log_path: PathBuf,
}

impl Journal {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Record `message` under the named operation.
    ///
    /// Line format: `[YYYY-MM-DD HH:MM:SS] [op] message`, timestamped in a
    /// fixed UTC+5 offset regardless of the host time zone.
    pub fn record(&self, op: &str, message: &str, sinks: Sinks) {
        let line = format!("[{}] [{op}] {message}", local_timestamp());

        if sinks.console {
            // Swallowed like the file sink: stderr may be a closed pipe
            // under a supervisor, and that must not fail the request.
            if let Err(e) = write_line(std::io::stderr(), &line) {
                debug!("journal console sink failed: {e}");
            }
        }

        if sinks.file {
            if let Err(e) = self.append(&line) {
                debug!("journal file sink failed: {e}");
            }
        }
    }

    fn append(&self, line: &str) -> std::io::Result<()> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        write_line(file, line)
    }
}

fn write_line(mut sink: impl Write, line: &str) -> std::io::Result<()> {
    writeln!(sink, "{line}")
}

fn local_timestamp() -> String {
    // UTC+5, the deployment's canonical zone
    let offset = FixedOffset::east_opt(5 * 3600).unwrap();
    Utc::now()
        .with_timezone(&offset)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

/// Char-safe truncation for journal entries; long titles and message
/// bodies are cut to keep lines readable.
pub fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
