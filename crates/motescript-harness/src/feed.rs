//! Recorded mote output.
//!
//! A feed is a text file of simulator log lines (`time:id:text`, time in
//! microseconds). Blank lines and lines starting with `#` are skipped.

use std::{fs, path::Path};

use motescript_core::{EventMessage, ParseError};
use thiserror::Error;

/// Errors from loading a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The file could not be read.
    #[error("failed to read feed: {0}")]
    Io(#[from] std::io::Error),

    /// A line could not be parsed.
    #[error("line {line}: {source}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Underlying parse error.
        source: ParseError,
    },
}

/// Parse feed text into messages, in file order.
pub fn parse_feed(text: &str) -> Result<Vec<EventMessage>, FeedError> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.starts_with('#'))
        .map(|(idx, line)| {
            line.parse::<EventMessage>().map_err(|source| FeedError::Parse { line: idx + 1, source })
        })
        .collect()
}

/// Read and parse a feed file.
pub fn load_feed(path: &Path) -> Result<Vec<EventMessage>, FeedError> {
    let text = fs::read_to_string(path)?;
    parse_feed(&text)
}
