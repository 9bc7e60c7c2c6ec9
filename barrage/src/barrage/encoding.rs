//! Results as JSON lines, one outcome per line

use crate::{Outcome, ResultSet};
use std::io;
use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line {line}: {source}")]
    Json {
        line: usize,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub fn write_results<W: Write>(mut writer: W, results: &ResultSet) -> io::Result<()> {
    for outcome in results.iter() {
        serde_json::to_writer(&mut writer, outcome)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// Blank lines are skipped
pub fn read_results<R: BufRead>(reader: R) -> Result<Vec<Outcome>, DecodeError> {
    let mut outcomes = vec![];
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let outcome = serde_json::from_str(&line).map_err(|source| DecodeError::Json {
            line: idx + 1,
            source,
        })?;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
