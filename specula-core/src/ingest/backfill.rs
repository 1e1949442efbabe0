//! Cold-start backfill
//!
//! Reads only the trailing window of each recently-modified transcript —
//! a deliberate bounded-cost approximation (O(window × files) startup
//! regardless of file sizes) that may drop a session's very old events.
//! The pooled records are sorted by timestamp and capped; the caller
//! appends them to the store without broadcasting.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::enrich::AgentMap;
use super::normalize::normalize_line;
use crate::types::NormalizedRecord;

/// Classify the tail of every given file and return the `max_records`
/// most recent records, sorted ascending by timestamp.
pub(crate) fn collect_recent(
    files: &[PathBuf],
    tail_bytes: u64,
    max_records: usize,
    agents: &AgentMap,
) -> Vec<NormalizedRecord> {
    let mut pool = Vec::new();

    for path in files {
        match read_tail(path, tail_bytes) {
            Ok(Some((text, mid_file))) => {
                let mut lines = text.split('\n').filter(|l| !l.trim().is_empty());
                if mid_file {
                    // The window may start mid-record; drop the torn line
                    lines.next();
                }
                for line in lines {
                    if let Some(record) = normalize_line(line, agents) {
                        pool.push(record);
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(
                    path = %path.display(),
                    error = %e,
                    "Skipping unreadable file during backfill"
                );
            }
        }
    }

    pool.sort_by_key(|r| r.timestamp);
    if pool.len() > max_records {
        pool.split_off(pool.len() - max_records)
    } else {
        pool
    }
}

/// Read at most `tail_bytes` from the end of the file.
///
/// Returns the decoded text and whether the window started mid-file
/// (`None` for an empty file).
fn read_tail(path: &Path, tail_bytes: u64) -> std::io::Result<Option<(String, bool)>> {
    let size = std::fs::metadata(path)?.len();
    if size == 0 {
        return Ok(None);
    }

    let start = size.saturating_sub(tail_bytes);
    let mut file = File::open(path)?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))?;
    }

    let mut buf = Vec::with_capacity((size - start) as usize);
    file.read_to_end(&mut buf)?;
    Ok(Some((String::from_utf8_lossy(&buf).into_owned(), start > 0)))
}
