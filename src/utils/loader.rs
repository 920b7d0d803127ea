//! Tab-separated entry files
//!
//! One entry per line: `owner<TAB>id<TAB>content`. Content runs to the end
//! of the line and may itself contain tabs. Blank lines and lines starting
//! with `#` are skipped.

use crate::index::types::{Entry, EntryId, OwnerId};
use crate::utils::progress::load_bar;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

/// Parse one line. `None` for blank lines and comments.
pub fn parse_line(line: &str, line_number: usize) -> Result<Option<(OwnerId, Entry)>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.splitn(3, '\t');
    let (Some(owner), Some(id), Some(content)) = (fields.next(), fields.next(), fields.next())
    else {
        bail!(
            "line {}: expected owner<TAB>id<TAB>content",
            line_number
        );
    };

    let owner: OwnerId = owner
        .trim()
        .parse()
        .with_context(|| format!("line {}: invalid owner {:?}", line_number, owner))?;
    let id: EntryId = id
        .trim()
        .parse()
        .with_context(|| format!("line {}: invalid entry id {:?}", line_number, id))?;

    Ok(Some((owner, Entry::new(id, content))))
}

/// Parse a whole document
pub fn parse_entries(text: &str) -> Result<Vec<(OwnerId, Entry)>> {
    let mut entries = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if let Some(parsed) = parse_line(line, i + 1)? {
            entries.push(parsed);
        }
    }
    Ok(entries)
}

/// Read and parse an entry file, with a progress bar if requested
pub fn load_entries(path: &Path, show_progress: bool) -> Result<Vec<(OwnerId, Entry)>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read data file {}", path.display()))?;

    let lines = text.lines().count();
    let pb = load_bar(lines as u64, show_progress);
    pb.set_message("Reading entries...");

    let mut entries = Vec::with_capacity(lines);
    for (i, line) in text.lines().enumerate() {
        let parsed = parse_line(line, i + 1)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        if let Some(parsed) = parsed {
            entries.push(parsed);
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    Ok(entries)
}
