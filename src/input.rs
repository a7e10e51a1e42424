//! User-supplied input: tag filters and resource list files
//!
//! List files are CSV with a `resource_names` column; a file without that
//! header is read as one name per line (the historical format). A malformed
//! row fails the whole load.

use crate::tags::TagFilter;
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::Path;

/// Column holding resource names in structured list files.
const RESOURCE_NAMES_COLUMN: &str = "resource_names";

/// Resolve a tag filter from an optional CLI argument, prompting
/// interactively when absent.
pub fn resolve_tag_filter(raw: Option<&str>) -> Result<TagFilter> {
    match raw {
        Some(s) => TagFilter::parse(s),
        None => prompt_tag_filter(),
    }
}

/// Interactively collect a tag filter: one key per round, comma-separated
/// values, terminated by a blank key or value.
pub fn prompt_tag_filter() -> Result<TagFilter> {
    println!("Insert tags.");
    println!("Value is a comma separated list.");
    println!("To finish, leave the key or value blank and press enter.");

    let mut filter = TagFilter::default();
    loop {
        let key = prompt_line("Key: ")?;
        if key.is_empty() {
            return Ok(filter);
        }
        let value = prompt_line("Value: ")?;
        if value.is_empty() {
            return Ok(filter);
        }
        let values = value
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        filter.insert(key, values);
    }
}

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{prompt}");
    std::io::stdout().flush().context("Failed to flush stdout")?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("Failed to read input")?;
    Ok(line.trim().to_string())
}

/// Read resource names from a list file.
///
/// CSV files must carry a `resource_names` header; each row yields one name
/// and an empty cell is a hard failure. Files without the header are treated
/// as plain lists, one name per line.
pub fn read_resource_names(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read list file {}", path.display()))?;

    let mut reader = csv::Reader::from_reader(content.as_bytes());
    let column = match reader.headers() {
        Ok(headers) => headers.iter().position(|h| h.trim() == RESOURCE_NAMES_COLUMN),
        Err(_) => None,
    };

    match column {
        Some(idx) => {
            let mut names = Vec::new();
            for (row, record) in reader.records().enumerate() {
                let record = record.with_context(|| {
                    format!("Malformed row {} in {}", row + 2, path.display())
                })?;
                let name = record.get(idx).map(str::trim).unwrap_or_default();
                if name.is_empty() {
                    bail!(
                        "Malformed row {} in {}: empty '{}' value",
                        row + 2,
                        path.display(),
                        RESOURCE_NAMES_COLUMN
                    );
                }
                names.push(name.to_string());
            }
            Ok(names)
        }
        None => Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()),
    }
}
