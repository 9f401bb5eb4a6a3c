//! Metadata store: the JSONL companion of the vector index.
//!
//! One record per line, fields `{id, path, category}`. Record `i` in the
//! loaded (sorted) sequence describes the vector at index id `i` — this
//! positional pairing is the central correctness contract of the whole
//! system, so the loader enforces it instead of trusting write order:
//! records are re-sorted by id after reading, and duplicate or
//! non-contiguous ids are rejected outright rather than silently
//! corrupting every subsequent search.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Metadata for one indexed asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Vector id inside the index, assigned in insertion order from 0.
    pub id: i64,
    /// Asset path relative to the asset root.
    pub path: String,
    /// Category derived from the asset's top-level folder.
    pub category: String,
}

/// Write metadata as newline-delimited JSON, one record per line.
pub fn save_metadata(path: &Path, records: &[MetadataRecord]) -> Result<()> {
    let file = fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Load metadata from a JSONL file.
///
/// Blank lines are skipped. Records are re-sorted by id; after sorting,
/// `records[i].id == i` must hold for every record.
///
/// # Errors
///
/// Returns [`Error::Metadata`] on malformed lines, duplicate ids, or
/// non-contiguous ids.
pub fn load_metadata(path: &Path) -> Result<Vec<MetadataRecord>> {
    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: MetadataRecord = serde_json::from_str(line).map_err(|e| {
            Error::Metadata(format!("line {}: {}", line_no + 1, e))
        })?;
        records.push(record);
    }

    records.sort_by_key(|r| r.id);
    for (i, record) in records.iter().enumerate() {
        let expected = i as i64;
        if record.id != expected {
            return Err(Error::Metadata(if i > 0 && records[i - 1].id == record.id {
                format!("duplicate id {}", record.id)
            } else {
                format!("ids are not contiguous: expected {expected}, found {}", record.id)
            }));
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn record(id: i64, path: &str, category: &str) -> MetadataRecord {
        MetadataRecord {
            id,
            path: path.to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn roundtrip_preserves_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.jsonl");
        let records = vec![
            record(0, "a/one.png", "a"),
            record(1, "b/two.png", "b"),
        ];
        save_metadata(&path, &records).unwrap();
        assert_eq!(load_metadata(&path).unwrap(), records);
    }

    #[test]
    fn loader_resorts_by_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.jsonl");
        fs::write(
            &path,
            "{\"id\":1,\"path\":\"b.png\",\"category\":\"x\"}\n\
             \n\
             {\"id\":0,\"path\":\"a.png\",\"category\":\"x\"}\n",
        )
        .unwrap();

        let records = load_metadata(&path).unwrap();
        assert_eq!(records[0].id, 0);
        assert_eq!(records[1].id, 1);
        assert_eq!(records[0].path, "a.png");
    }

    #[test]
    fn loader_rejects_duplicate_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.jsonl");
        fs::write(
            &path,
            "{\"id\":0,\"path\":\"a.png\",\"category\":\"x\"}\n\
             {\"id\":0,\"path\":\"b.png\",\"category\":\"x\"}\n",
        )
        .unwrap();

        assert!(matches!(load_metadata(&path), Err(Error::Metadata(_))));
    }

    #[test]
    fn loader_rejects_gaps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.jsonl");
        fs::write(
            &path,
            "{\"id\":0,\"path\":\"a.png\",\"category\":\"x\"}\n\
             {\"id\":2,\"path\":\"c.png\",\"category\":\"x\"}\n",
        )
        .unwrap();

        assert!(matches!(load_metadata(&path), Err(Error::Metadata(_))));
    }

    #[test]
    fn loader_rejects_malformed_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metadata.jsonl");
        fs::write(&path, "not json\n").unwrap();
        assert!(matches!(load_metadata(&path), Err(Error::Metadata(_))));
    }
}
