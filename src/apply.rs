//! Batch-apply pipeline: resolve an image for every spell record.
//!
//! Reads a directory of spell JSON files, derives a query string per
//! record, embeds all queries in fixed-size batches, runs one bulk top-1
//! search, and writes the matched path into each record's `image` field.
//! Re-running against unchanged inputs produces identical assignments.
//! Dry-run computes and reports the same counts without touching a file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::index::FlatIndex;
use crate::meta::MetadataRecord;
use crate::normalize::l2_normalize;

/// Queries embedded per model call.
const QUERY_BATCH_SIZE: usize = 64;

/// A spell definition as stored on disk. Only the fields the pipeline
/// reads or writes are modeled explicitly; everything else passes through
/// `extra` untouched so a rewrite never loses data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellRecord {
    /// Short visual description, the preferred query source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visualdescription: Option<String>,

    /// Untranslated name, second choice for the query.
    #[serde(rename = "originalName", default, skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,

    /// Display name, last resort for the query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Resolved image path; written by the pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// All remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SpellRecord {
    /// Query derivation: `visualdescription` → `originalName` → `name` →
    /// empty string. Empty strings fall through the chain.
    pub fn search_query(&self) -> &str {
        [&self.visualdescription, &self.original_name, &self.name]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }
}

/// Outcome counts of one apply run.
#[derive(Debug, PartialEq, Eq)]
pub struct ApplyReport {
    /// Spell files found under the directory.
    pub total: usize,
    /// Records that received an image assignment.
    pub updated: usize,
    /// Records skipped because of a parse failure or an out-of-range hit.
    pub errors: usize,
}

/// Resolve and write an image path for every spell under `spells_dir`.
///
/// A record that fails to parse is counted as an error and skipped; the
/// rest of the batch is unaffected. A record whose whole fallback chain
/// is empty still gets its empty query embedded and matched like any
/// other. With `dry_run` set, no file is
/// rewritten but the counts are computed exactly as if writes had
/// occurred.
///
/// # Errors
///
/// Returns [`Error::Config`] when `spells_dir` does not exist; per-record
/// failures never abort the run.
pub fn apply_images<E: Embedder>(
    embedder: &E,
    index: &FlatIndex,
    metadata: &[MetadataRecord],
    spells_dir: &Path,
    dry_run: bool,
) -> Result<ApplyReport> {
    if !spells_dir.is_dir() {
        return Err(Error::Config(format!(
            "spells directory not found: {}",
            spells_dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = fs::read_dir(spells_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    let total = files.len();
    info!(total, dir = %spells_dir.display(), "loading spell files");

    let mut errors = 0usize;
    let mut spells: Vec<(PathBuf, SpellRecord)> = Vec::with_capacity(total);
    for file in files {
        match fs::read_to_string(&file).map_err(Error::from).and_then(|content| {
            serde_json::from_str::<SpellRecord>(&content).map_err(Error::from)
        }) {
            Ok(spell) => spells.push((file, spell)),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "failed to load spell record");
                errors += 1;
            }
        }
    }

    // Bulk embedding in fixed-size batches, then a single top-1 search
    // whose result rows are positionally aligned with the record order.
    let queries: Vec<String> = spells
        .iter()
        .map(|(_, spell)| spell.search_query().to_string())
        .collect();
    let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(queries.len());
    for chunk in queries.chunks(QUERY_BATCH_SIZE) {
        for vector in embedder.embed_texts(chunk)? {
            embeddings.push(l2_normalize(vector));
        }
    }

    let (_, ids) = index.search(&embeddings, 1)?;

    let mut updated = 0usize;
    for ((file, mut spell), row) in spells.into_iter().zip(&ids) {
        let id = row[0];
        if id >= 0 && (id as usize) < metadata.len() {
            spell.image = Some(metadata[id as usize].path.clone());
            if !dry_run {
                fs::write(&file, serde_json::to_string_pretty(&spell)?)?;
            }
            updated += 1;
        } else {
            warn!(file = %file.display(), "no index match for record");
            errors += 1;
        }
    }

    info!(total, updated, errors, dry_run, "apply complete");
    Ok(ApplyReport {
        total,
        updated,
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::stub::StubEmbedder;
    use serde_json::json;
    use tempfile::tempdir;

    fn fixture_index(embedder: &StubEmbedder, paths: &[&str]) -> (FlatIndex, Vec<MetadataRecord>) {
        let mut index = FlatIndex::new(embedder.dimension());
        let vectors: Vec<Vec<f32>> = paths
            .iter()
            .map(|p| embedder.embed_text(p).unwrap())
            .collect();
        index.add(&vectors).unwrap();
        let metadata = paths
            .iter()
            .enumerate()
            .map(|(i, p)| MetadataRecord {
                id: i as i64,
                path: p.to_string(),
                category: "spells".to_string(),
            })
            .collect();
        (index, metadata)
    }

    fn write_spell(dir: &Path, name: &str, body: Value) {
        fs::write(dir.join(name), serde_json::to_string_pretty(&body).unwrap()).unwrap();
    }

    #[test]
    fn query_fallback_chain() {
        let spell: SpellRecord = serde_json::from_value(json!({
            "visualdescription": "ball of fire",
            "originalName": "Bola de fuego",
            "name": "Fireball"
        }))
        .unwrap();
        assert_eq!(spell.search_query(), "ball of fire");

        let spell: SpellRecord = serde_json::from_value(json!({
            "visualdescription": "",
            "originalName": "Bola de fuego"
        }))
        .unwrap();
        assert_eq!(spell.search_query(), "Bola de fuego");

        let spell: SpellRecord = serde_json::from_value(json!({"name": "Fireball"})).unwrap();
        assert_eq!(spell.search_query(), "Fireball");

        let spell: SpellRecord = serde_json::from_value(json!({})).unwrap();
        assert_eq!(spell.search_query(), "");
    }

    #[test]
    fn apply_sets_image_on_every_record() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder::new();
        let (index, metadata) = fixture_index(&embedder, &["icons/a.png", "icons/b.png"]);
        write_spell(dir.path(), "one.json", json!({"name": "Fireball", "level": 3}));
        write_spell(dir.path(), "two.json", json!({"name": "Frost Ray"}));

        let report = apply_images(&embedder, &index, &metadata, dir.path(), false).unwrap();
        assert_eq!(report, ApplyReport { total: 2, updated: 2, errors: 0 });

        let spell: SpellRecord =
            serde_json::from_str(&fs::read_to_string(dir.path().join("one.json")).unwrap())
                .unwrap();
        assert!(spell.image.is_some());
        // Unknown fields survive the rewrite.
        assert_eq!(spell.extra.get("level"), Some(&json!(3)));
    }

    #[test]
    fn unparseable_record_is_isolated() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder::new();
        let (index, metadata) = fixture_index(&embedder, &["icons/a.png"]);
        write_spell(dir.path(), "good.json", json!({"name": "Fireball"}));
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let report = apply_images(&embedder, &index, &metadata, dir.path(), false).unwrap();
        assert_eq!(report, ApplyReport { total: 2, updated: 1, errors: 1 });
    }

    #[test]
    fn record_without_query_text_is_still_matched() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder::new();
        let (index, metadata) = fixture_index(&embedder, &["icons/a.png"]);
        write_spell(dir.path(), "blank.json", json!({"visualdescription": "", "cost": 5}));

        // The fallback chain bottoms out at the empty string, which is
        // embedded and matched like any other query.
        let report = apply_images(&embedder, &index, &metadata, dir.path(), false).unwrap();
        assert_eq!(report, ApplyReport { total: 1, updated: 1, errors: 0 });

        let blank: SpellRecord =
            serde_json::from_str(&fs::read_to_string(dir.path().join("blank.json")).unwrap())
                .unwrap();
        assert_eq!(blank.image.as_deref(), Some("icons/a.png"));
        assert_eq!(blank.extra.get("cost"), Some(&json!(5)));
    }

    #[test]
    fn empty_index_counts_errors() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder::new();
        let index = FlatIndex::new(embedder.dimension());
        write_spell(dir.path(), "one.json", json!({"name": "Fireball"}));

        let report = apply_images(&embedder, &index, &[], dir.path(), false).unwrap();
        assert_eq!(report, ApplyReport { total: 1, updated: 0, errors: 1 });
    }

    #[test]
    fn dry_run_reports_same_counts_without_writing() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder::new();
        let (index, metadata) = fixture_index(&embedder, &["icons/a.png"]);
        write_spell(dir.path(), "one.json", json!({"name": "Fireball"}));
        let before = fs::read_to_string(dir.path().join("one.json")).unwrap();

        let dry = apply_images(&embedder, &index, &metadata, dir.path(), true).unwrap();
        let after_dry = fs::read_to_string(dir.path().join("one.json")).unwrap();
        assert_eq!(before, after_dry);

        let wet = apply_images(&embedder, &index, &metadata, dir.path(), false).unwrap();
        assert_eq!(dry.updated, wet.updated);
        assert_eq!(dry.errors, wet.errors);
    }

    #[test]
    fn apply_is_idempotent() {
        let dir = tempdir().unwrap();
        let embedder = StubEmbedder::new();
        let (index, metadata) = fixture_index(&embedder, &["icons/a.png", "icons/b.png"]);
        write_spell(dir.path(), "one.json", json!({"name": "Fireball"}));

        apply_images(&embedder, &index, &metadata, dir.path(), false).unwrap();
        let first = fs::read_to_string(dir.path().join("one.json")).unwrap();
        apply_images(&embedder, &index, &metadata, dir.path(), false).unwrap();
        let second = fs::read_to_string(dir.path().join("one.json")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_directory_is_a_config_error() {
        let embedder = StubEmbedder::new();
        let index = FlatIndex::new(embedder.dimension());
        let result = apply_images(&embedder, &index, &[], Path::new("/no/such/dir"), false);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
