//! Query engine: text query → embedding → ranked, filtered results.
//!
//! The engine owns the embedder, the flat index, and the loaded metadata
//! sequence. It is a pure reader: queries never mutate the pair, so a
//! service front may run any number of searches concurrently. Replacing a
//! rebuilt index means swapping the whole engine, which keeps the
//! index/metadata alignment atomic for readers.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::index::FlatIndex;
use crate::meta::{self, MetadataRecord};
use crate::normalize::l2_normalize;

/// Retrieval breadth multiplier for category-filtered queries. Filtering
/// happens after ranking, so an exact top-k fetch could come up short
/// even when enough matches exist; a fixed 5x overshoot compensates.
/// There is deliberately no retry with a larger breadth when the filtered
/// list is still short.
pub const OVERSAMPLE_FACTOR: usize = 5;

/// Upper bound accepted for `top_k`.
pub const MAX_TOP_K: usize = 100;

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Asset path relative to the indexed root.
    pub path: String,
    /// Inner product with the query embedding (cosine similarity).
    pub score: f32,
    /// Category of the matched asset.
    pub category: String,
}

/// Search engine over a persisted index/metadata pair.
pub struct SearchEngine<E: Embedder> {
    embedder: E,
    index: FlatIndex,
    metadata: Vec<MetadataRecord>,
}

impl<E: Embedder> SearchEngine<E> {
    /// Assemble an engine from already-loaded parts.
    pub fn new(embedder: E, index: FlatIndex, metadata: Vec<MetadataRecord>) -> Self {
        if index.len() != metadata.len() {
            warn!(
                index_len = index.len(),
                metadata_len = metadata.len(),
                "index and metadata sizes differ; out-of-range hits will be skipped"
            );
        }
        Self {
            embedder,
            index,
            metadata,
        }
    }

    /// Load the persisted index and metadata from disk.
    ///
    /// # Errors
    ///
    /// Missing files are [`Error::Config`]: fatal, reported before any
    /// query work starts.
    pub fn open(embedder: E, index_path: &Path, metadata_path: &Path) -> Result<Self> {
        if !index_path.exists() {
            return Err(Error::Config(format!(
                "index file not found: {}",
                index_path.display()
            )));
        }
        if !metadata_path.exists() {
            return Err(Error::Config(format!(
                "metadata file not found: {}",
                metadata_path.display()
            )));
        }
        let index = FlatIndex::load(index_path)?;
        let metadata = meta::load_metadata(metadata_path)?;
        Ok(Self::new(embedder, index, metadata))
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Access to the underlying embedder (model name, device, ...).
    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    /// Search for the `top_k` images most similar to `query`, optionally
    /// restricted to one category (case-insensitive exact match).
    ///
    /// Returns at most `top_k` results in non-increasing score order. A
    /// filtered search that finds fewer survivors than `top_k` even after
    /// oversampling returns the shorter list; that is not an error.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty query or `top_k` outside
    /// `[1, 100]`.
    pub fn search(
        &self,
        query: &str,
        top_k: usize,
        category_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("query must not be empty".to_string()));
        }
        if top_k < 1 || top_k > MAX_TOP_K {
            return Err(Error::Validation(format!(
                "top_k must be between 1 and {MAX_TOP_K}, got {top_k}"
            )));
        }

        let embedding = l2_normalize(self.embedder.embed_text(query)?);

        let search_k = match category_filter {
            Some(_) => (top_k * OVERSAMPLE_FACTOR).min(self.index.len()),
            None => top_k.min(self.index.len()),
        };
        debug!(query, top_k, search_k, ?category_filter, "running search");

        let (scores, ids) = self.index.search(&[embedding], search_k)?;

        let mut results = Vec::with_capacity(top_k);
        for (&score, &id) in scores[0].iter().zip(&ids[0]) {
            // An index holding fewer vectors than search_k pads with a
            // negative sentinel; a stale metadata file can also leave ids
            // past the end. Both count as "no match".
            if id < 0 || id as usize >= self.metadata.len() {
                continue;
            }
            let record = &self.metadata[id as usize];
            if let Some(filter) = category_filter {
                if !record.category.eq_ignore_ascii_case(filter) {
                    continue;
                }
            }
            results.push(SearchResult {
                path: record.path.clone(),
                score,
                category: record.category.clone(),
            });
            if results.len() >= top_k {
                break;
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::stub::StubEmbedder;

    /// Engine over `n` two-dimensional vectors whose similarity to the
    /// probe vector decreases with id, so rank order equals id order.
    fn ranked_engine(categories: Vec<&str>) -> SearchEngine<ProbeEmbedder> {
        let n = categories.len();
        let mut index = FlatIndex::new(2);
        let vectors: Vec<Vec<f32>> = (0..n)
            .map(|i| l2_normalize(vec![1.0, i as f32 * 0.05]))
            .collect();
        index.add(&vectors).unwrap();
        let metadata = categories
            .into_iter()
            .enumerate()
            .map(|(i, category)| MetadataRecord {
                id: i as i64,
                path: format!("{category}/icon_{i:02}.png"),
                category: category.to_string(),
            })
            .collect();
        SearchEngine::new(ProbeEmbedder, index, metadata)
    }

    /// Embeds every query as the fixed probe direction `[1, 0]`.
    struct ProbeEmbedder;

    impl Embedder for ProbeEmbedder {
        fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            texts.iter().map(|t| self.embed_text(t)).collect()
        }
        fn embed_image(&self, _image: &image::DynamicImage) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }
        fn embed_images(&self, images: &[image::DynamicImage]) -> Result<Vec<Vec<f32>>> {
            images.iter().map(|i| self.embed_image(i)).collect()
        }
        fn dimension(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "probe"
        }
    }

    #[test]
    fn unfiltered_search_returns_exactly_top_k() {
        let engine = ranked_engine(vec!["icons"; 10]);
        let results = engine.search("anything", 4, None).unwrap();
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn scores_are_non_increasing() {
        let engine = ranked_engine(vec!["icons"; 10]);
        let results = engine.search("anything", 10, None).unwrap();
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn result_count_never_exceeds_top_k() {
        let engine = ranked_engine(vec!["icons"; 3]);
        let results = engine.search("anything", 100, None).unwrap();
        assert_eq!(results.len(), 3);
    }

    #[test]
    fn oversampling_fills_filtered_top_k() {
        // 5 non-matching ranks ahead of 15 in-category matches; a plain
        // top-3 fetch would see none of them, 5x oversampling sees 10.
        let mut categories = vec!["weapons"; 5];
        categories.extend(vec!["spells"; 15]);
        let engine = ranked_engine(categories);

        let results = engine.search("anything", 3, Some("spells")).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.category == "spells"));
    }

    #[test]
    fn category_filter_is_case_insensitive() {
        let engine = ranked_engine(vec!["SkillsIcons"; 5]);
        let results = engine.search("anything", 2, Some("skillsicons")).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn short_filtered_list_is_not_an_error() {
        // Only two in-category vectors exist in the sampled range.
        let mut categories = vec!["weapons"; 8];
        categories.extend(vec!["spells"; 2]);
        let engine = ranked_engine(categories);

        let results = engine.search("anything", 5, Some("spells")).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn top_k_zero_is_rejected() {
        let engine = ranked_engine(vec!["icons"; 3]);
        assert!(matches!(
            engine.search("anything", 0, None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn top_k_above_cap_is_rejected() {
        let engine = ranked_engine(vec!["icons"; 3]);
        assert!(matches!(
            engine.search("anything", 101, None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn blank_query_is_rejected() {
        let engine = ranked_engine(vec!["icons"; 3]);
        assert!(matches!(
            engine.search("   \t ", 5, None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn search_on_empty_index_returns_nothing() {
        let engine = SearchEngine::new(ProbeEmbedder, FlatIndex::new(2), Vec::new());
        let results = engine.search("anything", 5, None).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn stub_embedder_is_deterministic() {
        let stub = StubEmbedder::new();
        let a = stub.embed_text("fire sword").unwrap();
        let b = stub.embed_text("fire sword").unwrap();
        assert_eq!(a, b);
    }
}
