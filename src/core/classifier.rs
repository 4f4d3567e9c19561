//! Nearest-label classification of screen and text embeddings.

use crate::core::embedding::{Embedding, EmbeddingError};
use crate::core::labels::LabelTable;
use crate::core::session::{KeySummary, TextMatch};
use crate::sensing::embedder::{EmbedError, Embedder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TOP_K_APPS: usize = 3;
pub const DEFAULT_TOP_K_TEXT: usize = 5;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("embedding does not match label table: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("embedding text failed: {0}")]
    Embed(#[from] EmbedError),
    #[error("text embedder returned no vector")]
    MissingTextVector,
}

/// Scores reported alongside a visual classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// Similarity of the screen to the chosen app label
    pub app: f32,
    /// Similarity of the screen to the chosen action label, before priors
    pub action_raw: f32,
    /// Accumulated prior-boosted score of the chosen action
    pub action_boost: f32,
}

/// Result of classifying one screen embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualClassification {
    pub app: String,
    pub action: String,
    pub confidence: Confidence,
}

/// Scores embeddings against a [`LabelTable`].
#[derive(Debug, Clone)]
pub struct Classifier {
    table: LabelTable,
    top_k_apps: usize,
    top_k_text: usize,
}

impl Classifier {
    /// Classifier with the default top-k settings.
    pub fn new(table: LabelTable) -> Self {
        Self {
            table,
            top_k_apps: DEFAULT_TOP_K_APPS,
            top_k_text: DEFAULT_TOP_K_TEXT,
        }
    }

    /// Override how many apps and text labels are ranked. Zero counts as one.
    pub fn with_top_k(mut self, apps: usize, text: usize) -> Self {
        self.top_k_apps = apps.max(1);
        self.top_k_text = text.max(1);
        self
    }

    /// The label table scores are computed against.
    pub fn table(&self) -> &LabelTable {
        &self.table
    }

    /// Similarity of `embedding` to every app label, in vocabulary order.
    pub fn app_scores(&self, embedding: &Embedding) -> Result<Vec<f32>, ClassifyError> {
        scores(&self.table.app_vecs, embedding)
    }

    /// Similarity of `embedding` to every action label, in vocabulary order.
    pub fn action_scores(&self, embedding: &Embedding) -> Result<Vec<f32>, ClassifyError> {
        scores(&self.table.action_vecs, embedding)
    }

    /// Action scores with the priors of the app at `app_index` applied.
    pub fn boosted_action_scores(&self, app_index: usize, action_scores: &[f32]) -> Vec<f32> {
        match self.table.priors_for(app_index) {
            Some(weights) => action_scores
                .iter()
                .zip(weights)
                .map(|(score, weight)| score * weight)
                .collect(),
            None => action_scores.to_vec(),
        }
    }

    /// Pick the best (app, action) pair for a screen embedding.
    ///
    /// The top-k apps each contribute their prior-boosted action scores,
    /// weighted by their own similarity. Ties go to the lowest label index.
    pub fn classify_visual(
        &self,
        embedding: &Embedding,
    ) -> Result<VisualClassification, ClassifyError> {
        let app_scores = self.app_scores(embedding)?;
        let action_scores = self.action_scores(embedding)?;

        let top_apps = top_k_indices(&app_scores, self.top_k_apps);
        let mut accumulated = vec![0.0f32; action_scores.len()];
        for &app_idx in &top_apps {
            let weight = app_scores[app_idx];
            let boosted = self.boosted_action_scores(app_idx, &action_scores);
            for (acc, score) in accumulated.iter_mut().zip(boosted) {
                *acc += weight * score;
            }
        }

        // Vocabularies are validated non-empty when the table is built.
        let best_app = top_apps[0];
        let best_action = argmax(&accumulated);

        Ok(VisualClassification {
            app: self.table.apps[best_app].clone(),
            action: self.table.actions[best_action].clone(),
            confidence: Confidence {
                app: app_scores[best_app],
                action_raw: action_scores[best_action],
                action_boost: accumulated[best_action],
            },
        })
    }

    /// Rank free-text labels against the reconstructed `text`.
    ///
    /// Whitespace-only text and an empty free-text vocabulary yield a
    /// summary without labels and no embedder call.
    pub fn classify_text(
        &self,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<KeySummary, ClassifyError> {
        let mut summary = KeySummary::plain(text);
        if text.trim().is_empty() || self.table.text_vecs.is_empty() {
            return Ok(summary);
        }

        let embedding = embedder
            .embed_text(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or(ClassifyError::MissingTextVector)?;
        let sims = scores(&self.table.text_vecs, &embedding)?;

        summary.top_k = top_k_indices(&sims, self.top_k_text)
            .into_iter()
            .enumerate()
            .map(|(rank, idx)| {
                let label = &self.table.text_labels[idx];
                TextMatch {
                    rank: rank + 1,
                    label: label.label.clone(),
                    category: label.category.clone(),
                    similarity: sims[idx],
                }
            })
            .collect();
        summary.best_label = summary.top_k.first().cloned();
        Ok(summary)
    }
}

fn scores(table: &[Embedding], embedding: &Embedding) -> Result<Vec<f32>, ClassifyError> {
    table
        .iter()
        .map(|label| label.dot(embedding).map_err(ClassifyError::from))
        .collect()
}

/// Indices of the `k` highest scores, best first, lower index winning ties.
fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    indices.truncate(k.max(1));
    indices
}

fn argmax(scores: &[f32]) -> usize {
    let mut best = 0;
    for (i, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::labels::LabelConfig;
    use image::RgbImage;
    use std::collections::HashMap;

    /// Maps each known string to a fixed vector.
    struct TableEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl Embedder for TableEmbedder {
        fn dim(&self) -> usize {
            3
        }

        fn embed_image(&self, _image: &RgbImage) -> Result<Embedding, EmbedError> {
            Err(EmbedError::Model("images not supported".into()))
        }

        fn embed_text(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedError> {
            texts
                .iter()
                .map(|t| {
                    let v = self
                        .vectors
                        .get(t)
                        .cloned()
                        .ok_or_else(|| EmbedError::Model(format!("unknown text {t}")))?;
                    Ok(Embedding::normalized(v)?)
                })
                .collect()
        }
    }

    fn embedder() -> TableEmbedder {
        let vectors = [
            ("browser", vec![1.0, 0.0, 0.0]),
            ("editor", vec![0.0, 1.0, 0.0]),
            ("terminal", vec![0.0, 0.7, 0.7]),
            ("reading", vec![1.0, 0.2, 0.0]),
            ("coding", vec![0.0, 1.0, 0.3]),
            ("greeting", vec![1.0, 1.0, 0.0]),
            ("bug fix", vec![0.0, 1.0, 1.0]),
            ("hello there", vec![1.0, 0.9, 0.0]),
        ];
        TableEmbedder {
            vectors: vectors
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    fn classifier(priors: &str) -> Classifier {
        let json = format!(
            r#"{{
                "apps": ["browser", "editor", "terminal"],
                "actions": ["reading", "coding"],
                "action_priors": {priors},
                "text_labels": {{ "chat": ["greeting"], "work": ["bug fix"] }}
            }}"#
        );
        let config = LabelConfig::from_json(&json).unwrap();
        Classifier::new(LabelTable::build(&config, &embedder()).unwrap())
    }

    fn unit(v: &[f32]) -> Embedding {
        Embedding::normalized(v.to_vec()).unwrap()
    }

    #[test]
    fn test_app_confidence_matches_label_dot_product() {
        let classifier = classifier("{}");
        let v = unit(&[0.2, 0.9, 0.1]);
        let result = classifier.classify_visual(&v).unwrap();

        let index = classifier
            .table()
            .apps()
            .iter()
            .position(|a| *a == result.app)
            .unwrap();
        let expected = classifier.table().app_embedding(index).unwrap().dot(&v).unwrap();
        assert!((result.confidence.app - expected).abs() < 1e-6);
        assert_eq!(result.app, "editor");
        assert_eq!(result.action, "coding");
    }

    #[test]
    fn test_no_priors_falls_back_to_raw_scores() {
        let classifier = classifier(r#"{"browser": {"reading": 3.0}}"#);
        let v = unit(&[0.1, 1.0, 0.2]);
        let raw = classifier.action_scores(&v).unwrap();

        // "editor" (index 1) has no priors configured.
        assert_eq!(classifier.boosted_action_scores(1, &raw), raw);
        // "browser" does.
        assert_ne!(classifier.boosted_action_scores(0, &raw), raw);

        let single = classifier.clone().with_top_k(1, 5);
        let result = single.classify_visual(&v).unwrap();
        assert_eq!(result.app, "editor");
        let expected = result.confidence.app * result.confidence.action_raw;
        assert!((result.confidence.action_boost - expected).abs() < 1e-6);
    }

    #[test]
    fn test_priors_can_flip_the_action() {
        let v = unit(&[0.6, 0.8, 0.0]);
        let plain = classifier("{}").with_top_k(1, 5);
        assert_eq!(plain.classify_visual(&v).unwrap().action, "coding");

        let boosted = classifier(r#"{"editor": {"reading": 5.0}}"#).with_top_k(1, 5);
        let result = boosted.classify_visual(&v).unwrap();
        assert_eq!(result.app, "editor");
        assert_eq!(result.action, "reading");
        assert!(result.confidence.action_boost > result.confidence.action_raw);
    }

    #[test]
    fn test_ties_resolve_to_lowest_index() {
        assert_eq!(top_k_indices(&[0.5, 0.9, 0.9, 0.1], 2), vec![1, 2]);
        assert_eq!(argmax(&[0.3, 0.3, 0.3]), 0);
        assert_eq!(top_k_indices(&[0.1, 0.2], 10), vec![1, 0]);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let classifier = classifier("{}");
        let v = unit(&[1.0, 0.0]);
        assert!(matches!(
            classifier.classify_visual(&v),
            Err(ClassifyError::Embedding(_))
        ));
    }

    #[test]
    fn test_text_classification_ranks_labels() {
        let classifier = classifier("{}");
        let summary = classifier.classify_text("hello there", &embedder()).unwrap();

        assert_eq!(summary.plain_text, "hello there");
        assert_eq!(summary.top_k.len(), 2);
        let best = summary.best_label.unwrap();
        assert_eq!(best.label, "greeting");
        assert_eq!(best.category, "chat");
        assert_eq!(best.rank, 1);
        assert!(summary.top_k[0].similarity >= summary.top_k[1].similarity);
    }

    #[test]
    fn test_text_tie_goes_to_the_label_listed_first() {
        let vectors = [
            ("browser", vec![1.0, 0.0, 0.0]),
            ("reading", vec![1.0, 0.0, 0.0]),
            ("first_in_file", vec![0.0, 1.0, 0.0]),
            ("second_in_file", vec![0.0, 1.0, 0.0]),
            ("hello", vec![0.0, 1.0, 0.2]),
        ];
        let embedder = TableEmbedder {
            vectors: vectors
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        let config = LabelConfig::from_json(
            r#"{
                "apps": ["browser"],
                "actions": ["reading"],
                "text_labels": { "zeta": ["first_in_file"], "alpha": ["second_in_file"] }
            }"#,
        )
        .unwrap();
        let classifier = Classifier::new(LabelTable::build(&config, &embedder).unwrap());

        let summary = classifier.classify_text("hello", &embedder).unwrap();
        let best = summary.best_label.unwrap();
        assert_eq!(best.label, "first_in_file");
        assert_eq!(best.category, "zeta");
        assert_eq!(summary.top_k[1].label, "second_in_file");
        assert_eq!(summary.top_k[0].similarity, summary.top_k[1].similarity);
    }

    #[test]
    fn test_blank_text_skips_embedding() {
        let classifier = classifier("{}");
        // The table embedder would fail on unknown text, so success proves no call.
        let summary = classifier.classify_text(" \n", &embedder()).unwrap();
        assert!(summary.best_label.is_none());
        assert!(summary.top_k.is_empty());
    }
}
