//! Label vocabulary and its precomputed embedding table.
//!
//! The vocabulary is read once from a JSON file:
//!
//! ```json
//! {
//!   "apps": ["web browser", "code editor"],
//!   "actions": ["reading", "typing code"],
//!   "action_priors": { "code editor": { "typing code": 1.5 } },
//!   "text_labels": { "programming": ["rust code", "shell command"] }
//! }
//! ```

use crate::core::embedding::Embedding;
use crate::sensing::embedder::{EmbedError, Embedder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Starter vocabulary written by `screen-logger labels --init`.
pub const STARTER_LABELS: &str = r#"{
  "apps": [
    "web browser",
    "code editor",
    "terminal",
    "chat app",
    "email client",
    "document editor",
    "spreadsheet",
    "video player"
  ],
  "actions": [
    "reading",
    "writing text",
    "writing code",
    "running commands",
    "messaging",
    "watching video",
    "editing data"
  ],
  "action_priors": {
    "code editor": { "writing code": 1.5, "reading": 1.1 },
    "terminal": { "running commands": 1.5 },
    "chat app": { "messaging": 1.5 },
    "spreadsheet": { "editing data": 1.5 },
    "video player": { "watching video": 2.0 }
  },
  "text_labels": {
    "communication": ["greeting", "question", "status update"],
    "programming": ["source code", "shell command", "search query"],
    "writing": ["note taking", "email draft"]
  }
}
"#;

/// Errors loading the vocabulary or building the table. Fatal at startup.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("failed to read label file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse label file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("label vocabulary '{0}' is empty")]
    EmptyVocabulary(&'static str),
    #[error("duplicate label '{label}' in {vocabulary}")]
    Duplicate {
        vocabulary: &'static str,
        label: String,
    },
    #[error("prior weight for {app}/{action} must be finite and non-negative, got {weight}")]
    BadPrior {
        app: String,
        action: String,
        weight: f32,
    },
    #[error("embedder returned {actual} vectors for {expected} labels")]
    CountMismatch { expected: usize, actual: usize },
    #[error("label '{label}' embedded to {actual} dimensions, embedder declares {expected}")]
    DimensionMismatch {
        label: String,
        expected: usize,
        actual: usize,
    },
    #[error("embedding labels failed: {0}")]
    Embed(#[from] EmbedError),
}

/// Static label configuration as stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabelConfig {
    /// Application vocabulary
    pub apps: Vec<String>,
    /// Action vocabulary
    pub actions: Vec<String>,
    /// Per-application multiplicative weights over actions
    #[serde(default)]
    pub action_priors: HashMap<String, HashMap<String, f32>>,
    /// Free-text labels grouped by category, in file order
    #[serde(default, with = "in_file_order")]
    pub text_labels: Vec<(String, Vec<String>)>,
}

/// Categories keep the order they have in the file, so label indices do too.
mod in_file_order {
    use serde::de::{Error as _, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S: Serializer>(
        categories: &[(String, Vec<String>)],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(categories.len()))?;
        for (category, labels) in categories {
            map.serialize_entry(category, labels)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<(String, Vec<String>)>, D::Error> {
        deserializer.deserialize_map(CategoryVisitor)
    }

    struct CategoryVisitor;

    impl<'de> Visitor<'de> for CategoryVisitor {
        type Value = Vec<(String, Vec<String>)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map from category to a list of labels")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut categories: Self::Value = Vec::new();
            while let Some((category, labels)) = access.next_entry::<String, Vec<String>>()? {
                if categories.iter().any(|(seen, _)| *seen == category) {
                    return Err(A::Error::custom(format!("duplicate category '{category}'")));
                }
                categories.push((category, labels));
            }
            Ok(categories)
        }
    }
}

impl LabelConfig {
    /// Read and validate a label file.
    pub fn load(path: &Path) -> Result<Self, LabelError> {
        let content = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate a label document.
    pub fn from_json(content: &str) -> Result<Self, LabelError> {
        let config: LabelConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the vocabularies are non-empty, unique and the priors sane.
    pub fn validate(&self) -> Result<(), LabelError> {
        if self.apps.is_empty() {
            return Err(LabelError::EmptyVocabulary("apps"));
        }
        if self.actions.is_empty() {
            return Err(LabelError::EmptyVocabulary("actions"));
        }
        check_unique("apps", &self.apps)?;
        check_unique("actions", &self.actions)?;

        for (app, priors) in &self.action_priors {
            for (action, &weight) in priors {
                if !weight.is_finite() || weight < 0.0 {
                    return Err(LabelError::BadPrior {
                        app: app.clone(),
                        action: action.clone(),
                        weight,
                    });
                }
            }
        }
        Ok(())
    }

    /// Free-text labels flattened in file order, each paired with its category.
    pub fn flat_text_labels(&self) -> Vec<(String, String)> {
        self.text_labels
            .iter()
            .flat_map(|(category, labels)| {
                labels
                    .iter()
                    .map(move |label| (label.clone(), category.clone()))
            })
            .collect()
    }
}

fn check_unique(vocabulary: &'static str, labels: &[String]) -> Result<(), LabelError> {
    let mut seen = std::collections::HashSet::new();
    for label in labels {
        if !seen.insert(label.as_str()) {
            return Err(LabelError::Duplicate {
                vocabulary,
                label: label.clone(),
            });
        }
    }
    Ok(())
}

/// A free-text label with its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLabel {
    pub label: String,
    pub category: String,
}

/// Label embeddings plus resolved per-app action weights.
///
/// Built once and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct LabelTable {
    pub(crate) apps: Vec<String>,
    pub(crate) actions: Vec<String>,
    pub(crate) app_vecs: Vec<Embedding>,
    pub(crate) action_vecs: Vec<Embedding>,
    /// `priors[app][action]`, 1.0 where nothing is configured
    pub(crate) priors: Vec<Vec<f32>>,
    pub(crate) text_labels: Vec<TextLabel>,
    pub(crate) text_vecs: Vec<Embedding>,
}

impl LabelTable {
    /// Embed every vocabulary entry with `embedder`.
    ///
    /// Every vector must have the embedder's declared dimension.
    pub fn build(config: &LabelConfig, embedder: &dyn Embedder) -> Result<Self, LabelError> {
        config.validate()?;

        let app_vecs = embed_all(embedder, &config.apps)?;
        let action_vecs = embed_all(embedder, &config.actions)?;

        let flat = config.flat_text_labels();
        let text_strings: Vec<String> = flat.iter().map(|(label, _)| label.clone()).collect();
        let text_vecs = if text_strings.is_empty() {
            Vec::new()
        } else {
            embed_all(embedder, &text_strings)?
        };
        let text_labels = flat
            .into_iter()
            .map(|(label, category)| TextLabel { label, category })
            .collect();

        let priors = resolve_priors(config);

        debug!(
            apps = config.apps.len(),
            actions = config.actions.len(),
            text_labels = text_vecs.len(),
            "built label table"
        );

        Ok(Self {
            apps: config.apps.clone(),
            actions: config.actions.clone(),
            app_vecs,
            action_vecs,
            priors,
            text_labels,
            text_vecs,
        })
    }

    /// Application labels, in file order.
    pub fn apps(&self) -> &[String] {
        &self.apps
    }

    /// Action labels, in file order.
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Flattened free-text labels.
    pub fn text_labels(&self) -> &[TextLabel] {
        &self.text_labels
    }

    pub fn app_embedding(&self, index: usize) -> Option<&Embedding> {
        self.app_vecs.get(index)
    }

    pub fn action_embedding(&self, index: usize) -> Option<&Embedding> {
        self.action_vecs.get(index)
    }

    /// Prior weights over actions for the app at `index`.
    pub fn priors_for(&self, index: usize) -> Option<&[f32]> {
        self.priors.get(index).map(Vec::as_slice)
    }

    /// Embedding dimensionality shared by every label vector.
    pub fn dim(&self) -> usize {
        self.app_vecs.first().map(Embedding::dim).unwrap_or(0)
    }
}

fn embed_all(embedder: &dyn Embedder, labels: &[String]) -> Result<Vec<Embedding>, LabelError> {
    let vecs = embedder.embed_text(labels)?;
    if vecs.len() != labels.len() {
        return Err(LabelError::CountMismatch {
            expected: labels.len(),
            actual: vecs.len(),
        });
    }
    let expected = embedder.dim();
    if let Some((label, vec)) = labels.iter().zip(&vecs).find(|(_, v)| v.dim() != expected) {
        return Err(LabelError::DimensionMismatch {
            label: label.clone(),
            expected,
            actual: vec.dim(),
        });
    }
    Ok(vecs)
}

fn resolve_priors(config: &LabelConfig) -> Vec<Vec<f32>> {
    let mut priors = vec![vec![1.0f32; config.actions.len()]; config.apps.len()];

    for (app, weights) in &config.action_priors {
        let Some(app_idx) = config.apps.iter().position(|a| a == app) else {
            warn!(app = %app, "priors configured for unknown app, ignoring");
            continue;
        };
        for (action, &weight) in weights {
            match config.actions.iter().position(|a| a == action) {
                Some(action_idx) => priors[app_idx][action_idx] = weight,
                None => warn!(app = %app, action = %action, "prior for unknown action, ignoring"),
            }
        }
    }

    priors
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "apps": ["browser", "editor"],
        "actions": ["reading", "coding", "chatting"],
        "action_priors": {
            "editor": { "coding": 2.0, "dancing": 9.0 },
            "ghost": { "reading": 3.0 }
        },
        "text_labels": {
            "work": ["bug fix", "code review"],
            "chat": ["greeting"]
        }
    }"#;

    #[test]
    fn test_parse_and_flatten() {
        let config = LabelConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.apps.len(), 2);
        let flat = config.flat_text_labels();
        // Categories keep their file order: "work" comes before "chat".
        assert_eq!(flat[0], ("bug fix".to_string(), "work".to_string()));
        assert_eq!(flat[1], ("code review".to_string(), "work".to_string()));
        assert_eq!(flat[2], ("greeting".to_string(), "chat".to_string()));
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_text_categories_serialize_in_file_order() {
        let config = LabelConfig::from_json(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        let work = json.find("\"work\"").unwrap();
        let chat = json.find("\"chat\"").unwrap();
        assert!(work < chat);

        let reparsed = LabelConfig::from_json(&json).unwrap();
        assert_eq!(reparsed.flat_text_labels(), config.flat_text_labels());
    }

    #[test]
    fn test_duplicate_category_is_rejected() {
        let json = r#"{
            "apps": ["x"],
            "actions": ["a"],
            "text_labels": { "chat": ["hi"], "chat": ["bye"] }
        }"#;
        assert!(matches!(
            LabelConfig::from_json(json),
            Err(LabelError::Parse(_))
        ));
    }

    /// Declares one dimension and returns another.
    struct LyingEmbedder;

    impl Embedder for LyingEmbedder {
        fn dim(&self) -> usize {
            4
        }

        fn embed_image(&self, _image: &image::RgbImage) -> Result<Embedding, EmbedError> {
            Err(EmbedError::Model("unused".into()))
        }

        fn embed_text(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbedError> {
            texts
                .iter()
                .map(|_| Ok(Embedding::normalized(vec![1.0, 0.0, 0.0])?))
                .collect()
        }
    }

    #[test]
    fn test_build_rejects_wrong_dimension() {
        let config = LabelConfig::from_json(SAMPLE).unwrap();
        match LabelTable::build(&config, &LyingEmbedder) {
            Err(LabelError::DimensionMismatch {
                label,
                expected,
                actual,
            }) => {
                assert_eq!(label, "browser");
                assert_eq!(expected, 4);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_priors_resolve_with_default_weight() {
        let config = LabelConfig::from_json(SAMPLE).unwrap();
        let priors = resolve_priors(&config);
        assert_eq!(priors[0], vec![1.0, 1.0, 1.0]);
        assert_eq!(priors[1], vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_validation_errors() {
        assert!(matches!(
            LabelConfig::from_json(r#"{"apps": [], "actions": ["a"]}"#),
            Err(LabelError::EmptyVocabulary("apps"))
        ));
        assert!(matches!(
            LabelConfig::from_json(r#"{"apps": ["x", "x"], "actions": ["a"]}"#),
            Err(LabelError::Duplicate { .. })
        ));
        assert!(matches!(
            LabelConfig::from_json(
                r#"{"apps": ["x"], "actions": ["a"], "action_priors": {"x": {"a": -1.0}}}"#
            ),
            Err(LabelError::BadPrior { .. })
        ));
        assert!(matches!(
            LabelConfig::from_json("{not json"),
            Err(LabelError::Parse(_))
        ));
    }

    #[test]
    fn test_starter_labels_are_valid() {
        let config = LabelConfig::from_json(STARTER_LABELS).unwrap();
        assert_eq!(config.apps.len(), 8);
        assert_eq!(config.flat_text_labels().len(), 8);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LabelConfig::load(Path::new("/definitely/not/here/labels.json")).unwrap_err();
        assert!(matches!(err, LabelError::Io { .. }));
    }
}
