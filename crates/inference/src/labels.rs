use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("failed to read label file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("label file contains no labels")]
    Empty,

    #[error("label on line {0} is blank")]
    BlankLabel(usize),
}

/// Ordered class names, indexed by the model's class id.
///
/// Loaded once at startup and shared read-only between request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVocabulary {
    labels: Vec<String>,
}

impl LabelVocabulary {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// One label per line. Trailing blank lines are ignored, interior ones are rejected.
    pub fn parse(text: &str) -> Result<Self, LabelError> {
        let mut labels: Vec<String> = text.lines().map(|l| l.trim().to_string()).collect();
        while labels.last().is_some_and(|l| l.is_empty()) {
            labels.pop();
        }

        if labels.is_empty() {
            return Err(LabelError::Empty);
        }
        if let Some(idx) = labels.iter().position(|l| l.is_empty()) {
            return Err(LabelError::BlankLabel(idx + 1));
        }

        Ok(Self { labels })
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.labels.get(class_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelVocabulary {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}
