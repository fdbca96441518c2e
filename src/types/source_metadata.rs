use serde::{Deserialize, Serialize};

/// A single source the assistant relied on, such as a statute or uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    /// Display title of the source.
    pub title: String,

    /// Link to the source, if public.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// The quoted passage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,

    /// Article or paragraph reference, e.g. "art. 36 § 1 KP".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article: Option<String>,
}

impl Source {
    /// Create a source with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: None,
            excerpt: None,
            article: None,
        }
    }
}

/// Citation information attached to an assistant message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Sources in the order the backend reported them.
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl SourceMetadata {
    /// Create metadata from a list of sources.
    pub fn new(sources: Vec<Source>) -> Self {
        Self { sources }
    }

    /// Returns true if no sources are present.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Append sources from `other`, skipping any already present.
    pub fn merge(&mut self, other: SourceMetadata) {
        for source in other.sources {
            if !self.sources.contains(&source) {
                self.sources.push(source);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_preserves_order_and_dedups() {
        let mut metadata = SourceMetadata::new(vec![Source::new("Kodeks pracy")]);
        metadata.merge(SourceMetadata::new(vec![
            Source::new("Kodeks pracy"),
            Source::new("Kodeks cywilny"),
        ]));
        let titles: Vec<_> = metadata.sources.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Kodeks pracy", "Kodeks cywilny"]);
    }

    #[test]
    fn test_deserialize_missing_sources() {
        let metadata: SourceMetadata = serde_json::from_str("{}").unwrap();
        assert!(metadata.is_empty());
    }
}
