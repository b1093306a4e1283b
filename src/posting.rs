use std::fmt;

use serde::{Deserialize, Serialize};

/// Natural dedup key of a posting: (title, company, source, url).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PostingKey {
    pub title: String,
    pub company: String,
    pub source: String,
    pub url: String,
}

impl fmt::Display for PostingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {} ({}: {})",
            self.title, self.company, self.source, self.url
        )
    }
}

/// A candidate job as returned by a [`JobSource`](crate::collaborators::JobSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosting {
    pub title: String,
    pub company: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    /// Address applications should be mailed to, when the source exposes one.
    #[serde(default)]
    pub contact: Option<String>,
}

impl JobPosting {
    pub fn key(&self) -> PostingKey {
        PostingKey {
            title: self.title.trim().to_string(),
            company: self.company.trim().to_string(),
            source: self.source.trim().to_string(),
            url: self.url.trim().to_string(),
        }
    }

    pub fn location_or_remote(&self) -> &str {
        match self.location.as_deref().map(str::trim) {
            Some(loc) if !loc.is_empty() => loc,
            _ => "Remote",
        }
    }

    /// "Title at Company", as shown in status lines and notifications.
    pub fn headline(&self) -> String {
        format!("{} at {}", self.title.trim(), self.company.trim())
    }
}

/// Returns at most `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting() -> JobPosting {
        JobPosting {
            title: " Python Developer ".into(),
            company: "TechCorp".into(),
            source: "Indeed".into(),
            url: "https://jobs.example/1".into(),
            description: "Build things".into(),
            location: None,
            contact: None,
        }
    }

    #[test]
    fn key_ignores_surrounding_whitespace() {
        let mut other = posting();
        other.title = "Python Developer".into();
        assert_eq!(posting().key(), other.key());
    }

    #[test]
    fn key_distinguishes_sources() {
        let mut other = posting();
        other.source = "LinkedIn".into();
        assert_ne!(posting().key(), other.key());
    }

    #[test]
    fn missing_location_reads_as_remote() {
        let mut job = posting();
        assert_eq!(job.location_or_remote(), "Remote");
        job.location = Some("  ".into());
        assert_eq!(job.location_or_remote(), "Remote");
        job.location = Some("Cape Town".into());
        assert_eq!(job.location_or_remote(), "Cape Town");
    }

    #[test]
    fn headline_format() {
        assert_eq!(posting().headline(), "Python Developer at TechCorp");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("short", 300), "short");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let job: JobPosting = serde_json::from_str(
            r#"{"title":"Dev","company":"Acme","source":"feed","url":"https://x"}"#,
        )
        .unwrap();
        assert!(job.description.is_empty());
        assert!(job.location.is_none());
    }
}
