use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::collaborators::JobSource;
use crate::error::SourceError;
use crate::posting::JobPosting;

/// One entry of the JSON job feed. `source` falls back to the configured
/// source name when the feed does not tag its entries.
#[derive(Debug, Deserialize)]
struct FeedEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    contact: Option<String>,
}

/// Job source reading a JSON array of postings from an HTTP feed,
/// newest first (`sort=date`).
pub struct HttpJobSource {
    client: Client,
    feed_url: String,
    source_name: String,
    max_jobs: usize,
}

impl HttpJobSource {
    pub fn new(
        feed_url: impl Into<String>,
        source_name: impl Into<String>,
        max_jobs: usize,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            feed_url: feed_url.into(),
            source_name: source_name.into(),
            max_jobs,
        })
    }

    fn posting_from(&self, entry: FeedEntry) -> Option<JobPosting> {
        if entry.title.trim().is_empty()
            || entry.company.trim().is_empty()
            || entry.url.trim().is_empty()
        {
            debug!(title = %entry.title, "dropping feed entry without title, company or url");
            return None;
        }
        Some(JobPosting {
            title: entry.title,
            company: entry.company,
            source: entry.source.unwrap_or_else(|| self.source_name.clone()),
            url: entry.url,
            description: entry.description,
            location: entry.location,
            contact: entry.contact,
        })
    }
}

#[async_trait]
impl JobSource for HttpJobSource {
    async fn search(&self, query: &str, location: &str) -> Result<Vec<JobPosting>, SourceError> {
        if self.feed_url.trim().is_empty() {
            return Err(SourceError::NotConfigured);
        }

        let response = self
            .client
            .get(&self.feed_url)
            .query(&[("q", query), ("l", location), ("sort", "date")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let entries: Vec<FeedEntry> = response.json().await?;
        Ok(entries
            .into_iter()
            .filter_map(|entry| self.posting_from(entry))
            .take(self.max_jobs)
            .collect())
    }
}
