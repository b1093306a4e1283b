use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::info;

use crate::collaborators::Submitter;
use crate::error::SubmitError;
use crate::posting::JobPosting;

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MailMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    text: &'a str,
    attachments: Vec<Attachment<'a>>,
}

/// Sends applications through an HTTP mail relay: the cover letter is the
/// body and the CV travels as `resume.txt`.
pub struct MailRelaySubmitter {
    client: Client,
    relay_url: String,
    username: String,
    password: String,
    default_recipient: String,
}

impl MailRelaySubmitter {
    pub fn new(
        relay_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        default_recipient: impl Into<String>,
    ) -> Result<Self, SubmitError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            relay_url: relay_url.into(),
            username: username.into(),
            password: password.into(),
            default_recipient: default_recipient.into(),
        })
    }

    fn recipient<'a>(&'a self, job: &'a JobPosting) -> &'a str {
        job.contact
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_recipient)
    }
}

#[async_trait]
impl Submitter for MailRelaySubmitter {
    async fn submit(
        &self,
        job: &JobPosting,
        cv_text: &str,
        cover_text: &str,
    ) -> Result<(), SubmitError> {
        let to = self.recipient(job);
        let message = MailMessage {
            from: &self.username,
            to,
            subject: format!("Application for {} Position", job.title.trim()),
            text: cover_text,
            attachments: vec![Attachment {
                filename: "resume.txt",
                content_type: "text/plain",
                content: cv_text,
            }],
        };

        let response = self
            .client
            .post(&self.relay_url)
            .basic_auth(&self.username, Some(&self.password))
            .json(&message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        info!(to, company = %job.company, "application mailed");
        Ok(())
    }
}
