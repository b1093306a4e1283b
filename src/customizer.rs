use async_trait::async_trait;
use tracing::debug;

use crate::anthropic::{Message, MessageSender, MessagesRequest};
use crate::collaborators::DocumentCustomizer;
use crate::error::CustomizeError;
use crate::posting::{JobPosting, truncate_chars};

/// Characters of the job description given to the CV rewrite.
const CV_CONTEXT_CHARS: usize = 300;
/// Characters of the job description given to the cover letter.
const COVER_CONTEXT_CHARS: usize = 500;

const SYSTEM_PROMPT: &str = "You tailor job application documents. \
     Reply with the finished document only, no commentary, no markdown fences. \
     Never invent experience that is not in the base document.";

/// Document customizer backed by the Anthropic Messages API.
pub struct LlmCustomizer<M> {
    client: M,
    model: String,
    max_tokens: u32,
}

impl<M: MessageSender> LlmCustomizer<M> {
    pub fn new(client: M, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
        }
    }

    async fn complete(&self, prompt: String) -> Result<String, CustomizeError> {
        let req = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(SYSTEM_PROMPT.to_string()),
            messages: vec![Message::user(prompt)],
        };

        let response = self.client.send_message(&req).await?;
        let text = response.text();
        debug!(
            model = %response.model,
            output_tokens = response.usage.output_tokens,
            "customization completed"
        );
        if text.is_empty() {
            return Err(CustomizeError::EmptyOutput);
        }
        Ok(text)
    }
}

fn cv_prompt(base_cv: &str, job: &JobPosting) -> String {
    format!(
        "Rewrite this resume for a {title} position at {company}.\n\
         Role summary: {summary}\n\
         ---\n\
         {base_cv}",
        title = job.title.trim(),
        company = job.company.trim(),
        summary = truncate_chars(&job.description, CV_CONTEXT_CHARS),
    )
}

fn cover_prompt(job: &JobPosting, base_cover: &str) -> String {
    format!(
        "Create a cover letter for the {title} position at {company}.\n\
         Job Description: {description}\n\
         ---\n\
         Base Cover Letter: {base_cover}",
        title = job.title.trim(),
        company = job.company.trim(),
        description = truncate_chars(&job.description, COVER_CONTEXT_CHARS),
    )
}

#[async_trait]
impl<M: MessageSender> DocumentCustomizer for LlmCustomizer<M> {
    async fn rewrite(
        &self,
        base_text: &str,
        context: &JobPosting,
    ) -> Result<String, CustomizeError> {
        self.complete(cv_prompt(base_text, context)).await
    }

    async fn generate_cover(
        &self,
        job: &JobPosting,
        base_text: &str,
    ) -> Result<String, CustomizeError> {
        self.complete(cover_prompt(job, base_text)).await
    }
}
