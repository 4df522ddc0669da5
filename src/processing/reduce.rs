//! Reduce phase: compose the final HTML study guide.

use crate::llm::{ChatClient, ChatMessage, LlmClientError, complete_with_timeout};
use std::time::Duration;

use super::clean::clean_response;

/// Instruction framing the final composition call.
pub(crate) const COMPOSE_PROMPT: &str = r#"You are an expert teacher writing a comprehensive study guide from the material provided by the user.

Output rules:
- Respond with raw HTML only. Do not wrap the output in Markdown code fences and do not add any conversational introduction or closing remarks.
- Start with an <h1> title that names the subject of the material.
- Organize the body into <h2>/<h3> sections that cover every topic in the material in detail, keeping definitions, numbers, formulas, and code snippets intact. Use <pre><code> for code.
- Illustrate concepts with real-world examples.
- Highlight key points in callout boxes: <div class="callout"><strong>Key point:</strong> ...</div>.

The guide must end with these two sections, in this order:
1. <h2>Next Topics to Study</h2> followed by a <ul> of topics that build on this material.
2. <h2>Related References</h2> followed by a <ul> of external resources, each an <a href="..."> hyperlink to a real, publicly reachable URL."#;

/// Wraps the chat client with the composition prompt and response cleanup of the reduce phase.
pub struct FinalComposer<'a> {
    client: &'a dyn ChatClient,
    model: &'a str,
    timeout: Duration,
}

impl<'a> FinalComposer<'a> {
    /// Build a composer issuing calls to `model` through `client`.
    pub fn new(client: &'a dyn ChatClient, model: &'a str, timeout: Duration) -> Self {
        Self {
            client,
            model,
            timeout,
        }
    }

    /// Compose the cleaned HTML document from raw document text or combined notes.
    ///
    /// Unlike the map phase, a failed call is returned to the caller.
    pub async fn compose(&self, source_text: &str) -> Result<String, LlmClientError> {
        let messages = vec![
            ChatMessage::system(COMPOSE_PROMPT),
            ChatMessage::user(source_text),
        ];
        let reply = complete_with_timeout(self.client, self.model, messages, self.timeout).await?;
        let html = clean_response(&reply.content);
        tracing::debug!(
            raw_chars = reply.content.len(),
            cleaned_chars = html.len(),
            "Composed study guide"
        );
        Ok(html)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::sync::Mutex;

    struct ScriptedClient {
        reply: Option<&'static str>,
        models: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(
            &self,
            model: &str,
            messages: Vec<ChatMessage>,
        ) -> Result<ChatMessage, LlmClientError> {
            assert_eq!(messages[0].content, COMPOSE_PROMPT);
            self.models.lock().unwrap().push(model.to_string());
            match self.reply {
                Some(text) => Ok(ChatMessage {
                    role: Role::Assistant,
                    content: text.to_string(),
                }),
                None => Err(LlmClientError::Status {
                    status: StatusCode::BAD_GATEWAY,
                    body: "upstream down".into(),
                }),
            }
        }
    }

    #[tokio::test]
    async fn cleans_composed_output() {
        let client = ScriptedClient {
            reply: Some("Here is your guide:\n```html\n<h1>Networking</h1>\n```"),
            models: Mutex::new(Vec::new()),
        };
        let composer = FinalComposer::new(&client, "sonar-pro", Duration::from_secs(1));

        let html = composer.compose("notes").await.expect("html");

        assert_eq!(html, "<h1>Networking</h1>");
        assert_eq!(*client.models.lock().unwrap(), vec!["sonar-pro".to_string()]);
    }

    #[tokio::test]
    async fn propagates_remote_failure() {
        let client = ScriptedClient {
            reply: None,
            models: Mutex::new(Vec::new()),
        };
        let composer = FinalComposer::new(&client, "sonar-pro", Duration::from_secs(1));

        let error = composer.compose("notes").await.expect_err("failure");

        assert!(matches!(error, LlmClientError::Status { .. }));
    }

    #[test]
    fn prompt_mandates_trailing_sections() {
        assert!(COMPOSE_PROMPT.contains("Next Topics to Study"));
        assert!(COMPOSE_PROMPT.contains("Related References"));
        assert!(COMPOSE_PROMPT.contains("raw HTML only"));
    }
}
