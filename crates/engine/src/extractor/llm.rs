//! Model-backed fact extraction.
//!
//! Sends the exchange to the provider with a structured prompt and parses
//! the JSON it returns. Any failure is logged and yields no candidates.

use std::sync::Arc;

use async_trait::async_trait;
use mnemo_core::{
    ExtractionError, FactCandidate, Importance, Message, Provider, ProviderRequest,
};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{FactExtractor, infer_tags, is_small_talk};

const DEFAULT_CONFIDENCE: f32 = 0.7;

const EXTRACTION_PROMPT: &str = r#"You decide what is worth remembering about a user after one exchange with an assistant.

Save only information that will still be true in future conversations: the user's identity, preferences, relationships, ongoing goals, location, or work.
Never save greetings, one-off questions the assistant simply answered, or passing moods.
One exchange may contain several independent facts; return each separately.
If the user asks you to keep something only for this conversation, save it with the tag "thread_scoped".

Reply with JSON only, in exactly this shape:
{"should_save": true, "memories": [{"question": "What is the user's name?", "answer": "Alex", "tags": ["identity"], "importance": "high", "confidence": 0.9, "justification": "The user introduced themselves"}]}

importance is one of "low", "medium", "high". When nothing is worth saving, reply {"should_save": false, "memories": []}."#;

#[derive(Debug, Deserialize)]
struct ExtractionReply {
    #[serde(default)]
    should_save: bool,
    #[serde(default)]
    memories: Vec<ExtractedMemory>,
}

#[derive(Debug, Deserialize)]
struct ExtractedMemory {
    #[serde(default)]
    question: String,
    #[serde(default)]
    answer: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    importance: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    justification: Option<String>,
}

impl ExtractedMemory {
    fn into_candidate(self) -> Option<FactCandidate> {
        let question = self.question.trim().to_string();
        let answer = self.answer.trim().to_string();
        if question.is_empty() || answer.is_empty() {
            return None;
        }

        let mut tags: std::collections::BTreeSet<String> = self
            .tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if tags.is_empty() {
            tags = infer_tags(&question, &answer);
        }

        Some(FactCandidate {
            question,
            answer,
            tags,
            importance: self
                .importance
                .and_then(|i| i.parse::<Importance>().ok())
                .unwrap_or_default(),
            confidence: self
                .confidence
                .unwrap_or(DEFAULT_CONFIDENCE)
                .clamp(0.0, 1.0),
            justification: self.justification.unwrap_or_default(),
        })
    }
}

pub struct LlmExtractor {
    provider: Arc<dyn Provider>,
    model: String,
}

impl LlmExtractor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    async fn try_extract(
        &self,
        user_input: &str,
        ai_response: &str,
    ) -> Result<Vec<FactCandidate>, ExtractionError> {
        let exchange = format!("User: {user_input}\nAssistant: {ai_response}");
        let mut request = ProviderRequest::new(
            self.model.clone(),
            vec![Message::system(EXTRACTION_PROMPT), Message::user(exchange)],
        );
        request.temperature = 0.0;
        request.max_tokens = Some(512);

        let response = self.provider.complete(request).await?;
        parse_reply(&response.message.content)
    }
}

#[async_trait]
impl FactExtractor for LlmExtractor {
    fn name(&self) -> &str {
        "llm"
    }

    async fn extract(&self, user_input: &str, ai_response: &str) -> Vec<FactCandidate> {
        if is_small_talk(user_input) {
            return Vec::new();
        }
        match self.try_extract(user_input, ai_response).await {
            Ok(candidates) => {
                debug!(count = candidates.len(), "Model extraction finished");
                candidates
            }
            Err(e) => {
                warn!(provider = %self.provider.name(), error = %e, "Fact extraction failed");
                Vec::new()
            }
        }
    }
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    match inner.split_once('\n') {
        Some((lang, body)) if !lang.contains('{') => body.trim(),
        _ => inner.trim(),
    }
}

fn parse_reply(raw: &str) -> Result<Vec<FactCandidate>, ExtractionError> {
    let body = strip_fences(raw);
    let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) else {
        return Err(ExtractionError::Malformed("no JSON object in output".into()));
    };
    if end < start {
        return Err(ExtractionError::Malformed("unbalanced braces".into()));
    }

    let reply: ExtractionReply = serde_json::from_str(&body[start..=end])
        .map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    if !reply.should_save {
        return Ok(Vec::new());
    }
    Ok(reply
        .memories
        .into_iter()
        .filter_map(ExtractedMemory::into_candidate)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use mnemo_core::ProviderError;

    #[test]
    fn parses_plain_json() {
        let raw = r#"{"should_save": true, "memories": [
            {"question": "What is the user's name?", "answer": "Alex", "tags": ["identity"], "importance": "high", "confidence": 0.9, "justification": "Introduced themselves"},
            {"question": "Where does the user work?", "answer": "Google", "tags": [], "importance": "normal"}
        ]}"#;
        let candidates = parse_reply(raw).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].importance, Importance::High);
        assert_eq!(candidates[1].importance, Importance::Medium);
        assert!((candidates[1].confidence - DEFAULT_CONFIDENCE).abs() < 1e-6);
        assert!(candidates[1].tags.contains("work"));
    }

    #[test]
    fn conversation_only_facts_keep_their_scope_tag() {
        assert!(EXTRACTION_PROMPT.contains(mnemo_core::THREAD_SCOPED_TAG));
        let raw = r#"{"should_save": true, "memories": [
            {"question": "What is the working title?", "answer": "Night Trains", "tags": ["Thread_Scoped"]}
        ]}"#;
        let candidates = parse_reply(raw).unwrap();
        assert!(candidates[0].tags.contains(mnemo_core::THREAD_SCOPED_TAG));
    }

    #[test]
    fn strips_code_fences() {
        let raw = "```json\n{\"should_save\": true, \"memories\": [{\"question\": \"Q?\", \"answer\": \"A\"}]}\n```";
        assert_eq!(parse_reply(raw).unwrap().len(), 1);

        let bare = "```\n{\"should_save\": false, \"memories\": []}\n```";
        assert!(parse_reply(bare).unwrap().is_empty());
    }

    #[test]
    fn tolerates_prose_around_json() {
        let raw = "Sure! Here you go: {\"should_save\": true, \"memories\": [{\"question\": \"Q?\", \"answer\": \"A\"}]} Hope that helps.";
        assert_eq!(parse_reply(raw).unwrap().len(), 1);
    }

    #[test]
    fn should_save_false_discards_memories() {
        let raw = r#"{"should_save": false, "memories": [{"question": "Q?", "answer": "A"}]}"#;
        assert!(parse_reply(raw).unwrap().is_empty());
    }

    #[test]
    fn malformed_output_is_an_error() {
        assert!(matches!(parse_reply("no json here"), Err(ExtractionError::Malformed(_))));
        assert!(matches!(parse_reply("{not: valid}"), Err(ExtractionError::Malformed(_))));
    }

    #[test]
    fn blank_fields_are_dropped_and_confidence_clamped() {
        let raw = r#"{"should_save": true, "memories": [
            {"question": "", "answer": "A"},
            {"question": "Q?", "answer": "A", "confidence": 3.0}
        ]}"#;
        let candidates = parse_reply(raw).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, 1.0);
    }

    #[tokio::test]
    async fn malformed_model_output_yields_nothing() {
        let provider = Arc::new(ScriptedProvider::new().then_reply("I think the user is called Alex."));
        let extractor = LlmExtractor::new(provider.clone(), "test-model");
        let candidates = extractor.extract("My name is Alex", "Hi Alex").await;
        assert!(candidates.is_empty());
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_yields_nothing() {
        let provider = Arc::new(
            ScriptedProvider::new().then_fail(ProviderError::Network("connection reset".into())),
        );
        let extractor = LlmExtractor::new(provider, "test-model");
        assert!(extractor.extract("My name is Alex", "Hi Alex").await.is_empty());
    }

    #[tokio::test]
    async fn small_talk_skips_the_model() {
        let provider = Arc::new(ScriptedProvider::new());
        let extractor = LlmExtractor::new(provider.clone(), "test-model");
        assert!(extractor.extract("thanks!", "You're welcome").await.is_empty());
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn sends_exchange_with_extraction_prompt() {
        let provider = Arc::new(ScriptedProvider::new().then_reply(
            r#"{"should_save": true, "memories": [{"question": "What is the user's name?", "answer": "Alex", "tags": ["identity"]}]}"#,
        ));
        let extractor = LlmExtractor::new(provider.clone(), "extract-model");
        let candidates = extractor.extract("My name is Alex", "Nice to meet you").await;
        assert_eq!(candidates.len(), 1);

        let request = &provider.requests()[0];
        assert_eq!(request.model, "extract-model");
        assert_eq!(request.messages.len(), 2);
        assert!(request.messages[1].content.contains("User: My name is Alex"));
    }
}
