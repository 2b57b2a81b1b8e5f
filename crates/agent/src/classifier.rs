//! Intent classifier adapter.
//!
//! Wraps the language model behind a prompt that enumerates the closed intent
//! taxonomy. Whatever goes wrong upstream, callers get a [`ClassificationResult`]:
//! timeouts, transport errors and unparseable output all degrade to
//! [`ClassificationResult::fallback`].

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use replyguard_core::domain::intent::{ClassificationResult, Intent};
use replyguard_core::domain::thread::ThreadContext;

use crate::llm::LlmClient;

const BODY_PROMPT_CHARS: usize = 4_000;

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// Never fails. The reasoning of a fallback result names what went wrong.
    pub async fn classify(
        &self,
        subject: &str,
        body: &str,
        thread: Option<&ThreadContext>,
    ) -> ClassificationResult {
        let prompt = build_prompt(subject, body, thread);

        let raw = match tokio::time::timeout(self.timeout, self.llm.complete(&prompt)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(error)) => {
                warn!(event_name = "classifier.upstream_failed", error = %error, "classifier call failed");
                return ClassificationResult::fallback(format!("classifier unavailable: {error}"));
            }
            Err(_) => {
                warn!(
                    event_name = "classifier.timeout",
                    timeout_secs = self.timeout.as_secs(),
                    "classifier call timed out"
                );
                return ClassificationResult::fallback("classifier timed out");
            }
        };

        match parse_response(&raw) {
            Some(result) => result,
            None => {
                warn!(
                    event_name = "classifier.unparseable",
                    response_chars = raw.chars().count(),
                    "classifier returned no usable verdict"
                );
                ClassificationResult::fallback("classifier returned an unparseable response")
            }
        }
    }
}

pub fn build_prompt(subject: &str, body: &str, thread: Option<&ThreadContext>) -> String {
    let mut prompt = String::from(
        "You classify customer-service emails for an online store.\n\n\
         Step 1. Before anything else, check whether the customer explicitly asks to speak \
         with a human, a real person, an agent, or a manager. If they do, the classification \
         is \"human_escalation\" and the priority is \"urgent\", no matter what else the \
         email says.\n\
         Step 2. Otherwise infer the intent from what the customer means, not from keywords. \
         A message that mentions \"cancel\" while asking to pause is a subscription change.\n\
         Step 3. Assign a priority (low, medium, high, urgent) from business impact and \
         urgency. Priority is independent of your confidence.\n\nIntents:\n",
    );

    for intent in Intent::ALL {
        prompt.push_str(&format!("- {}: {}\n", intent.as_str(), intent.description()));
    }

    if let Some(thread) = thread.filter(|thread| thread.is_multi_turn()) {
        prompt.push_str("\nEarlier messages in this conversation:\n");
        prompt.push_str(&thread.summary);
        prompt.push('\n');
    }

    let body = body.chars().take(BODY_PROMPT_CHARS).collect::<String>();
    prompt.push_str(&format!("\nSubject: {}\nBody:\n{}\n", subject.trim(), body.trim()));
    prompt.push_str(
        "\nRespond with a single JSON object and nothing else:\n\
         {\"classification\": \"<intent>\", \"confidence\": <0-100>, \"reasoning\": \"...\", \
         \"priority\": \"<low|medium|high|urgent>\", \"priorityReasoning\": \"...\"}\n",
    );
    prompt
}

/// Finds the outermost JSON object in `raw` (models like to wrap it in prose or
/// code fences) and normalizes it.
pub fn parse_response(raw: &str) -> Option<ClassificationResult> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    let payload: Value = serde_json::from_str(&raw[start..=end]).ok()?;
    ClassificationResult::from_model_output(&payload)
}
