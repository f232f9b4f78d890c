
use anyhow::{Context, Result, anyhow};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::WebRagError;

/// Model used for bulk text work: optimization, summaries, answers.
pub const FAST_MODEL: &str = "llama-3.1-8b-instant";
/// Model used for structured output: intent classification, row/chart specs.
pub const SMART_MODEL: &str = "llama-3.3-70b-versatile";

pub const SUMMARY_FAILURE_MESSAGE: &str =
    "Summary could not be generated due to an external service error.";
pub const ANSWER_FAILURE_MESSAGE: &str =
    "The answer could not be generated due to an external service error.";

const REQUEST_TIMEOUT_SECONDS: u64 = 60;
/// Only the most recent turns are serialized into prompts.
const HISTORY_WINDOW: usize = 10;

/// One turn of caller-supplied conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Client for an OpenAI-compatible chat completion API (Groq) holding the
/// shared key pool. Requests shuffle the pool and fail over key by key; there
/// is no backoff and no retry beyond the failover walk.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    api_keys: Vec<String>,
}

impl LlmClient {
    pub fn new(base_url: &str, api_keys: Vec<String>) -> crate::Result<Self> {
        if api_keys.is_empty() {
            return Err(WebRagError::Config(
                "LLM key pool must not be empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .build()
            .map_err(|e| WebRagError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_keys,
        })
    }

    /// Issue one completion request with a single key, no failover.
    async fn request_completion(&self, api_key: &str, model: &str, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model,
            temperature: 0.0,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat completion request")?
            .error_for_status()
            .context("Chat completion request failed")?;

        let parsed: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(anyhow!("Chat completion returned empty content"));
        }

        Ok(content.trim().to_string())
    }

    /// Complete a prompt, walking the key pool in random order until one key
    /// succeeds. Errors only after every key has failed.
    pub async fn complete(&self, model: &str, prompt: &str) -> crate::Result<String> {
        let mut keys: Vec<&String> = self.api_keys.iter().collect();
        keys.shuffle(&mut rand::thread_rng());

        let mut last_error = None;
        for (attempt, key) in keys.iter().enumerate() {
            match self.request_completion(key, model, prompt).await {
                Ok(content) => return Ok(content),
                Err(e) => {
                    warn!(
                        "Chat completion error with key #{} of {}: {e}. Trying next key...",
                        attempt + 1,
                        keys.len()
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(WebRagError::Llm(format!(
            "All {} API keys failed: {}",
            self.api_keys.len(),
            last_error.map_or_else(|| "no keys tried".to_string(), |e| e.to_string())
        )))
    }

    /// Complete a prompt, degrading to `fallback` once the key pool is
    /// exhausted. Best-effort stages never surface errors to callers.
    pub async fn complete_or(&self, model: &str, prompt: &str, fallback: &str) -> String {
        match self.complete(model, prompt).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Completion failed on every key, using fallback: {e}");
                fallback.to_string()
            }
        }
    }

    /// Issue a single completion with one randomly chosen key. Used where one
    /// shot is enough and the caller has its own failure default.
    pub async fn complete_once(&self, model: &str, prompt: &str) -> crate::Result<String> {
        let key = self
            .api_keys
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| WebRagError::Config("LLM key pool must not be empty".to_string()))?;

        self.request_completion(key, model, prompt)
            .await
            .map_err(|e| WebRagError::Llm(e.to_string()))
    }

    /// Rewrite noisy scraped text into clean retrieval-ready text. Falls back
    /// to the input unchanged when every key fails; ingestion never aborts
    /// because optimization was unavailable.
    pub async fn optimize_for_retrieval(&self, text: &str) -> String {
        debug!("Optimizing {} chars of scraped text", text.len());
        let prompt = format!(
            "You are a data processing expert for RAG systems. \
             Your task is to take the following raw scraped text and rewrite it into a clean, structured, and comprehensive format. \
             Focus on preserving all factual data, especially financial metrics, numbers, dates, and key entities. \
             Fix any formatting issues where labels and values are separated by newlines (e.g., change 'Market Cap\n1.34T' to 'Market Cap: 1.34T'). \
             Remove irrelevant navigation links, ads, or boilerplate footer text. \
             Ensure the output is dense with information and optimized for semantic search retrieval.\n\n\
             RAW TEXT:\n{text}\n\nOPTIMIZED TEXT:"
        );

        self.complete_or(FAST_MODEL, &prompt, text).await
    }

    /// Produce a short analyst-style overview of the ingested content.
    pub async fn summarize(&self, text: &str) -> String {
        let prompt = format!(
            "You are an experienced equity research analyst. \
             Given the combined extracted content below from multiple web pages, produce a concise, \
             professional, user-friendly analyst summary. \
             Include everything important; give an overview of the content which was provided. \
             Focus on the most important facts, company profile, key metrics or indices mentioned, \
             and any notable points. Use short sentences and clear language.\n\n\
             CONTENT:\n{text}\n\nSUMMARY (about 10 lines):"
        );

        self.complete_or(FAST_MODEL, &prompt, SUMMARY_FAILURE_MESSAGE)
            .await
    }

    /// Answer a question strictly from the retrieved context. The model is
    /// told to admit when the context does not contain the answer.
    pub async fn answer_with_context(
        &self,
        question: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> String {
        let history_block = format_history(history);
        let prompt = format!(
            "You are a helpful assistant. Answer only based on the CONTEXT below. \
             If the answer is not present in the context, say: 'I could not find the answer in the provided documents.' \
             Use the conversation history to understand follow-up questions. \
             Be concise and formal.\n\n\
             {history_block}CONTEXT:\n{context}\n\nQUESTION: {question}\nANSWER:"
        );

        self.complete_or(FAST_MODEL, &prompt, ANSWER_FAILURE_MESSAGE)
            .await
    }

    /// Classify whether the user wants a structured artifact or is just
    /// chatting. Returns the first whitespace token of the reply, lowercased;
    /// any failure or empty reply defaults to `artifact_label` so the richer
    /// output path wins over silent degradation.
    pub async fn classify_intent(
        &self,
        message: &str,
        history: &[ChatTurn],
        artifact_label: &str,
        artifact_description: &str,
    ) -> String {
        let history_block = format_history(history);
        let prompt = format!(
            "You are a smart intent classifier. Based on the conversation history and the latest user message, \
             decide if the user wants to GENERATE or MODIFY {artifact_description}, OR if they are just asking a general question or chatting.\n\n\
             Reply with EXACTLY one word:\n\
             - '{artifact_label}' if they want to create, modify, or regenerate {artifact_description}\n\
             - 'chat' if they are asking a question, greeting, or anything else\n\n\
             {history_block}USER MESSAGE: {message}\n\nINTENT:"
        );

        let label = match self.complete_once(SMART_MODEL, &prompt).await {
            Ok(reply) => reply
                .split_whitespace()
                .next()
                .map(str::to_lowercase)
                .unwrap_or_default(),
            Err(e) => {
                warn!("Intent classification failed, defaulting to '{artifact_label}': {e}");
                String::new()
            }
        };

        if label.is_empty() {
            artifact_label.to_string()
        } else {
            label
        }
    }
}

/// Serialize the most recent conversation turns into a prompt block.
/// Returns an empty string when there is no history.
pub fn format_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|turn| format!("{}: {}", turn.role.to_uppercase(), turn.text))
        .collect();

    format!("CONVERSATION HISTORY:\n{}\n\n", lines.join("\n"))
}

/// Strip markdown code fences the model sometimes wraps around JSON output.
pub fn strip_code_fences(content: &str) -> String {
    if let Some((_, rest)) = content.split_once("```json") {
        if let Some((inner, _)) = rest.split_once("```") {
            return inner.trim().to_string();
        }
    } else if let Some((_, rest)) = content.split_once("```") {
        if let Some((inner, _)) = rest.split_once("```") {
            return inner.trim().to_string();
        }
    }

    content.trim().to_string()
}
