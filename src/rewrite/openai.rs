//! Rewrite through an OpenAI-compatible chat completions endpoint

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::Rewriter;
use crate::config::RewriteConfig;
use crate::engine::Turn;

const SYSTEM_PROMPT: &str = "You restyle chat replies. Learn the speaking style from the \
user's past conversations and answer in a similar tone. Focus on answering the message \
instead of restating it. Sound natural and close, like a caring friend, never formal, \
and never reveal that you are an AI model.";

/// Blocking client for the rewrite endpoint
pub struct OpenAiRewriter {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl OpenAiRewriter {
    /// Build a client, reading the API key from the configured variable
    pub fn from_config(config: &RewriteConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .with_context(|| format!("{} is not set", config.api_key_env))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

impl Rewriter for OpenAiRewriter {
    fn rewrite(
        &self,
        input: &str,
        candidate: &str,
        persona: &str,
        context: &str,
        history: &[Turn],
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_prompt(input, candidate, persona, context, history),
                },
            ],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()?
            .error_for_status()?;
        let body: ChatResponse = response.json()?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| anyhow!("rewrite response had no content"))
    }
}

/// Instructions for restyling one candidate
fn build_prompt(input: &str, candidate: &str, persona: &str, context: &str, history: &[Turn]) -> String {
    let history: Vec<String> = history
        .iter()
        .map(|turn| format!("- user: {} / you: {}", turn.user, turn.model))
        .collect();

    format!(
        "Past conversations of the user, imitate the style of their replies:\n\
         {context}\n\n\
         Check whether the Output below fits the conversation and fix it in the user's tone:\n\
         1. If the reply makes sense, keep it unchanged.\n\
         2. If it does not, correct it in the user's tone.\n\
         3. Leave out anything unrelated or confusing.\n\
         4. Do not repeat the user's question.\n\
         5. Replace any [貼圖] with a fitting emoji.\n\
         6. If asked who you are or your name, answer that you are {persona}.\n\
         Earlier turns of this chat, keep the conversation coherent:\n\
         {}\n\n\
         Input: {input}\n\n\
         Output: {candidate}\n\n\
         Return only the corrected Output, with no explanation.",
        history.join("\n")
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}
