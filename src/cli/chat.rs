//! One-shot chat command

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::engine::{InferenceRequest, PollOutcome, RequestId};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Answer `input` with the model in `model_dir` and print the result as JSON
pub async fn chat(
    config: Option<PathBuf>,
    model_dir: PathBuf,
    identity: String,
    persona: String,
    input: String,
) -> Result<()> {
    let config = super::load_config(config.as_deref())?;
    let engine = super::start_engine(&config, &model_dir).await?;

    let request_id = engine.submit(InferenceRequest {
        request_id: RequestId::new(),
        model_location: model_dir,
        display_name: persona,
        input_text: input,
        identity,
        session_history: Vec::new(),
    })?;
    tracing::info!(request_id = %request_id, "Submitted");

    let result = loop {
        if let PollOutcome::Ready(result) = engine.poll(&request_id) {
            break result;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    if !result.is_success() {
        anyhow::bail!("inference did not produce an answer");
    }
    Ok(())
}
