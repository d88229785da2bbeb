use std::path::Path;

use anyhow::{anyhow, Result};

/// Trait for tokenizers used by mimic
///
/// The pipeline only needs to encode prompts and decode generated
/// sequences; the backend decides where the vocabulary comes from.
pub trait TokenizerTrait: Send + Sync {
    /// Encode text to token IDs
    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode token IDs to text
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;

    /// Get EOS token ID, if the vocabulary defines one
    fn eos_token_id(&self) -> Option<u32>;

    /// Get BOS token ID, if the vocabulary defines one
    fn bos_token_id(&self) -> Option<u32>;
}

/// Boxed tokenizer type for use in cache entries
pub type BoxedTokenizer = Box<dyn TokenizerTrait>;

/// End-of-sequence markers tried in order when the vocabulary is loaded
const EOS_CANDIDATES: &[&str] = &["</s>", "<|endoftext|>", "<|eot_id|>", "<|im_end|>", "<eos>"];

const BOS_CANDIDATES: &[&str] = &["<s>", "<|begin_of_text|>", "<bos>"];

/// Tokenizer backed by a HuggingFace `tokenizer.json`
pub struct Tokenizer {
    inner: tokenizers::Tokenizer,
    eos_token_id: Option<u32>,
    bos_token_id: Option<u32>,
}

impl Tokenizer {
    /// Load `tokenizer.json` from a model directory
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let path = dir.join("tokenizer.json");
        if !path.exists() {
            return Err(anyhow!("tokenizer.json not found in {}", dir.display()));
        }
        Self::from_file(&path)
    }

    /// Load a tokenizer from a `tokenizer.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow!("Failed to load tokenizer '{}': {}", path.display(), e))?;
        let eos_token_id = EOS_CANDIDATES
            .iter()
            .find_map(|token| inner.token_to_id(token));
        let bos_token_id = BOS_CANDIDATES
            .iter()
            .find_map(|token| inner.token_to_id(token));

        Ok(Self {
            inner,
            eos_token_id,
            bos_token_id,
        })
    }
}

impl TokenizerTrait for Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| anyhow!("Decode error: {}", e))
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    fn bos_token_id(&self) -> Option<u32> {
        self.bos_token_id
    }
}

/// Keep at most `max_len` tokens, dropping from the front.
///
/// The end of a chat prompt holds the current turn and the `Assistant:`
/// marker, so the oldest context is what gets cut. A leading `bos` token
/// survives the cut and counts towards `max_len`.
pub fn truncate_front(mut ids: Vec<u32>, max_len: usize, bos: Option<u32>) -> Vec<u32> {
    if ids.len() <= max_len {
        return ids;
    }
    let keep_bos = max_len > 0 && bos.is_some() && ids.first().copied() == bos;
    if keep_bos {
        ids.drain(1..ids.len() - max_len + 1);
    } else {
        ids.drain(..ids.len() - max_len);
    }
    ids
}
