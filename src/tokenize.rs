//! Token encoding for chunk-boundary computation.
//!
//! Chunk windows are defined over tokens, not characters, so the chunker
//! needs an encode/decode pair. The default is tiktoken's `cl100k_base`
//! (the encoding used by the embedding models this pipeline targets);
//! a whitespace tokenizer is available for offline runs and tests.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Trait for tokenization operations.
///
/// Implementations must be thread-safe; the chunker holds one behind a
/// shared reference for the length of a processing run.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode token ids back into text.
    fn decode(&self, tokens: &[u32]) -> String;

    /// Count the number of tokens in the given text.
    fn count_tokens(&self, text: &str) -> usize {
        self.encode(text).len()
    }

    /// Get the name/identifier of this tokenizer.
    fn name(&self) -> &str;
}

/// Tiktoken-based tokenizer, compatible with OpenAI embedding models.
pub struct TiktokenTokenizer {
    bpe: tiktoken_rs::CoreBPE,
    name: String,
}

impl TiktokenTokenizer {
    /// Create a `cl100k_base` tokenizer (text-embedding-3-small and
    /// related models).
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| Error::Config(format!("failed to initialize cl100k_base: {}", e)))?;
        Ok(Self {
            bpe,
            name: "cl100k_base".to_string(),
        })
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as u32)
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let ids: Vec<usize> = tokens.iter().map(|&t| t as usize).collect();
        self.bpe.decode(ids).unwrap_or_default()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Whitespace-word tokenizer.
///
/// Assigns ids to words on first sight and decodes by joining with a
/// single space, so whitespace runs are not preserved exactly. Useful
/// where chunk boundaries must be predictable from word counts.
pub struct WhitespaceTokenizer {
    vocab: RwLock<Vocab>,
}

#[derive(Default)]
struct Vocab {
    ids: HashMap<String, u32>,
    words: Vec<String>,
}

impl WhitespaceTokenizer {
    pub fn new() -> Self {
        Self {
            vocab: RwLock::new(Vocab::default()),
        }
    }
}

impl Default for WhitespaceTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer for WhitespaceTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        let mut vocab = self.vocab.write().unwrap();
        text.split_whitespace()
            .map(|word| match vocab.ids.get(word) {
                Some(&id) => id,
                None => {
                    let id = vocab.words.len() as u32;
                    vocab.ids.insert(word.to_string(), id);
                    vocab.words.push(word.to_string());
                    id
                }
            })
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let vocab = self.vocab.read().unwrap();
        tokens
            .iter()
            .filter_map(|&id| vocab.words.get(id as usize).map(|w| w.as_str()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn name(&self) -> &str {
        "whitespace"
    }
}

/// Construct the tokenizer named in the chunking config.
pub fn create_tokenizer(name: &str) -> Result<Box<dyn Tokenizer>> {
    match name {
        "cl100k_base" => Ok(Box::new(TiktokenTokenizer::cl100k()?)),
        "whitespace" => Ok(Box::new(WhitespaceTokenizer::new())),
        other => Err(Error::Config(format!("unknown tokenizer: {}", other))),
    }
}
