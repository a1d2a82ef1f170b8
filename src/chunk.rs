//! Overlapping token-window chunker.
//!
//! Splits verified source text into fixed-size token windows with a
//! configurable overlap, so no semantic unit is lost at a boundary.
//! Window *i* covers tokens `[i*stride, i*stride + chunk_size)` where
//! `stride = chunk_size - overlap`, clipped to the text length; windows
//! are produced for every start below the token count.
//!
//! Output is fully deterministic for a given tokenizer and parameter
//! set, and the parameters are recorded on each [`Chunk`] so a run can
//! be reproduced later.

use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkingParams};
use crate::tokenize::Tokenizer;

/// Split text into overlapping token windows.
///
/// Empty text yields zero chunks. Fails with
/// [`Error::InvalidChunkParams`] if `chunk_size == 0` or
/// `overlap >= chunk_size`.
pub fn chunk_text(
    tokenizer: &dyn Tokenizer,
    source_id: &str,
    text: &str,
    params: ChunkingParams,
) -> Result<Vec<Chunk>> {
    if params.chunk_size == 0 || params.overlap >= params.chunk_size {
        return Err(Error::InvalidChunkParams {
            chunk_size: params.chunk_size,
            overlap: params.overlap,
        });
    }

    let tokens = tokenizer.encode(text);
    if tokens.is_empty() {
        return Ok(Vec::new());
    }

    let stride = params.stride();
    let mut chunks = Vec::new();

    let mut start = 0usize;
    let mut index = 0usize;
    while start < tokens.len() {
        let end = (start + params.chunk_size).min(tokens.len());
        let window = &tokens[start..end];
        chunks.push(Chunk {
            source_id: source_id.to_string(),
            index,
            token_count: window.len(),
            text: tokenizer.decode(window),
            params,
        });
        index += 1;
        start += stride;
    }

    Ok(chunks)
}
