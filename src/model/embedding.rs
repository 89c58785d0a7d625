//! Token + learned positional embedding.
//!
//! `[B, L]` ids → `content(ids) + positional(0..L)` → `[B, L, dim]`.
//! Ids and positions are range-checked before the lookup so a bad id
//! surfaces as [`Error::InvalidIndex`] instead of a backend panic.

use candle_core::{DType, Module, Tensor};
use candle_nn::VarBuilder;

use crate::{Error, Result};

/// Content and positional tables for one modality.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    /// Embedding(num_tokens, dim)
    tokens: candle_nn::Embedding,
    /// Embedding(num_positions, dim)
    positions: candle_nn::Embedding,
    num_tokens: usize,
    num_positions: usize,
    token_table: &'static str,
    position_table: &'static str,
}

impl TokenEmbedding {
    /// Load both tables.
    ///
    /// `token_name` / `position_name` are the weight prefixes, also used to
    /// name the table in lookup errors.
    pub fn load(
        vb: &VarBuilder,
        token_name: &'static str,
        position_name: &'static str,
        num_tokens: usize,
        num_positions: usize,
        dim: usize,
    ) -> Result<Self> {
        let tokens = candle_nn::embedding(num_tokens, dim, vb.pp(token_name))?;
        let positions = candle_nn::embedding(num_positions, dim, vb.pp(position_name))?;
        Ok(Self {
            tokens,
            positions,
            num_tokens,
            num_positions,
            token_table: token_name,
            position_table: position_name,
        })
    }

    pub fn num_tokens(&self) -> usize {
        self.num_tokens
    }

    pub fn num_positions(&self) -> usize {
        self.num_positions
    }

    /// Embed `[B, L]` ids into `[B, L, dim]`.
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        let (_batch, seq_len) = ids.dims2().map_err(|_| {
            Error::ShapeMismatch(format!(
                "token ids must be [batch, seq_len], got {:?}",
                ids.dims()
            ))
        })?;
        if seq_len > self.num_positions {
            return Err(Error::InvalidIndex {
                table: self.position_table,
                index: seq_len as i64 - 1,
                size: self.num_positions,
            });
        }

        let ids = self.checked_ids(ids)?;
        let content = self.tokens.forward(&ids)?;

        let pos_ids = Tensor::arange(0u32, seq_len as u32, ids.device())?;
        let pos = self.positions.forward(&pos_ids)?.unsqueeze(0)?; // [1, L, dim]
        Ok(content.broadcast_add(&pos)?)
    }

    /// Validate ids against the vocabulary and return them as `u32`.
    fn checked_ids(&self, ids: &Tensor) -> Result<Tensor> {
        if ids.elem_count() == 0 {
            return Ok(ids.to_dtype(DType::U32)?);
        }
        let wide = match ids.dtype() {
            DType::U8 | DType::U32 | DType::I64 => ids.to_dtype(DType::I64)?,
            other => {
                return Err(Error::ShapeMismatch(format!(
                    "token ids must be an integer tensor, got {other:?}"
                )));
            }
        };
        let flat = wide.flatten_all()?;
        let min = flat.min(0)?.to_scalar::<i64>()?;
        let max = flat.max(0)?.to_scalar::<i64>()?;
        if min < 0 {
            return Err(self.out_of_range(min));
        }
        if max as usize >= self.num_tokens {
            return Err(self.out_of_range(max));
        }
        Ok(wide.to_dtype(DType::U32)?)
    }

    fn out_of_range(&self, index: i64) -> Error {
        Error::InvalidIndex {
            table: self.token_table,
            index,
            size: self.num_tokens,
        }
    }
}
