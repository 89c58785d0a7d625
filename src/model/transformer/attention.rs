//! Multi-head bidirectional self-attention.
//!
//! ```text
//! x [B, S, dim] → to_qkv (no bias) → q, k, v [B, H, S, dim_head]
//! softmax(q·kᵀ / √dim_head + padding_bias) · v → to_out → [B, S, dim]
//! ```

use candle_core::{D, Module, Tensor};
use candle_nn::VarBuilder;

use crate::Result;

/// Scaled dot-product self-attention with an optional key-padding bias.
#[derive(Debug, Clone)]
pub struct SelfAttention {
    /// Linear(dim, 3 * inner_dim, bias=False)
    to_qkv: candle_nn::Linear,
    /// Linear(inner_dim, dim)
    to_out: candle_nn::Linear,
    num_heads: usize,
    head_dim: usize,
}

impl SelfAttention {
    pub fn load(vb: VarBuilder, dim: usize, num_heads: usize, head_dim: usize) -> Result<Self> {
        let inner_dim = num_heads * head_dim;
        let to_qkv = candle_nn::linear_no_bias(dim, inner_dim * 3, vb.pp("to_qkv"))?;
        let to_out = candle_nn::linear(inner_dim, dim, vb.pp("to_out"))?;
        Ok(Self {
            to_qkv,
            to_out,
            num_heads,
            head_dim,
        })
    }

    /// Forward pass.
    ///
    /// - `hidden_states`: `[B, S, dim]`
    /// - `padding_bias`: `[B, 1, 1, S]` additive bias from
    ///   [`padding_bias`](super::mask::padding_bias)
    ///
    /// Returns `[B, S, dim]`.
    pub fn forward(&self, hidden_states: &Tensor, padding_bias: Option<&Tensor>) -> Result<Tensor> {
        let (batch, seq_len, _dim) = hidden_states.dims3()?;

        let qkv = self.to_qkv.forward(hidden_states)?;
        let chunks = qkv.chunk(3, D::Minus1)?;

        // [B, S, H*D] → [B, H, S, D]
        let split_heads = |t: &Tensor| -> candle_core::Result<Tensor> {
            t.reshape((batch, seq_len, self.num_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };
        let q = split_heads(&chunks[0])?;
        let k = split_heads(&chunks[1])?;
        let v = split_heads(&chunks[2])?;

        let scale = (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.transpose(2, 3)?.contiguous()?)? / scale)?;
        let scores = match padding_bias {
            Some(bias) => scores.broadcast_add(bias)?,
            None => scores,
        };

        let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
        let out = weights.matmul(&v)?; // [B, H, S, D]

        let out = out
            .transpose(1, 2)? // [B, S, H, D]
            .reshape((batch, seq_len, self.num_heads * self.head_dim))?;

        self.to_out.forward(&out).map_err(Into::into)
    }
}
