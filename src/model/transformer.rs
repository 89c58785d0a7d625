//! Bidirectional sequence encoder.
//!
//! A stack of pre-norm blocks shared by the text and speech towers:
//! - Multi-head self-attention with key-padding mask, no causal restriction
//! - GEGLU feed-forward
//! - LayerNorm before each sub-layer, residual after
//!
//! ## Config (default towers)
//!
//! ```text
//! dim:       512
//! depth:     6
//! heads:     8
//! dim_head:  64
//! ff_mult:   4
//! ```

pub mod attention;
pub mod config;
pub mod feed_forward;
pub mod mask;
pub mod norm;

use candle_core::Tensor;
use candle_nn::VarBuilder;

use crate::{Error, Result};
use attention::SelfAttention;
use config::EncoderConfig;
use feed_forward::GegluFeedForward;
use norm::LayerNorm;

/// One encoder block: `x + attn(ln(x))`, then `x + ff(ln(x))`.
#[derive(Debug, Clone)]
pub struct EncoderBlock {
    attn_norm: LayerNorm,
    attn: SelfAttention,
    ff_norm: LayerNorm,
    ff: GegluFeedForward,
}

impl EncoderBlock {
    pub fn load(vb: VarBuilder, config: &EncoderConfig) -> Result<Self> {
        let attn_norm = LayerNorm::new(config.dim, config.layer_norm_eps, vb.pp("attn_norm"))?;
        let attn = SelfAttention::load(vb.pp("attn"), config.dim, config.heads, config.dim_head)?;
        let ff_norm = LayerNorm::new(config.dim, config.layer_norm_eps, vb.pp("ff_norm"))?;
        let ff = GegluFeedForward::load(vb.pp("ff"), config.dim, config.ff_hidden())?;
        Ok(Self {
            attn_norm,
            attn,
            ff_norm,
            ff,
        })
    }

    /// - `hidden_states`: `[B, S, dim]`
    /// - `padding_bias`: optional `[B, 1, 1, S]`
    pub fn forward(&self, hidden_states: &Tensor, padding_bias: Option<&Tensor>) -> Result<Tensor> {
        let residual = hidden_states;
        let h = self.attn_norm.forward(hidden_states)?;
        let h = self.attn.forward(&h, padding_bias)?;
        let h = (residual + h)?;

        let residual = &h;
        let out = self.ff_norm.forward(&h)?;
        let out = self.ff.forward(&out)?;
        Ok((residual + out)?)
    }
}

/// Shape-preserving, mask-respecting, non-causal encoder stack.
#[derive(Debug, Clone)]
pub struct SequenceEncoder {
    config: EncoderConfig,
    layers: Vec<EncoderBlock>,
}

impl SequenceEncoder {
    pub fn load(vb: VarBuilder, config: EncoderConfig) -> Result<Self> {
        let mut layers = Vec::with_capacity(config.depth);
        for i in 0..config.depth {
            layers.push(EncoderBlock::load(vb.pp(format!("layers.{i}")), &config)?);
        }
        Ok(Self { config, layers })
    }

    /// Encode `[B, S, dim]` → `[B, S, dim]`.
    ///
    /// `mask`: optional `[B, S]` padding mask, non-zero for real tokens.
    /// Padded positions are excluded as keys; their own outputs are still
    /// produced and left to the caller's pooling to ignore.
    pub fn forward(&self, hidden_states: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let (batch, seq_len, dim) = hidden_states.dims3()?;
        if dim != self.config.dim {
            return Err(Error::ShapeMismatch(format!(
                "encoder expects width {}, got {dim}",
                self.config.dim
            )));
        }

        let bias = match mask {
            Some(mask) => {
                if mask.dims() != [batch, seq_len] {
                    return Err(Error::ShapeMismatch(format!(
                        "mask shape {:?} does not match sequence [{batch}, {seq_len}]",
                        mask.dims()
                    )));
                }
                Some(mask::padding_bias(mask, hidden_states.dtype())?)
            }
            None => None,
        };

        let mut h = hidden_states.clone();
        for layer in &self.layers {
            h = layer.forward(&h, bias.as_ref())?;
        }
        Ok(h)
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}
