//! Encoder stack configuration.

use crate::config::VoiceClipConfig;

/// Shape of one [`SequenceEncoder`](super::SequenceEncoder) stack.
///
/// Built from [`VoiceClipConfig`] per modality; the text and speech stacks
/// share `dim_head`, `ff_mult` and `layer_norm_eps`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConfig {
    /// Model width (`dim_text` or `dim_speech`).
    pub dim: usize,
    /// Number of blocks.
    pub depth: usize,
    pub heads: usize,
    pub dim_head: usize,
    pub ff_mult: usize,
    pub layer_norm_eps: f64,
}

impl EncoderConfig {
    pub fn text(cfg: &VoiceClipConfig) -> Self {
        Self {
            dim: cfg.dim_text,
            depth: cfg.text_enc_depth,
            heads: cfg.text_heads,
            dim_head: cfg.dim_head,
            ff_mult: cfg.ff_mult,
            layer_norm_eps: cfg.layer_norm_eps,
        }
    }

    pub fn speech(cfg: &VoiceClipConfig) -> Self {
        Self {
            dim: cfg.dim_speech,
            depth: cfg.speech_enc_depth,
            heads: cfg.speech_heads,
            dim_head: cfg.dim_head,
            ff_mult: cfg.ff_mult,
            layer_norm_eps: cfg.layer_norm_eps,
        }
    }

    /// Attention width (heads × dim_head).
    pub fn inner_dim(&self) -> usize {
        self.heads * self.dim_head
    }

    /// Feed-forward hidden width.
    pub fn ff_hidden(&self) -> usize {
        self.dim * self.ff_mult
    }
}
