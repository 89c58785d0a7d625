//! Configuration for the VoiceCLIP model.
//!
//! Field names and defaults match the keyword arguments accepted by the
//! training harness (`kwargs` in the network options).

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// How the speech positional embedding table is sized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionTableSize {
    /// One row per position up to `speech_seq_len`.
    #[default]
    SeqLen,
    /// One row per speech token id (`num_speech_tokens` rows). Needed to load
    /// weights trained with the legacy table shape.
    NumTokens,
}

/// Model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VoiceClipConfig {
    // --- Latent space ---
    pub dim_text: usize,
    pub dim_speech: usize,
    pub dim_latent: usize,

    // --- Text encoder ---
    pub num_text_tokens: usize,
    pub text_enc_depth: usize,
    pub text_seq_len: usize,
    pub text_heads: usize,

    // --- Speech encoder ---
    pub num_speech_tokens: usize,
    pub speech_enc_depth: usize,
    pub speech_heads: usize,
    pub speech_seq_len: usize,

    // --- Encoder block ---
    /// Width of each attention head.
    pub dim_head: usize,
    /// Feed-forward expansion factor.
    pub ff_mult: usize,
    pub layer_norm_eps: f64,

    // --- Quirks ---
    pub speech_pos_table: PositionTableSize,
    /// Upper bound applied to `temperature` before exponentiation.
    /// `None` leaves it unbounded.
    pub max_temperature: Option<f64>,
}

impl Default for VoiceClipConfig {
    fn default() -> Self {
        Self {
            dim_text: 512,
            dim_speech: 512,
            dim_latent: 512,
            num_text_tokens: 10000,
            text_enc_depth: 6,
            text_seq_len: 200,
            text_heads: 8,
            num_speech_tokens: 8192,
            speech_enc_depth: 6,
            speech_heads: 8,
            speech_seq_len: 250,
            dim_head: 64,
            ff_mult: 4,
            layer_norm_eps: 1e-5,
            speech_pos_table: PositionTableSize::SeqLen,
            max_temperature: None,
        }
    }
}

impl VoiceClipConfig {
    /// Number of rows in the speech positional table.
    pub fn speech_pos_rows(&self) -> usize {
        match self.speech_pos_table {
            PositionTableSize::SeqLen => self.speech_seq_len,
            PositionTableSize::NumTokens => self.num_speech_tokens,
        }
    }

    /// Check every size is positive.
    pub fn validate(&self) -> Result<()> {
        let sizes = [
            ("dim_text", self.dim_text),
            ("dim_speech", self.dim_speech),
            ("dim_latent", self.dim_latent),
            ("num_text_tokens", self.num_text_tokens),
            ("text_enc_depth", self.text_enc_depth),
            ("text_seq_len", self.text_seq_len),
            ("text_heads", self.text_heads),
            ("num_speech_tokens", self.num_speech_tokens),
            ("speech_enc_depth", self.speech_enc_depth),
            ("speech_heads", self.speech_heads),
            ("speech_seq_len", self.speech_seq_len),
            ("dim_head", self.dim_head),
            ("ff_mult", self.ff_mult),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(Error::Config(format!("{name} must be positive")));
        }
        if self.layer_norm_eps.is_nan() || self.layer_norm_eps <= 0.0 {
            return Err(Error::Config(format!(
                "layer_norm_eps must be positive, got {}",
                self.layer_norm_eps
            )));
        }
        if let Some(max) = self.max_temperature
            && !max.is_finite()
        {
            return Err(Error::Config(format!(
                "max_temperature must be finite, got {max}"
            )));
        }
        Ok(())
    }
}
