//! Latent projection and the temperature-scaled similarity head.
//!
//! ```text
//! pooled [B, d] → to_latent (no bias) → l2_normalize → [B, dim_latent]
//! score:  Σ(t ⊙ s) · exp(temperature)                 → [B]
//! matrix: t · sᵀ · exp(temperature)                  → [B, B]
//! loss:   (CE(matrix, arange B) + CE(matrixᵀ, arange B)) / 2
//! ```

use candle_core::{D, DType, Module, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::{Error, Result};

/// Norm floor used by [`l2_normalize`].
pub const NORM_EPS: f64 = 1e-12;

/// Initial (pre-exponent) temperature.
pub const INITIAL_TEMPERATURE: f64 = 1.0;

/// Divide each row by its L2 norm, floored at [`NORM_EPS`].
pub fn l2_normalize(x: &Tensor) -> Result<Tensor> {
    let norm = x.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?.maximum(NORM_EPS)?;
    Ok(x.broadcast_div(&norm)?)
}

/// Bias-free map from encoder width to the shared latent width, followed by
/// L2 normalization.
#[derive(Debug, Clone)]
pub struct LatentProjection {
    proj: candle_nn::Linear,
}

impl LatentProjection {
    pub fn load(vb: VarBuilder, dim_in: usize, dim_latent: usize) -> Result<Self> {
        let proj = candle_nn::linear_no_bias(dim_in, dim_latent, vb)?;
        Ok(Self { proj })
    }

    /// `[B, dim_in]` → unit-norm `[B, dim_latent]`.
    pub fn forward(&self, pooled: &Tensor) -> Result<Tensor> {
        let latent = self.proj.forward(pooled)?;
        l2_normalize(&latent)
    }
}

/// Learned temperature plus the score / loss computations.
#[derive(Debug, Clone)]
pub struct SimilarityHead {
    /// Scalar parameter, used as `exp(temperature)`.
    temperature: Tensor,
    max_temperature: Option<f64>,
}

impl SimilarityHead {
    /// Load (or initialise to [`INITIAL_TEMPERATURE`]) the `temperature` scalar.
    pub fn load(vb: VarBuilder, max_temperature: Option<f64>) -> Result<Self> {
        let temperature =
            vb.get_with_hints((), "temperature", Init::Const(INITIAL_TEMPERATURE))?;
        Ok(Self {
            temperature,
            max_temperature,
        })
    }

    /// Current temperature (before any clamp or exponent).
    pub fn temperature(&self) -> Result<f32> {
        Ok(self.temperature.to_dtype(DType::F32)?.to_scalar::<f32>()?)
    }

    /// `exp(temperature)`, with the optional upper clamp applied first.
    pub fn scale(&self) -> Result<Tensor> {
        let t = match self.max_temperature {
            Some(max) => self.temperature.minimum(max)?,
            None => self.temperature.clone(),
        };
        Ok(t.exp()?)
    }

    /// Per-pair scaled dot products of index-aligned latents: `[B]`.
    pub fn pair_scores(&self, text: &Tensor, speech: &Tensor) -> Result<Tensor> {
        check_pair(text, speech)?;
        let dots = (text * speech)?.sum(D::Minus1)?;
        Ok(dots.broadcast_mul(&self.scale()?)?)
    }

    /// Full scaled similarity matrix `[B_text, B_speech]`.
    pub fn similarity_matrix(&self, text: &Tensor, speech: &Tensor) -> Result<Tensor> {
        let (_, d_text) = text.dims2()?;
        let (_, d_speech) = speech.dims2()?;
        if d_text != d_speech {
            return Err(Error::ShapeMismatch(format!(
                "latent widths differ: text {d_text}, speech {d_speech}"
            )));
        }
        let sim = text.matmul(&speech.t()?)?;
        Ok(sim.broadcast_mul(&self.scale()?)?)
    }

    /// Symmetric contrastive loss; the diagonal holds the matched pairs.
    pub fn contrastive_loss(&self, text: &Tensor, speech: &Tensor) -> Result<Tensor> {
        let batch = check_pair(text, speech)?;
        let sim = self.similarity_matrix(text, speech)?;
        symmetric_cross_entropy(&sim, batch)
    }
}

/// Mean of the row-wise and column-wise cross-entropies against `arange(batch)`.
pub fn symmetric_cross_entropy(sim: &Tensor, batch: usize) -> Result<Tensor> {
    let labels = Tensor::arange(0u32, batch as u32, sim.device())?;
    let text_to_speech = candle_nn::loss::cross_entropy(sim, &labels)?;
    let speech_to_text = candle_nn::loss::cross_entropy(&sim.t()?.contiguous()?, &labels)?;
    Ok(((text_to_speech + speech_to_text)? / 2.0)?)
}

/// Both sides must be `[B, D]` with the same `B ≥ 1` and `D`.
fn check_pair(text: &Tensor, speech: &Tensor) -> Result<usize> {
    let (b_text, d_text) = text.dims2()?;
    let (b_speech, d_speech) = speech.dims2()?;
    if b_text != b_speech || d_text != d_speech {
        return Err(Error::ShapeMismatch(format!(
            "text latents [{b_text}, {d_text}] vs speech latents [{b_speech}, {d_speech}]"
        )));
    }
    if b_text == 0 {
        return Err(Error::ShapeMismatch("empty batch".to_string()));
    }
    Ok(b_text)
}
