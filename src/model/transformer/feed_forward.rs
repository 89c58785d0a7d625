//! GEGLU feed-forward.
//!
//! ```text
//! x [B, S, dim]
//!   → proj_in (dim → 2*hidden)
//!   → chunk into (x, gate)
//!   → x * GELU(gate)
//!   → proj_out (hidden → dim)
//! ```

use candle_core::{D, Module, Tensor};
use candle_nn::VarBuilder;

use crate::Result;

/// Gated-GELU MLP used inside each encoder block.
#[derive(Debug, Clone)]
pub struct GegluFeedForward {
    /// Linear(dim, 2 * hidden)
    proj_in: candle_nn::Linear,
    /// Linear(hidden, dim)
    proj_out: candle_nn::Linear,
}

impl GegluFeedForward {
    pub fn load(vb: VarBuilder, dim: usize, hidden: usize) -> Result<Self> {
        let proj_in = candle_nn::linear(dim, hidden * 2, vb.pp("proj_in"))?;
        let proj_out = candle_nn::linear(hidden, dim, vb.pp("proj_out"))?;
        Ok(Self { proj_in, proj_out })
    }

    /// Input: `[B, S, dim]` → Output: `[B, S, dim]`
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let x = self.proj_in.forward(x)?;
        let chunks = x.chunk(2, D::Minus1)?;
        let value = &chunks[0];
        let gate = &chunks[1];
        let x = (value * gate.gelu_erf()?)?;
        self.proj_out.forward(&x).map_err(Into::into)
    }
}
