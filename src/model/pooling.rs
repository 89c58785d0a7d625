//! Sequence pooling: `[B, L, D]` → `[B, D]`.

use candle_core::{DType, Tensor};

use crate::model::transformer::mask::to_keep_weights;
use crate::{Error, Result};

/// Plain arithmetic mean over the sequence axis.
pub fn mean(hidden_states: &Tensor) -> Result<Tensor> {
    Ok(hidden_states.mean(1)?)
}

/// Mean over the unmasked positions only.
///
/// `mask`: `[B, L]`, non-zero for real tokens. An example with no real
/// token is rejected with [`Error::DegenerateMask`] rather than producing
/// a division by zero.
pub fn masked_mean(hidden_states: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let (batch, seq_len, _dim) = hidden_states.dims3()?;
    if mask.dims() != [batch, seq_len] {
        return Err(Error::ShapeMismatch(format!(
            "mask shape {:?} does not match sequence [{batch}, {seq_len}]",
            mask.dims()
        )));
    }

    let counts: Vec<u32> = to_keep_weights(mask, DType::U32)?.sum(1)?.to_vec1()?;
    if let Some(example) = counts.iter().position(|&c| c == 0) {
        return Err(Error::DegenerateMask { example });
    }

    let keep = to_keep_weights(mask, hidden_states.dtype())?;
    let summed = hidden_states
        .broadcast_mul(&keep.unsqueeze(2)?)? // zero padded positions
        .sum(1)?; // [B, D]
    let denom = keep.sum_keepdim(1)?; // [B, 1]
    Ok(summed.broadcast_div(&denom)?)
}

/// Masked mean when a mask is given, plain mean otherwise.
pub fn pool(hidden_states: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
    match mask {
        Some(mask) => masked_mean(hidden_states, mask),
        None => mean(hidden_states),
    }
}
