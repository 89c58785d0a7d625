//! Key-padding masks for bidirectional self-attention.
//!
//! A `[B, S]` padding mask (non-zero = real token) becomes an additive bias
//! `[B, 1, 1, S]` with 0.0 for visible keys and the dtype minimum for padded
//! keys. There is no causal component: every query sees every real key.

use candle_core::{DType, Result, Tensor};

/// Most negative finite value for `dtype`.
pub fn min_value(dtype: DType) -> f64 {
    match dtype {
        DType::F32 => f64::from(f32::MIN),
        DType::F16 => f64::from(half::f16::MIN),
        DType::BF16 => f64::from(half::bf16::MIN),
        DType::F64 => f64::MIN,
        _ => f64::from(f32::MIN),
    }
}

/// Normalise a padding mask of any numeric dtype to 0.0/1.0 in `dtype`.
pub fn to_keep_weights(mask: &Tensor, dtype: DType) -> Result<Tensor> {
    mask.ne(0u8)?.to_dtype(dtype)
}

/// Additive attention bias `[B, 1, 1, S]` from a `[B, S]` padding mask.
pub fn padding_bias(mask: &Tensor, dtype: DType) -> Result<Tensor> {
    let (batch, seq_len) = mask.dims2()?;
    let keep = to_keep_weights(mask, DType::F32)?;
    // (1 - keep) * min: 0 where visible, min where padded.
    let bias = (keep.affine(-1.0, 1.0)? * min_value(dtype))?;
    bias.reshape((batch, 1, 1, seq_len))?.to_dtype(dtype)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn all_true_mask_is_zero_bias() {
        let mask = Tensor::ones((2, 4), DType::U8, &Device::Cpu).unwrap();
        let bias = padding_bias(&mask, DType::F32).unwrap();
        assert_eq!(bias.dims(), &[2, 1, 1, 4]);
        let sum: f32 = bias.abs().unwrap().sum_all().unwrap().to_scalar().unwrap();
        assert!(sum < 1e-6);
    }

    #[test]
    fn padded_keys_get_large_negative_bias() {
        let mask = Tensor::new(&[[1u8, 1, 0], [1, 0, 0]], &Device::Cpu).unwrap();
        let bias = padding_bias(&mask, DType::F32).unwrap();
        let vals: Vec<f32> = bias.flatten_all().unwrap().to_vec1().unwrap();
        assert_eq!(vals[0], 0.0);
        assert_eq!(vals[1], 0.0);
        assert!(vals[2] < -1e30);
        assert_eq!(vals[3], 0.0);
        assert!(vals[4] < -1e30);
        assert!(vals[5] < -1e30);
    }

    #[test]
    fn keep_weights_accept_integer_masks() {
        let mask = Tensor::new(&[[3u32, 0, 1]], &Device::Cpu).unwrap();
        let keep: Vec<f32> = to_keep_weights(&mask, DType::F32)
            .unwrap()
            .flatten_all()
            .unwrap()
            .to_vec1()
            .unwrap();
        assert_eq!(keep, vec![1.0, 0.0, 1.0]);
    }
}
