//! LayerNorm built from primitive tensor ops.
//!
//! Statistics are computed in f32 and cast back. Every op has a backward
//! pass, so the encoder stays trainable end to end.

use candle_core::{D, DType, Result, Tensor};
use candle_nn::{Init, VarBuilder};

/// LayerNorm with learnable weight (init 1) and bias (init 0).
#[derive(Debug, Clone)]
pub struct LayerNorm {
    weight: Tensor,
    bias: Tensor,
    eps: f64,
}

impl LayerNorm {
    pub fn new(hidden_size: usize, eps: f64, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(hidden_size, "weight", Init::Const(1.0))?;
        let bias = vb.get_with_hints(hidden_size, "bias", Init::Const(0.0))?;
        Ok(Self { weight, bias, eps })
    }

    /// Normalize over the last axis.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let input_dtype = x.dtype();
        let x_f32 = x.to_dtype(DType::F32)?;

        let mean = x_f32.mean_keepdim(D::Minus1)?;
        let x_centered = x_f32.broadcast_sub(&mean)?;
        let variance = x_centered.sqr()?.mean_keepdim(D::Minus1)?;
        let x_normed = x_centered.broadcast_div(&(variance + self.eps)?.sqrt()?)?;
        let x_normed = x_normed.to_dtype(input_dtype)?;

        x_normed
            .broadcast_mul(&self.weight.to_dtype(input_dtype)?)?
            .broadcast_add(&self.bias.to_dtype(input_dtype)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    #[test]
    fn fresh_layer_norm_standardizes_rows() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let ln = LayerNorm::new(8, 1e-5, vb.pp("ln")).unwrap();

        let x = Tensor::randn(3f32, 2.0, (4, 8), &device).unwrap();
        let y = ln.forward(&x).unwrap();
        let means: Vec<f32> = y.mean(1).unwrap().to_vec1().unwrap();
        let vars: Vec<f32> = y.sqr().unwrap().mean(1).unwrap().to_vec1().unwrap();
        for (m, v) in means.iter().zip(&vars) {
            assert!(m.abs() < 1e-4);
            assert!((v - 1.0).abs() < 1e-2);
        }
    }
}
