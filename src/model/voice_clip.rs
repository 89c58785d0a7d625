//! VoiceCLIP: contrastive dual encoder over text tokens and speech tokens.
//!
//! ```text
//! text ids   → text_emb + text_pos_emb     → text_transformer   → (masked) mean → to_text_latent   ─┐
//!                                                                                                     ├→ normalize → exp(T)·sim
//! speech ids → speech_emb + speech_pos_emb → speech_transformer → mean          → to_speech_latent ─┘
//! ```

use candle_core::{Device, Tensor};
use candle_nn::VarBuilder;

use super::embedding::TokenEmbedding;
use super::head::{LatentProjection, SimilarityHead};
use super::pooling;
use super::transformer::SequenceEncoder;
use super::transformer::config::EncoderConfig;
use crate::config::VoiceClipConfig;
use crate::{Error, Result};

/// Result of [`VoiceClip::forward`].
#[derive(Debug, Clone)]
pub enum ClipOutput {
    /// `[B]` scaled similarity of each index-aligned (text, speech) pair.
    Scores(Tensor),
    /// Scalar symmetric contrastive loss.
    Loss(Tensor),
}

impl ClipOutput {
    pub fn into_tensor(self) -> Tensor {
        match self {
            ClipOutput::Scores(t) | ClipOutput::Loss(t) => t,
        }
    }
}

/// Text/speech contrastive model.
///
/// Owns every weight; [`forward`](Self::forward) only reads them. Training
/// updates happen through the `VarMap` behind the `VarBuilder` the model was
/// built from.
#[derive(Debug, Clone)]
pub struct VoiceClip {
    config: VoiceClipConfig,
    text_emb: TokenEmbedding,
    text_transformer: SequenceEncoder,
    to_text_latent: LatentProjection,
    speech_emb: TokenEmbedding,
    speech_transformer: SequenceEncoder,
    to_speech_latent: LatentProjection,
    head: SimilarityHead,
    device: Device,
}

impl VoiceClip {
    /// Build the model, loading or initialising weights from `vb`.
    pub fn new(config: VoiceClipConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let text_emb = TokenEmbedding::load(
            &vb,
            "text_emb",
            "text_pos_emb",
            config.num_text_tokens,
            config.text_seq_len,
            config.dim_text,
        )?;
        let text_transformer =
            SequenceEncoder::load(vb.pp("text_transformer"), EncoderConfig::text(&config))?;
        let to_text_latent =
            LatentProjection::load(vb.pp("to_text_latent"), config.dim_text, config.dim_latent)?;

        let speech_emb = TokenEmbedding::load(
            &vb,
            "speech_emb",
            "speech_pos_emb",
            config.num_speech_tokens,
            config.speech_pos_rows(),
            config.dim_speech,
        )?;
        let speech_transformer =
            SequenceEncoder::load(vb.pp("speech_transformer"), EncoderConfig::speech(&config))?;
        let to_speech_latent = LatentProjection::load(
            vb.pp("to_speech_latent"),
            config.dim_speech,
            config.dim_latent,
        )?;

        let head = SimilarityHead::load(vb.clone(), config.max_temperature)?;

        tracing::debug!(
            dim_text = config.dim_text,
            dim_speech = config.dim_speech,
            dim_latent = config.dim_latent,
            text_depth = text_transformer.depth(),
            speech_depth = speech_transformer.depth(),
            speech_pos_rows = speech_emb.num_positions(),
            "built VoiceCLIP"
        );

        Ok(Self {
            config,
            text_emb,
            text_transformer,
            to_text_latent,
            speech_emb,
            speech_transformer,
            to_speech_latent,
            head,
            device: vb.device().clone(),
        })
    }

    pub fn config(&self) -> &VoiceClipConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Current learned temperature (pre-exponent).
    pub fn temperature(&self) -> Result<f32> {
        self.head.temperature()
    }

    /// Unit-norm text latents `[B, dim_latent]`.
    ///
    /// - `text`: `[B, L]` ids, `L ≤ text_seq_len`
    /// - `text_mask`: optional `[B, L]`, non-zero for real tokens
    pub fn encode_text(&self, text: &Tensor, text_mask: Option<&Tensor>) -> Result<Tensor> {
        if let Some(mask) = text_mask
            && mask.dims() != text.dims()
        {
            return Err(Error::ShapeMismatch(format!(
                "text mask {:?} does not match text ids {:?}",
                mask.dims(),
                text.dims()
            )));
        }
        let h = self.text_emb.forward(text)?;
        let h = self.text_transformer.forward(&h, text_mask)?;
        let pooled = pooling::pool(&h, text_mask)?;
        self.to_text_latent.forward(&pooled)
    }

    /// Unit-norm speech latents `[B, dim_latent]`. Speech is never masked.
    pub fn encode_speech(&self, speech_tokens: &Tensor) -> Result<Tensor> {
        let h = self.speech_emb.forward(speech_tokens)?;
        let h = self.speech_transformer.forward(&h, None)?;
        let pooled = pooling::mean(&h)?;
        self.to_speech_latent.forward(&pooled)
    }

    /// Run both towers and either score aligned pairs or compute the loss.
    ///
    /// `text` and `speech_tokens` must share the batch size. In loss mode
    /// example `i`'s text is taken to match example `i`'s speech.
    pub fn forward(
        &self,
        text: &Tensor,
        speech_tokens: &Tensor,
        text_mask: Option<&Tensor>,
        return_loss: bool,
    ) -> Result<ClipOutput> {
        let (text_latents, speech_latents) = self.encode_pair(text, speech_tokens, text_mask)?;
        let batch = text_latents.dim(0)?;
        tracing::trace!(batch, return_loss, "VoiceCLIP forward");
        if return_loss {
            let loss = self
                .head
                .contrastive_loss(&text_latents, &speech_latents)?;
            Ok(ClipOutput::Loss(loss))
        } else {
            let scores = self.head.pair_scores(&text_latents, &speech_latents)?;
            Ok(ClipOutput::Scores(scores))
        }
    }

    /// Score mode: `[B]` scaled similarities of aligned pairs.
    pub fn score(
        &self,
        text: &Tensor,
        speech_tokens: &Tensor,
        text_mask: Option<&Tensor>,
    ) -> Result<Tensor> {
        Ok(self.forward(text, speech_tokens, text_mask, false)?.into_tensor())
    }

    /// Loss mode: scalar symmetric contrastive loss.
    pub fn loss(
        &self,
        text: &Tensor,
        speech_tokens: &Tensor,
        text_mask: Option<&Tensor>,
    ) -> Result<Tensor> {
        Ok(self.forward(text, speech_tokens, text_mask, true)?.into_tensor())
    }

    /// Full `[B_text, B_speech]` scaled similarity matrix, for retrieval.
    ///
    /// Unlike [`forward`](Self::forward) the two batches may differ in size.
    pub fn similarity(
        &self,
        text: &Tensor,
        speech_tokens: &Tensor,
        text_mask: Option<&Tensor>,
    ) -> Result<Tensor> {
        let text_latents = self.encode_text(text, text_mask)?;
        let speech_latents = self.encode_speech(speech_tokens)?;
        self.head.similarity_matrix(&text_latents, &speech_latents)
    }

    /// Similarity matrix between already-computed latents.
    pub fn similarity_from_latents(
        &self,
        text_latents: &Tensor,
        speech_latents: &Tensor,
    ) -> Result<Tensor> {
        self.head.similarity_matrix(text_latents, speech_latents)
    }

    fn encode_pair(
        &self,
        text: &Tensor,
        speech_tokens: &Tensor,
        text_mask: Option<&Tensor>,
    ) -> Result<(Tensor, Tensor)> {
        let b_text = text.dims().first().copied().unwrap_or(0);
        let b_speech = speech_tokens.dims().first().copied().unwrap_or(0);
        if b_text != b_speech {
            return Err(Error::ShapeMismatch(format!(
                "batch sizes differ: text {b_text}, speech {b_speech}"
            )));
        }
        if b_text == 0 {
            return Err(Error::ShapeMismatch("empty batch".to_string()));
        }
        let text_latents = self.encode_text(text, text_mask)?;
        let speech_latents = self.encode_speech(speech_tokens)?;
        Ok((text_latents, speech_latents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PositionTableSize;
    use candle_core::DType;
    use candle_nn::VarMap;

    fn small_config() -> VoiceClipConfig {
        VoiceClipConfig {
            dim_text: 16,
            dim_speech: 24,
            dim_latent: 8,
            num_text_tokens: 50,
            text_enc_depth: 1,
            text_seq_len: 12,
            text_heads: 2,
            num_speech_tokens: 40,
            speech_enc_depth: 2,
            speech_heads: 3,
            speech_seq_len: 10,
            dim_head: 8,
            ff_mult: 2,
            ..VoiceClipConfig::default()
        }
    }

    fn build(cfg: VoiceClipConfig) -> (VarMap, VoiceClip) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = VoiceClip::new(cfg, vb).unwrap();
        (varmap, model)
    }

    fn ids(rows: &[&[u32]]) -> Tensor {
        let b = rows.len();
        let l = rows[0].len();
        let flat: Vec<u32> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Tensor::from_vec(flat, (b, l), &Device::Cpu).unwrap()
    }

    #[test]
    fn registers_expected_weight_names() {
        let (varmap, _model) = build(small_config());
        let data = varmap.data().lock().unwrap();
        for name in [
            "text_emb.weight",
            "text_pos_emb.weight",
            "to_text_latent.weight",
            "speech_emb.weight",
            "speech_pos_emb.weight",
            "to_speech_latent.weight",
            "temperature",
            "text_transformer.layers.0.attn.to_qkv.weight",
            "speech_transformer.layers.1.ff.proj_out.weight",
        ] {
            assert!(data.contains_key(name), "missing {name}");
        }
        assert_eq!(data["text_pos_emb.weight"].dims(), &[12, 16]);
        assert_eq!(data["speech_pos_emb.weight"].dims(), &[10, 24]);
        assert_eq!(data["to_speech_latent.weight"].dims(), &[8, 24]);
    }

    #[test]
    fn legacy_speech_position_table_is_vocab_sized() {
        let cfg = VoiceClipConfig {
            speech_pos_table: PositionTableSize::NumTokens,
            ..small_config()
        };
        let (varmap, _model) = build(cfg);
        let data = varmap.data().lock().unwrap();
        assert_eq!(data["speech_pos_emb.weight"].dims(), &[40, 24]);
    }

    #[test]
    fn score_mode_returns_one_score_per_pair() {
        let (_varmap, model) = build(small_config());
        let text = ids(&[&[1, 2, 3, 4], &[5, 6, 7, 8], &[9, 10, 11, 12]]);
        let speech = ids(&[&[1, 2, 3], &[4, 5, 6], &[7, 8, 9]]);
        let out = model.forward(&text, &speech, None, false).unwrap();
        let ClipOutput::Scores(scores) = out else {
            panic!("expected scores");
        };
        let scores: Vec<f32> = scores.to_vec1().unwrap();
        assert_eq!(scores.len(), 3);
        assert!(scores.iter().all(|s| s.is_finite()));
        // |cos| ≤ 1, scaled by e.
        assert!(scores.iter().all(|s| s.abs() <= std::f32::consts::E + 1e-4));
    }

    #[test]
    fn loss_mode_returns_non_negative_scalar() {
        let (_varmap, model) = build(small_config());
        let text = ids(&[&[1, 2, 3, 4], &[5, 6, 7, 8]]);
        let speech = ids(&[&[1, 2, 3], &[4, 5, 6]]);
        let loss = model.loss(&text, &speech, None).unwrap();
        assert_eq!(loss.rank(), 0);
        let loss: f32 = loss.to_scalar().unwrap();
        assert!(loss.is_finite());
        assert!(loss >= 0.0);
    }

    #[test]
    fn latents_are_unit_norm() {
        let (_varmap, model) = build(small_config());
        let text = ids(&[&[1, 2, 3, 4], &[5, 6, 0, 0]]);
        let mask = ids(&[&[1, 1, 1, 1], &[1, 1, 0, 0]]);
        let speech = ids(&[&[1, 2, 3], &[4, 5, 6]]);
        for latent in [
            model.encode_text(&text, Some(&mask)).unwrap(),
            model.encode_text(&text, None).unwrap(),
            model.encode_speech(&speech).unwrap(),
        ] {
            let norms: Vec<f32> = latent
                .sqr()
                .unwrap()
                .sum(1)
                .unwrap()
                .sqrt()
                .unwrap()
                .to_vec1()
                .unwrap();
            for n in norms {
                assert!((n - 1.0).abs() < 1e-4, "norm {n}");
            }
        }
    }

    #[test]
    fn padded_text_tokens_do_not_change_masked_latent() {
        let (_varmap, model) = build(small_config());
        let mask = ids(&[&[1, 1, 1, 0, 0]]);
        let a = ids(&[&[3, 4, 5, 0, 0]]);
        let b = ids(&[&[3, 4, 5, 17, 42]]);
        let la = model.encode_text(&a, Some(&mask)).unwrap();
        let lb = model.encode_text(&b, Some(&mask)).unwrap();
        let diff: f32 = (la - lb)
            .unwrap()
            .abs()
            .unwrap()
            .sum_all()
            .unwrap()
            .to_scalar()
            .unwrap();
        assert!(diff < 1e-5);
    }

    #[test]
    fn mismatched_batch_is_rejected() {
        let (_varmap, model) = build(small_config());
        let text = ids(&[&[1, 2], &[3, 4]]);
        let speech = ids(&[&[1, 2, 3]]);
        assert!(matches!(
            model.forward(&text, &speech, None, true),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let (_varmap, model) = build(small_config());
        let text = ids(&[&[1, 2, 3]]);
        let mask = ids(&[&[1, 1]]);
        let speech = ids(&[&[1, 2, 3]]);
        assert!(matches!(
            model.forward(&text, &speech, Some(&mask), false),
            Err(Error::ShapeMismatch(_))
        ));
    }

    #[test]
    fn degenerate_mask_is_reported() {
        let (_varmap, model) = build(small_config());
        let text = ids(&[&[1, 2, 3], &[4, 5, 6]]);
        let mask = ids(&[&[1, 1, 1], &[0, 0, 0]]);
        let speech = ids(&[&[1, 2], &[3, 4]]);
        assert!(matches!(
            model.forward(&text, &speech, Some(&mask), true),
            Err(Error::DegenerateMask { example: 1 })
        ));
    }

    #[test]
    fn out_of_vocab_speech_id_is_invalid_index() {
        let (_varmap, model) = build(small_config());
        let text = ids(&[&[1, 2, 3]]);
        let speech = ids(&[&[1, 40]]);
        assert!(matches!(
            model.forward(&text, &speech, None, false),
            Err(Error::InvalidIndex {
                table: "speech_emb",
                index: 40,
                size: 40
            })
        ));
    }

    #[test]
    fn similarity_matrix_diagonal_matches_scores() {
        let (_varmap, model) = build(small_config());
        let text = ids(&[&[1, 2, 3], &[4, 5, 6]]);
        let speech = ids(&[&[7, 8], &[9, 10]]);
        let sim: Vec<Vec<f32>> = model
            .similarity(&text, &speech, None)
            .unwrap()
            .to_vec2()
            .unwrap();
        let scores: Vec<f32> = model
            .score(&text, &speech, None)
            .unwrap()
            .to_vec1()
            .unwrap();
        for i in 0..2 {
            assert!((sim[i][i] - scores[i]).abs() < 1e-5);
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let cfg = VoiceClipConfig {
            dim_latent: 0,
            ..small_config()
        };
        assert!(matches!(VoiceClip::new(cfg, vb), Err(Error::Config(_))));
    }
}
