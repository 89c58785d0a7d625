//! Name-keyed model factory.
//!
//! A training harness describes the network it wants as JSON:
//!
//! ```json
//! {"which_model": "voice_clip", "kwargs": {"dim_latent": 256}}
//! ```
//!
//! [`create_model`] resolves `which_model` against [`ModelKind`] and builds
//! the model from the typed `kwargs` (missing keys take their defaults,
//! a missing `kwargs` means all defaults).

use std::fmt;
use std::path::Path;

use candle_nn::VarBuilder;
use serde::{Deserialize, Serialize};

use crate::config::VoiceClipConfig;
use crate::model::voice_clip::VoiceClip;
use crate::{Error, Result};

/// Registered model kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    /// Text/speech contrastive dual encoder.
    VoiceClip,
}

impl ModelKind {
    /// All registered kinds.
    pub fn all() -> &'static [ModelKind] {
        &[ModelKind::VoiceClip]
    }

    /// Canonical identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::VoiceClip => "voice_clip",
        }
    }

    /// Parse an identifier, accepting common spellings.
    pub fn from_str_loose(s: &str) -> Option<ModelKind> {
        match s.to_lowercase().as_str() {
            "voice_clip" | "voiceclip" | "voice-clip" => Some(ModelKind::VoiceClip),
            _ => None,
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Network options as handed over by the training harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkOptions {
    /// Registry identifier, see [`ModelKind::from_str_loose`].
    pub which_model: String,
    /// Constructor configuration.
    #[serde(default)]
    pub kwargs: VoiceClipConfig,
}

impl Default for NetworkOptions {
    fn default() -> Self {
        Self {
            which_model: ModelKind::VoiceClip.as_str().to_string(),
            kwargs: VoiceClipConfig::default(),
        }
    }
}

impl NetworkOptions {
    /// Load options from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Resolve `which_model`.
    pub fn kind(&self) -> Result<ModelKind> {
        ModelKind::from_str_loose(&self.which_model)
            .ok_or_else(|| Error::UnknownModel(self.which_model.clone()))
    }
}

/// Build the model named by `opts`, loading or initialising weights from `vb`.
pub fn create_model(opts: &NetworkOptions, vb: VarBuilder) -> Result<VoiceClip> {
    match opts.kind()? {
        ModelKind::VoiceClip => {
            tracing::info!(model = %ModelKind::VoiceClip, "constructing registered model");
            VoiceClip::new(opts.kwargs.clone(), vb)
        }
    }
}
