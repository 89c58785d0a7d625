//! VoiceCLIP in pure Rust.
//!
//! A candle-based contrastive dual encoder that embeds transcribed text
//! tokens and speech tokens into one latent space, so matched
//! (text, speech) pairs can be scored or trained against each other.
//!
//! ## Architecture
//!
//! ```text
//! text ids   → embedding + position → encoder (masked) → mean → projection ──┐
//!                                                                             ├→ L2 norm → exp(T) · similarity
//! speech ids → embedding + position → encoder          → mean → projection ──┘
//!                                                                                  ↓
//!                                                               scores [B]  or  symmetric CE loss
//! ```
//!
//! ## Modules
//!
//! - [`config`] — model configuration with documented defaults
//! - [`model`] — embeddings, encoder stack, pooling, similarity head, [`VoiceClip`]
//! - [`registry`] — name-keyed factory used by training harnesses

pub mod config;
pub mod model;
pub mod registry;

mod error;

pub use config::VoiceClipConfig;
pub use error::{Error, Result};
pub use model::voice_clip::{ClipOutput, VoiceClip};
pub use registry::{ModelKind, NetworkOptions, create_model};
