//! Model components for VoiceCLIP.
//!
//! ## Components
//!
//! - [`embedding`] — token + learned positional embedding with range checks
//! - [`transformer`] — bidirectional pre-norm encoder stack
//! - [`pooling`] — plain and masked mean over the sequence axis
//! - [`head`] — latent projection, L2 normalization, temperature-scaled similarity and loss
//! - [`voice_clip`] — the full dual encoder

pub mod embedding;
pub mod head;
pub mod pooling;
pub mod transformer;
pub mod voice_clip;
