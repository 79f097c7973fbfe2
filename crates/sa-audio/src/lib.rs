//! Host audio output for the stimuli audio engine.
//!
//! The cpal stream callback is the engine's render callback: it owns the
//! [`sa_engine::Engine`] and renders straight into the device buffer.

mod cpal_backend;
mod traits;

pub use cpal_backend::CpalOutput;
pub use traits::{AudioError, AudioOutput, HostFormat};
