//! Real-time render engine for auditory stimuli.
//!
//! A controller thread publishes tone and buffer slot parameters through
//! [`ParamWriter`]; the host audio callback drives [`Engine`], which reads
//! them lock-free, synthesizes and mixes every active slot and advances the
//! sample clock. Nothing on the render path blocks or allocates.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod buffer_player;
mod engine;
mod fault;
mod mixer;
mod oscillator;
mod ramp;
mod scheduler;
mod shared;

pub use engine::{Engine, EngineSettings, EngineState};
pub use fault::{FaultReason, FaultReceiver, SlotFault, SlotRef};
pub use mixer::{route_gains, to_i16, to_u16, RouteGains};
pub use oscillator::{phase_increment, wrap_phase, NoiseSource, Oscillator};
pub use shared::{shared_state, ParamReader, ParamWriter, Transport, MAX_TRIAL_COUNTER};
