#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::collapsible_if)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::large_enum_variant)]
#![warn(clippy::todo)]

pub mod backend;
pub mod convert;
pub mod decoder;
mod error;
mod player;
mod resampler;
mod ring_buffer;
mod state;
mod sync;

pub use error::*;
pub use player::*;
pub use ring_buffer::*;

/// The maximum number of output channels the engine can address.
pub const MAX_OUTPUT_CHANNELS: usize = 32;

/// The maximum number of decoders that can be live (decoding or
/// rendering) at the same time. Decoders beyond this stay queued.
pub const ACTIVE_DECODER_CAPACITY: usize = 8;
