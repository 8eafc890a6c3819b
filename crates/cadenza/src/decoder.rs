//! The interface the engine consumes audio through.

#[cfg(test)]
pub(crate) mod mock;
#[cfg(feature = "symphonia")]
mod symphonia;

#[cfg(feature = "symphonia")]
pub use symphonia::SymphoniaDecoder;

use crate::{
	convert::{PcmChunk, SampleType},
	error::DecodeError,
};

/// The fixed format of a decoder's output.
///
/// A decoder's format never changes over its lifetime; a source that
/// switches formats mid-stream must be presented as a new decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
	/// Sample rate in Hz.
	pub sample_rate: u32,
	pub channel_count: u16,
	pub sample_type: SampleType,
	/// The decoder's natural packet size in frames, if it has one.
	pub frames_per_packet: Option<u32>,
}

/// The result of decoding one packet.
pub enum DecodeResponse {
	/// One packet of interleaved source-format PCM.
	Chunk(PcmChunk),
	/// The source has no more audio. Seeking is the only way back.
	EndOfStream,
}

/**
Decodes a finite stream of PCM packets.

Opening the source happens at construction; dropping the decoder closes
it. Decoders are consumed by the engine's decode thread and closed on
its collector thread, never on the realtime render thread.
*/
pub trait Decoder: Send {
	fn format(&self) -> SourceFormat;

	/// The total number of frames the source will produce.
	fn total_frames(&self) -> u64;

	fn supports_seeking(&self) -> bool;

	/**
	Repositions the source to `frame`.

	The requested frame is a target; a decoder may land earlier (for
	example on a packet boundary). Returns the frame actually reached.
	*/
	fn seek(&mut self, frame: u64) -> Result<u64, DecodeError>;

	/// Decodes the next packet of audio.
	fn decode(&mut self) -> Result<DecodeResponse, DecodeError>;
}
