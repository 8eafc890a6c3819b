use crate::error::DecodeError;

/// Asynchronous notifications from the engine's worker threads,
/// delivered through [`AudioPlayer::pop_event`](crate::AudioPlayer::pop_event).
///
/// Events originate on the render and decode threads but are only ever
/// consumed on the caller's thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
	/// The render callback consumed the first frame of an enqueued
	/// decoder. `sequence` increases by one per decoder started.
	RenderingStarted {
		sequence: u64,
	},
	/// A decoder failed. The decoder was marked finished and playback
	/// proceeds with the next queued decoder.
	DecoderError(DecodeError),
	/// The output device disappeared and could not be recovered.
	PlaybackInterrupted,
	/// The output stream was rebuilt with a new sample rate, either by
	/// request or because the device's format changed. Playback
	/// continues from the same source position.
	StreamFormatChanged {
		sample_rate: u32,
	},
}
