use std::{
	error::Error,
	fmt::{Display, Formatter},
};

/// Errors that can occur when controlling playback.
#[derive(Debug)]
pub enum PlaybackError {
	/// The requested format cannot be produced by the current
	/// converter chain, or a decoder's source format does not fit
	/// the engine's output configuration.
	FormatUnsupported,
	/// No usable output device is available.
	DeviceUnavailable,
	/// The output device is held exclusively by another process.
	DeviceBusy,
	/// The output device rejected the requested stream configuration.
	StreamUnsupported,
	/// A decoder reported a fatal error.
	DecoderFailed(DecodeError),
	/// The current decoder does not support seeking.
	SeekUnsupported,
	/// A bounded wait on another thread elapsed before the operation
	/// completed.
	Timeout,
	/// An argument was out of range for the current configuration.
	InvalidArgument,
	/// The operation requires a current decoder and there is none.
	NotPlaying,
	/// An internal invariant was violated. This indicates a bug in the
	/// engine, not a recoverable condition.
	FatalInternal,
}

impl Display for PlaybackError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			PlaybackError::FormatUnsupported => {
				f.write_str("The requested audio format is not supported")
			}
			PlaybackError::DeviceUnavailable => f.write_str("No usable output device is available"),
			PlaybackError::DeviceBusy => {
				f.write_str("The output device is held exclusively by another process")
			}
			PlaybackError::StreamUnsupported => {
				f.write_str("The output device rejected the stream configuration")
			}
			PlaybackError::DecoderFailed(error) => write!(f, "The decoder failed: {error}"),
			PlaybackError::SeekUnsupported => {
				f.write_str("The current decoder does not support seeking")
			}
			PlaybackError::Timeout => f.write_str("Timed out waiting for the operation to complete"),
			PlaybackError::InvalidArgument => f.write_str("Argument out of range"),
			PlaybackError::NotPlaying => f.write_str("No decoder is currently playing"),
			PlaybackError::FatalInternal => f.write_str("Internal playback engine error"),
		}
	}
}

impl Error for PlaybackError {}

impl From<DecodeError> for PlaybackError {
	fn from(error: DecodeError) -> Self {
		PlaybackError::DecoderFailed(error)
	}
}

/// An error reported by a [`Decoder`](crate::decoder::Decoder).
///
/// Decoder errors never stop the engine; the failing decoder is marked
/// finished and playback proceeds with the next queued decoder. The
/// error itself is delivered asynchronously through
/// [`AudioPlayer::pop_event`](crate::AudioPlayer::pop_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
	message: String,
}

impl DecodeError {
	#[must_use]
	pub fn new(message: impl Into<String>) -> Self {
		Self {
			message: message.into(),
		}
	}
}

impl Display for DecodeError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.message)
	}
}

impl Error for DecodeError {}

impl From<std::io::Error> for DecodeError {
	fn from(error: std::io::Error) -> Self {
		Self::new(error.to_string())
	}
}

#[cfg(feature = "symphonia")]
impl From<symphonia::core::errors::Error> for DecodeError {
	fn from(error: symphonia::core::errors::Error) -> Self {
		Self::new(error.to_string())
	}
}
