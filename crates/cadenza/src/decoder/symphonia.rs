use symphonia::core::{
	audio::SampleBuffer,
	codecs::Decoder as SymphoniaCodecDecoder,
	formats::{FormatReader, SeekMode, SeekTo},
	io::{MediaSource, MediaSourceStream},
	probe::Hint,
};

use crate::{
	convert::{PcmChunk, SampleType},
	error::DecodeError,
};

use super::{DecodeResponse, Decoder, SourceFormat};

/// A [`Decoder`] over any format/codec pairing symphonia supports.
pub struct SymphoniaDecoder {
	format_reader: Box<dyn FormatReader>,
	decoder: Box<dyn SymphoniaCodecDecoder>,
	format: SourceFormat,
	total_frames: u64,
	track_id: u32,
	seekable: bool,
}

impl SymphoniaDecoder {
	/// Opens the audio file at `path`.
	pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, DecodeError> {
		Self::new(Box::new(std::fs::File::open(path)?))
	}

	/// Opens a cursor wrapping in-memory audio file data.
	pub fn from_cursor<T: AsRef<[u8]> + Send + Sync + 'static>(
		cursor: std::io::Cursor<T>,
	) -> Result<Self, DecodeError> {
		Self::new(Box::new(cursor))
	}

	/// Opens any type implementing symphonia's
	/// [`MediaSource`](symphonia::core::io::MediaSource) trait.
	pub fn new(media_source: Box<dyn MediaSource>) -> Result<Self, DecodeError> {
		let seekable = media_source.is_seekable();
		let codecs = symphonia::default::get_codecs();
		let probe = symphonia::default::get_probe();
		let mss = MediaSourceStream::new(media_source, Default::default());
		let format_reader = probe
			.format(
				&Hint::default(),
				mss,
				&Default::default(),
				&Default::default(),
			)?
			.format;
		let default_track = format_reader
			.default_track()
			.ok_or_else(|| DecodeError::new("no default track"))?;
		let codec_params = &default_track.codec_params;
		let sample_rate = codec_params
			.sample_rate
			.ok_or_else(|| DecodeError::new("unknown sample rate"))?;
		let channel_count = codec_params
			.channels
			.ok_or_else(|| DecodeError::new("unknown channel layout"))?
			.count() as u16;
		let total_frames = codec_params
			.n_frames
			.ok_or_else(|| DecodeError::new("unknown stream length"))?;
		let frames_per_packet = codec_params
			.max_frames_per_packet
			.and_then(|frames| u32::try_from(frames).ok());
		let decoder = codecs.make(codec_params, &Default::default())?;
		let track_id = default_track.id;
		Ok(Self {
			format_reader,
			decoder,
			format: SourceFormat {
				sample_rate,
				channel_count,
				sample_type: SampleType::F32,
				frames_per_packet,
			},
			total_frames,
			track_id,
			seekable,
		})
	}
}

impl Decoder for SymphoniaDecoder {
	fn format(&self) -> SourceFormat {
		self.format
	}

	fn total_frames(&self) -> u64 {
		self.total_frames
	}

	fn supports_seeking(&self) -> bool {
		self.seekable
	}

	fn seek(&mut self, frame: u64) -> Result<u64, DecodeError> {
		let seeked_to = self.format_reader.seek(
			SeekMode::Accurate,
			SeekTo::TimeStamp {
				ts: frame,
				track_id: self.track_id,
			},
		)?;
		self.decoder.reset();
		Ok(seeked_to.actual_ts)
	}

	fn decode(&mut self) -> Result<DecodeResponse, DecodeError> {
		match self.format_reader.next_packet() {
			Ok(packet) => {
				let buffer = self.decoder.decode(&packet)?;
				let mut samples =
					SampleBuffer::<f32>::new(buffer.capacity() as u64, *buffer.spec());
				samples.copy_interleaved_ref(buffer);
				Ok(DecodeResponse::Chunk(PcmChunk::F32(
					samples.samples().to_vec(),
				)))
			}
			Err(error) => match error {
				symphonia::core::errors::Error::IoError(error) => {
					if error.kind() == std::io::ErrorKind::UnexpectedEof {
						Ok(DecodeResponse::EndOfStream)
					} else {
						Err(symphonia::core::errors::Error::IoError(error).into())
					}
				}
				error => Err(error.into()),
			},
		}
	}
}
