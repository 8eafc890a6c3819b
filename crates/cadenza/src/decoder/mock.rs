use crate::{
	convert::{PcmChunk, SampleType},
	error::DecodeError,
};

use super::{DecodeResponse, Decoder, SourceFormat};

const MOCK_DECODER_PACKET_SIZE: usize = 3;

/// A single-channel decoder over a fixed sample list.
///
/// Decodes in packets of three frames. Seeks snap back to the start of
/// the containing packet to simulate real decoder behavior. A NaN
/// sample makes `decode` fail when it is reached.
pub(crate) struct MockDecoder {
	samples: Vec<f64>,
	sample_rate: u32,
	current_frame: usize,
	seekable: bool,
}

impl MockDecoder {
	#[must_use]
	pub(crate) fn new(samples: Vec<f64>, sample_rate: u32) -> Self {
		Self {
			samples,
			sample_rate,
			current_frame: 0,
			seekable: true,
		}
	}

	#[must_use]
	pub(crate) fn unseekable(mut self) -> Self {
		self.seekable = false;
		self
	}
}

impl Decoder for MockDecoder {
	fn format(&self) -> SourceFormat {
		SourceFormat {
			sample_rate: self.sample_rate,
			channel_count: 1,
			sample_type: SampleType::F64,
			frames_per_packet: Some(MOCK_DECODER_PACKET_SIZE as u32),
		}
	}

	fn total_frames(&self) -> u64 {
		self.samples.len() as u64
	}

	fn supports_seeking(&self) -> bool {
		self.seekable
	}

	fn seek(&mut self, frame: u64) -> Result<u64, DecodeError> {
		if !self.seekable {
			return Err(DecodeError::new("source does not support seeking"));
		}
		let frame = (frame as usize).min(self.samples.len());
		let frame = frame / MOCK_DECODER_PACKET_SIZE * MOCK_DECODER_PACKET_SIZE;
		self.current_frame = frame;
		Ok(frame as u64)
	}

	fn decode(&mut self) -> Result<DecodeResponse, DecodeError> {
		if self.current_frame >= self.samples.len() {
			return Ok(DecodeResponse::EndOfStream);
		}
		let mut samples = vec![];
		for _ in 0..MOCK_DECODER_PACKET_SIZE {
			let sample = self.samples[self.current_frame];
			if sample.is_nan() {
				return Err(DecodeError::new("corrupt packet"));
			}
			samples.push(sample);
			self.current_frame += 1;
			if self.current_frame >= self.samples.len() {
				break;
			}
		}
		Ok(DecodeResponse::Chunk(PcmChunk::F64(samples)))
	}
}
