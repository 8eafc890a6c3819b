
use rubato::{
	Resampler as _, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
	WindowFunction, calculate_cutoff,
};

use crate::error::PlaybackError;

const CHUNK_FRAMES: usize = 1024;
const SINC_LEN: usize = 256;
const OVERSAMPLING_FACTOR: usize = 128;

/**
A fixed-ratio sample-rate converter over planar `f64` buffers.

Wraps a windowed-sinc polyphase resampler configured at construction
time; after that, `push` and `take` move samples through preallocated
staging with no further allocation, which is what lets the render
callback drive one. The same type serves the decode thread
(source rate → canonical rate) and the render callback
(canonical rate → stream rate).

Input is accumulated into fixed-size chunks and processed as each chunk
fills; the converted output is staged until taken. `flush` drains the
partial last chunk and the filter tail at end of stream and expects the
staging to have been emptied first.
*/
pub(crate) struct Resampler {
	inner: SincFixedIn<f64>,
	chunk_frames: usize,
	input: Vec<Vec<f64>>,
	input_len: usize,
	output: Vec<Vec<f64>>,
	staged: Vec<Vec<f64>>,
	staged_start: usize,
	staged_len: usize,
}

impl Resampler {
	/// Creates a converter from `source_rate` to `target_rate`, or
	/// `None` when the rates already match (identity bypass).
	pub fn new(
		source_rate: u32,
		target_rate: u32,
		channel_count: usize,
	) -> Result<Option<Self>, PlaybackError> {
		if source_rate == 0 || target_rate == 0 || channel_count == 0 {
			return Err(PlaybackError::InvalidArgument);
		}
		if source_rate == target_rate {
			return Ok(None);
		}
		let ratio = target_rate as f64 / source_rate as f64;
		let window = WindowFunction::BlackmanHarris2;
		let parameters = SincInterpolationParameters {
			sinc_len: SINC_LEN,
			f_cutoff: calculate_cutoff(SINC_LEN, window),
			interpolation: SincInterpolationType::Linear,
			oversampling_factor: OVERSAMPLING_FACTOR,
			window,
		};
		let inner = SincFixedIn::new(ratio, 2.0, parameters, CHUNK_FRAMES, channel_count)
			.map_err(|_| PlaybackError::FormatUnsupported)?;
		let output_max = inner.output_frames_max();
		let staged_capacity = output_max * 2 + CHUNK_FRAMES;
		Ok(Some(Self {
			inner,
			chunk_frames: CHUNK_FRAMES,
			input: vec![vec![0.0; CHUNK_FRAMES]; channel_count],
			input_len: 0,
			output: vec![vec![0.0; output_max]; channel_count],
			staged: vec![vec![0.0; staged_capacity]; channel_count],
			staged_start: 0,
			staged_len: 0,
		}))
	}

	/// The input accumulation chunk size in frames.
	#[must_use]
	pub fn chunk_frames(&self) -> usize {
		self.chunk_frames
	}

	/// Converted frames waiting to be taken.
	#[must_use]
	pub fn available(&self) -> usize {
		self.staged_len
	}

	/// Feeds `frames` frames from `source[channel][offset..]` and
	/// returns the number accepted. Acceptance stops when the staging
	/// is too full to process another chunk; `take` frees it.
	pub fn push(&mut self, source: &[Vec<f64>], offset: usize, frames: usize) -> usize {
		let mut consumed = 0;
		while consumed < frames {
			if self.input_len == self.chunk_frames && !self.process_chunk() {
				break;
			}
			let space = self.chunk_frames - self.input_len;
			let count = space.min(frames - consumed);
			for (channel, input) in source.iter().zip(self.input.iter_mut()) {
				input[self.input_len..self.input_len + count]
					.copy_from_slice(&channel[offset + consumed..offset + consumed + count]);
			}
			self.input_len += count;
			consumed += count;
			if self.input_len == self.chunk_frames {
				self.process_chunk();
			}
		}
		consumed
	}

	/// Moves up to `frames` converted frames into
	/// `dest[channel][offset..]` and returns the number moved.
	pub fn take(&mut self, dest: &mut [Vec<f64>], offset: usize, frames: usize) -> usize {
		let mut count = frames.min(self.staged_len);
		for channel in dest.iter() {
			count = count.min(channel.len().saturating_sub(offset));
		}
		for (channel, staged) in dest.iter_mut().zip(self.staged.iter()) {
			channel[offset..offset + count]
				.copy_from_slice(&staged[self.staged_start..self.staged_start + count]);
		}
		self.staged_start += count;
		self.staged_len -= count;
		if self.staged_len == 0 {
			self.staged_start = 0;
		}
		count
	}

	/// Converts the partial last chunk and drains the filter tail into
	/// the staging. Call at end of stream, with the staging emptied.
	pub fn flush(&mut self) {
		if self.input_len > 0 {
			let partial: Vec<&[f64]> = self
				.input
				.iter()
				.map(|channel| &channel[..self.input_len])
				.collect();
			if let Ok((_, written)) =
				self.inner
					.process_partial_into_buffer(Some(&partial), &mut self.output, None)
			{
				self.stage_output(written);
			}
			self.input_len = 0;
		}
		if let Ok((_, written)) = self.inner.process_partial_into_buffer(
			Option::<&[Vec<f64>]>::None,
			&mut self.output,
			None,
		) {
			self.stage_output(written);
		}
	}

	/// Processes one full input chunk. Returns whether the chunk was
	/// processed (false when the staging cannot hold the output yet).
	fn process_chunk(&mut self) -> bool {
		debug_assert_eq!(self.input_len, self.chunk_frames);
		let output_max = self.inner.output_frames_max();
		if self.staged_capacity() - self.staged_len < output_max {
			return false;
		}
		match self
			.inner
			.process_into_buffer(&self.input, &mut self.output, None)
		{
			Ok((_, written)) => {
				self.stage_output(written);
				self.input_len = 0;
				true
			}
			Err(_) => {
				// a processing error cannot be surfaced from here; drop
				// the chunk rather than wedge the pipeline
				self.input_len = 0;
				true
			}
		}
	}

	fn stage_output(&mut self, frames: usize) {
		let capacity = self.staged_capacity();
		if self.staged_start + self.staged_len + frames > capacity && self.staged_start > 0 {
			for staged in self.staged.iter_mut() {
				staged.copy_within(self.staged_start..self.staged_start + self.staged_len, 0);
			}
			self.staged_start = 0;
		}
		let count = frames.min(capacity - self.staged_start - self.staged_len);
		let dest_start = self.staged_start + self.staged_len;
		for (staged, output) in self.staged.iter_mut().zip(self.output.iter()) {
			staged[dest_start..dest_start + count].copy_from_slice(&output[..count]);
		}
		self.staged_len += count;
	}

	fn staged_capacity(&self) -> usize {
		self.staged.first().map(|channel| channel.len()).unwrap_or(0)
	}
}
