/*!
Conversions between source/output PCM layouts and the engine's canonical
format.

The canonical format is deinterleaved `f64` normalized to [-1, +1). Every
function here is a pure transform over caller-provided buffers: no state,
no allocation.
*/


/// The sample encoding of a PCM buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
	F64,
	F32,
	I16,
	I32,
}

/// One packet of interleaved source-format PCM produced by a
/// [`Decoder`](crate::decoder::Decoder).
#[derive(Debug, Clone, PartialEq)]
pub enum PcmChunk {
	F64(Vec<f64>),
	F32(Vec<f32>),
	I16(Vec<i16>),
	I32(Vec<i32>),
}

impl PcmChunk {
	#[must_use]
	pub fn sample_type(&self) -> SampleType {
		match self {
			PcmChunk::F64(_) => SampleType::F64,
			PcmChunk::F32(_) => SampleType::F32,
			PcmChunk::I16(_) => SampleType::I16,
			PcmChunk::I32(_) => SampleType::I32,
		}
	}

	#[must_use]
	pub fn sample_count(&self) -> usize {
		match self {
			PcmChunk::F64(samples) => samples.len(),
			PcmChunk::F32(samples) => samples.len(),
			PcmChunk::I16(samples) => samples.len(),
			PcmChunk::I32(samples) => samples.len(),
		}
	}

	/// The number of whole frames in the chunk given its channel count.
	#[must_use]
	pub fn frame_count(&self, channel_count: usize) -> usize {
		if channel_count == 0 {
			return 0;
		}
		self.sample_count() / channel_count
	}
}

#[inline]
fn normalize_i16(sample: i16) -> f64 {
	sample as f64 / 32768.0
}

#[inline]
fn normalize_i32(sample: i32) -> f64 {
	sample as f64 / 2_147_483_648.0
}

/**
Deinterleaves a source chunk into canonical planar `f64`, writing
`dest[channel][dest_offset..]`.

Channel mapping: source channel `c` lands in `dest[c]`. A mono source is
duplicated into every destination channel; destination channels beyond
the source channel count are filled with silence. Returns the number of
frames converted (bounded by the destination headroom).
*/
pub fn chunk_into_canonical(
	chunk: &PcmChunk,
	source_channels: usize,
	dest: &mut [Vec<f64>],
	dest_offset: usize,
) -> usize {
	let frames = chunk.frame_count(source_channels);
	let mut count = frames;
	for channel in dest.iter() {
		count = count.min(channel.len().saturating_sub(dest_offset));
	}
	for (dest_index, channel) in dest.iter_mut().enumerate() {
		let source_index = if dest_index < source_channels {
			Some(dest_index)
		} else if source_channels == 1 {
			Some(0)
		} else {
			None
		};
		match source_index {
			Some(source_index) => {
				for frame in 0..count {
					let sample_index = frame * source_channels + source_index;
					channel[dest_offset + frame] = match chunk {
						PcmChunk::F64(samples) => samples[sample_index],
						PcmChunk::F32(samples) => samples[sample_index] as f64,
						PcmChunk::I16(samples) => normalize_i16(samples[sample_index]),
						PcmChunk::I32(samples) => normalize_i32(samples[sample_index]),
					};
				}
			}
			None => {
				channel[dest_offset..dest_offset + count].fill(0.0);
			}
		}
	}
	count
}

/// Converts canonical planar `f64` into interleaved `f32`, the layout
/// consumed by the cpal output stream.
///
/// Destination channels beyond the source channel count are zeroed;
/// source channels beyond the destination channel count are dropped.
pub fn interleave_f32(source: &[Vec<f64>], frames: usize, dest: &mut [f32], dest_channels: usize) {
	debug_assert!(dest.len() >= frames * dest_channels);
	for frame in 0..frames {
		for channel in 0..dest_channels {
			let sample = source
				.get(channel)
				.map(|samples| samples[frame])
				.unwrap_or(0.0);
			dest[frame * dest_channels + channel] = sample as f32;
		}
	}
}

/// Converts canonical planar `f64` into interleaved signed 16-bit PCM,
/// clamping to the normalized range.
pub fn interleave_i16(source: &[Vec<f64>], frames: usize, dest: &mut [i16], dest_channels: usize) {
	debug_assert!(dest.len() >= frames * dest_channels);
	for frame in 0..frames {
		for channel in 0..dest_channels {
			let sample = source
				.get(channel)
				.map(|samples| samples[frame])
				.unwrap_or(0.0);
			let scaled = (sample * 32768.0).clamp(-32768.0, 32767.0);
			dest[frame * dest_channels + channel] = scaled as i16;
		}
	}
}

/// Converts canonical planar `f64` into interleaved signed 32-bit PCM,
/// clamping to the normalized range.
pub fn interleave_i32(source: &[Vec<f64>], frames: usize, dest: &mut [i32], dest_channels: usize) {
	debug_assert!(dest.len() >= frames * dest_channels);
	for frame in 0..frames {
		for channel in 0..dest_channels {
			let sample = source
				.get(channel)
				.map(|samples| samples[frame])
				.unwrap_or(0.0);
			let scaled = (sample * 2_147_483_648.0).clamp(-2_147_483_648.0, 2_147_483_647.0);
			dest[frame * dest_channels + channel] = scaled as i32;
		}
	}
}
