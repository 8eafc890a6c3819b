use std::sync::{Arc, atomic::Ordering};

use rtrb::Producer;

use crate::{
	ACTIVE_DECODER_CAPACITY, convert,
	resampler::Resampler,
	state::{DECODING_FINISHED, NO_TIMESTAMP, RENDERING_FINISHED, RENDERING_STARTED},
};

use super::{PlaybackEvent, shared::PlayerShared};

const RENDER_CHUNK_FRAMES: usize = 1024;

/**
Produces interleaved `f32` output for the audio device.

`process` runs on the device's realtime thread. Everything it touches
is preallocated or atomic: it never allocates, never locks and never
blocks. The only syscall on its path is the collector semaphore post
when a decoder finishes rendering.

When the output stream's sample rate differs from the canonical rate
the ring buffer runs at, a rate converter sits between the ring and the
device; `on_change_sample_rate` rebuilds it while the stream is stopped
so a device format change keeps playing from the same source frame
without touching any decoder.
*/
pub struct Renderer {
	shared: Arc<PlayerShared>,
	stream_sample_rate: u32,
	resampler: Option<Resampler>,
	scratch: Vec<Vec<f64>>,
	canonical: Vec<Vec<f64>>,
	event_producer: Producer<PlaybackEvent>,
}

impl Renderer {
	#[must_use]
	pub(crate) fn new(
		shared: Arc<PlayerShared>,
		stream_sample_rate: u32,
		event_producer: Producer<PlaybackEvent>,
	) -> Self {
		let channel_count = shared.channel_count;
		let resampler =
			match Resampler::new(shared.canonical_sample_rate, stream_sample_rate, channel_count) {
				Ok(resampler) => resampler,
				Err(_) => None,
			};
		let scratch_frames = scratch_frames(&resampler);
		Self {
			shared,
			stream_sample_rate,
			resampler,
			scratch: vec![vec![0.0; scratch_frames]; channel_count],
			canonical: vec![vec![0.0; RENDER_CHUNK_FRAMES]; channel_count],
			event_producer,
		}
	}

	/// The sample rate of the output stream this renderer feeds.
	#[must_use]
	pub fn stream_sample_rate(&self) -> u32 {
		self.stream_sample_rate
	}

	/// Reconfigures the canonical → stream converter chain for a new
	/// output sample rate. Must only be called while the stream is
	/// stopped; allocation is fine here.
	pub fn on_change_sample_rate(&mut self, sample_rate: u32) {
		self.stream_sample_rate = sample_rate;
		self.resampler = match Resampler::new(
			self.shared.canonical_sample_rate,
			sample_rate,
			self.shared.channel_count,
		) {
			Ok(resampler) => resampler,
			Err(_) => {
				log::error!("no converter chain for stream rate {sample_rate}; audio will glitch");
				None
			}
		};
		let scratch_frames = scratch_frames(&self.resampler);
		for channel in self.scratch.iter_mut() {
			channel.clear();
			channel.resize(scratch_frames, 0.0);
		}
		self.event_producer
			.push(PlaybackEvent::StreamFormatChanged { sample_rate })
			.ok();
	}

	/// Fills one device buffer of interleaved `f32` frames.
	pub fn process(&mut self, out: &mut [f32], channels: u16) {
		let channels = channels as usize;
		if channels == 0 {
			return;
		}
		if self.shared.mute_output.load(Ordering::SeqCst)
			|| self.shared.is_seeking.load(Ordering::SeqCst)
		{
			out.fill(0.0);
			self.shared.callback_generation.fetch_add(1, Ordering::SeqCst);
			return;
		}
		let frames_total = out.len() / channels;
		let mut frame_index = 0;
		while frame_index < frames_total {
			let chunk = RENDER_CHUNK_FRAMES.min(frames_total - frame_index);
			let consumed = self.fill_canonical(chunk);
			self.apply_volume(chunk);
			convert::interleave_f32(
				&self.canonical,
				chunk,
				&mut out[frame_index * channels..(frame_index + chunk) * channels],
				channels,
			);
			self.account(consumed);
			frame_index += chunk;
		}
		self.shared.callback_generation.fetch_add(1, Ordering::SeqCst);
	}

	/// Fills `self.canonical[..frames]` from the ring, through the rate
	/// converter when one is configured, padding underruns with
	/// silence. Returns the number of ring frames consumed.
	fn fill_canonical(&mut self, frames: usize) -> usize {
		if self.resampler.is_none() {
			let got = self.shared.ring.read(&mut self.canonical, 0, frames);
			if got < frames {
				for channel in self.canonical.iter_mut() {
					channel[got..frames].fill(0.0);
				}
				self.record_underrun(frames - got);
			}
			return got;
		}
		// feed the converter whole input chunks from the ring until it
		// can supply this output chunk
		let mut consumed = 0;
		loop {
			let resampler = self.resampler.as_mut().expect("checked above");
			if resampler.available() >= frames {
				break;
			}
			let need = resampler.chunk_frames();
			let got = self.shared.ring.read(&mut self.scratch, 0, need);
			if got < need {
				for channel in self.scratch.iter_mut() {
					channel[got..need].fill(0.0);
				}
			}
			consumed += got;
			let pushed = self
				.resampler
				.as_mut()
				.expect("checked above")
				.push(&self.scratch, 0, need);
			if got < need {
				self.record_underrun(need - got);
			}
			if pushed < need {
				break;
			}
		}
		let taken = self
			.resampler
			.as_mut()
			.expect("checked above")
			.take(&mut self.canonical, 0, frames);
		if taken < frames {
			for channel in self.canonical.iter_mut() {
				channel[taken..frames].fill(0.0);
			}
		}
		consumed
	}

	fn apply_volume(&mut self, frames: usize) {
		let master = self.shared.master_volume();
		for (index, channel) in self.canonical.iter_mut().enumerate() {
			let gain = master * self.shared.channel_volume(index);
			if gain != 1.0 {
				for sample in &mut channel[..frames] {
					*sample *= gain;
				}
			}
		}
	}

	/// Attributes the consumed ring span to decoders in claim order,
	/// driving the rendering-started/finished transitions.
	fn account(&mut self, consumed: usize) {
		let end = self.shared.ring.read_position();
		let start = end - consumed as u64;
		let mut order = [(u64::MAX, usize::MAX); ACTIVE_DECODER_CAPACITY];
		let mut count = 0;
		for (index, slot) in self.shared.slots.iter().enumerate() {
			if slot.is_claimed() && !slot.has_flags(RENDERING_FINISHED) {
				order[count] = (slot.sequence(), index);
				count += 1;
			}
		}
		order[..count].sort_unstable();
		for &(_, index) in &order[..count] {
			let slot = &self.shared.slots[index];
			let timestamp = slot.timestamp();
			if timestamp == NO_TIMESTAMP {
				continue;
			}
			let written = slot.frames_written();
			let segment_end = timestamp + written;
			let overlap_start = start.max(timestamp);
			let overlap_end = end.min(segment_end);
			if overlap_end > overlap_start {
				if !slot.test_and_set_flags(RENDERING_STARTED) {
					self.event_producer
						.push(PlaybackEvent::RenderingStarted {
							sequence: slot.sequence(),
						})
						.ok();
				}
				slot.add_frames_rendered(overlap_end - overlap_start);
			}
			// every written frame consumed and no more coming
			if slot.has_flags(DECODING_FINISHED)
				&& slot.frames_rendered() >= written
				&& end >= segment_end
			{
				slot.set_flags(RENDERING_FINISHED);
				self.shared.collector_semaphore.post();
			}
		}
	}

	/// Starvation only counts as an underrun while some decoder is
	/// mid-render; silence after the queue drains is expected.
	fn record_underrun(&self, frames: usize) {
		let starving = self
			.shared
			.slots
			.iter()
			.any(|slot| slot.is_claimed() && !slot.has_flags(RENDERING_FINISHED));
		if starving {
			self.shared
				.underrun_frames
				.fetch_add(frames as u64, Ordering::SeqCst);
		}
	}
}

/// The ring-read scratch must hold one full converter input chunk.
fn scratch_frames(resampler: &Option<Resampler>) -> usize {
	resampler
		.as_ref()
		.map(|resampler| resampler.chunk_frames())
		.unwrap_or(RENDER_CHUNK_FRAMES)
		.max(RENDER_CHUNK_FRAMES)
}
