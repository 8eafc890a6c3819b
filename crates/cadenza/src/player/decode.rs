use std::{
	sync::{Arc, atomic::Ordering},
	time::{Duration, Instant},
};

use rtrb::Producer;

use crate::{
	convert::{self, PcmChunk},
	decoder::DecodeResponse,
	error::DecodeError,
	resampler::Resampler,
	state::{CANCEL_DECODING, DECODING_FINISHED, DECODING_STARTED, RENDERING_FINISHED},
};

use super::{PlaybackEvent, shared::PlayerShared};

const DECODER_WAIT_TIMEOUT: Duration = Duration::from_millis(20);
const RENDER_ACK_TIMEOUT: Duration = Duration::from_millis(200);

pub(crate) enum NextStep {
	Continue,
	Wait,
	End,
}

/**
The decode thread's state.

`run` performs one step of the decode loop and reports whether to keep
going, wait for a wake signal or exit; `start` spawns the thread that
drives it. Tests call `run` directly for deterministic scheduling.

The worker owns all decode-side scratch: the canonical conversion
buffer, the source-rate converter for the current decoder, and the
`pending` frames decoded but not yet written to the ring (the ring may
be too full to accept a whole converted packet at once).
*/
pub(crate) struct DecodeWorker {
	shared: Arc<PlayerShared>,
	chunk_frames: usize,
	current: Option<usize>,
	resampler: Option<Resampler>,
	convert_buffer: Vec<Vec<f64>>,
	pending: Vec<Vec<f64>>,
	pending_start: usize,
	pending_len: usize,
	eof: bool,
	refill_after_seek: bool,
	event_producer: Producer<PlaybackEvent>,
}

impl DecodeWorker {
	#[must_use]
	pub fn new(
		shared: Arc<PlayerShared>,
		chunk_frames: usize,
		event_producer: Producer<PlaybackEvent>,
	) -> Self {
		let channel_count = shared.channel_count;
		Self {
			shared,
			chunk_frames,
			current: None,
			resampler: None,
			convert_buffer: vec![vec![]; channel_count],
			pending: vec![vec![]; channel_count],
			pending_start: 0,
			pending_len: 0,
			eof: false,
			refill_after_seek: false,
			event_producer,
		}
	}

	pub fn start(mut self) -> std::thread::JoinHandle<()> {
		std::thread::spawn(move || {
			loop {
				match self.run() {
					NextStep::Continue => {}
					NextStep::Wait => {
						self.shared
							.decoder_semaphore
							.wait_timeout(DECODER_WAIT_TIMEOUT);
					}
					NextStep::End => break,
				}
			}
			log::debug!("decode thread exited");
		})
	}

	pub fn run(&mut self) -> NextStep {
		if !self.shared.keep_decoding.load(Ordering::SeqCst) {
			return NextStep::End;
		}
		// seeks preempt everything, including the slot currently being
		// decoded
		if let Some(index) = self.pending_seek_slot() {
			self.perform_seek(index);
			return NextStep::Continue;
		}
		if let Some(index) = self.current {
			let slot = &self.shared.slots[index];
			if !slot.is_claimed() || slot.has_flags(DECODING_FINISHED) {
				self.current = None;
			}
		}
		if self.current.is_none() {
			match self.select_slot() {
				Some(index) => {
					self.current = Some(index);
					self.begin_decoding(index);
				}
				None => return NextStep::Wait,
			}
		}
		let Some(index) = self.current else {
			// the selected slot was rejected (no converter chain)
			return NextStep::Continue;
		};
		let slot = &self.shared.slots[index];
		if slot.has_flags(CANCEL_DECODING) {
			self.pending_clear();
			self.finish_current();
			return NextStep::Continue;
		}
		if self.pending_len > 0 {
			return self.write_pending(index);
		}
		if self.eof {
			self.finish_current();
			return NextStep::Continue;
		}
		if self.shared.ring.frames_available_to_write() < self.chunk_frames {
			return NextStep::Wait;
		}
		self.decode_packet(index)
	}

	fn pending_seek_slot(&self) -> Option<usize> {
		let mut best: Option<(u64, usize)> = None;
		for (index, slot) in self.shared.slots.iter().enumerate() {
			if slot.is_claimed() && slot.has_seek_request() {
				let sequence = slot.sequence();
				if best.is_none_or(|(earliest, _)| sequence < earliest) {
					best = Some((sequence, index));
				}
			}
		}
		best.map(|(_, index)| index)
	}

	/// Picks the earliest claimed slot that still needs decoding, or
	/// claims the next queued decoder into an empty slot.
	fn select_slot(&mut self) -> Option<usize> {
		let mut best: Option<(u64, usize)> = None;
		for (index, slot) in self.shared.slots.iter().enumerate() {
			if slot.is_claimed() && !slot.has_flags(DECODING_FINISHED) {
				let sequence = slot.sequence();
				if best.is_none_or(|(earliest, _)| sequence < earliest) {
					best = Some((sequence, index));
				}
			}
		}
		if let Some((_, index)) = best {
			return Some(index);
		}
		let decoder = self.shared.queue.lock().pop_front()?;
		let index = self.shared.slots.iter().position(|slot| !slot.is_claimed());
		match index {
			Some(index) => {
				let sequence = self
					.shared
					.next_sequence
					.fetch_add(1, Ordering::SeqCst);
				if self.shared.slots[index].try_claim(decoder, sequence) {
					Some(index)
				} else {
					// claims race with nothing; an occupied slot here is a bug
					log::error!("slot claim failed on a supposedly empty slot");
					None
				}
			}
			None => {
				// every slot is live; wait for the collector
				self.shared.queue.lock().push_front(decoder);
				None
			}
		}
	}

	fn begin_decoding(&mut self, index: usize) {
		self.pending_clear();
		self.eof = false;
		let sample_rate = self.shared.slots[index].sample_rate();
		match Resampler::new(
			sample_rate,
			self.shared.canonical_sample_rate,
			self.shared.channel_count,
		) {
			Ok(resampler) => self.resampler = resampler,
			Err(_) => {
				self.emit_error(DecodeError::new("could not build a sample rate converter"));
				// nothing was written, so the render callback will never
				// finish this slot; hand it straight to the collector
				self.shared.slots[index].set_flags(DECODING_FINISHED | RENDERING_FINISHED);
				self.shared.collector_semaphore.post();
				self.current = None;
				return;
			}
		}
		let slot = &self.shared.slots[index];
		if !slot.has_flags(DECODING_STARTED) {
			slot.begin_segment(self.shared.ring.write_position(), slot.frames_decoded());
			slot.set_flags(DECODING_STARTED);
		}
	}

	fn write_pending(&mut self, index: usize) -> NextStep {
		let slot = &self.shared.slots[index];
		let free = self.shared.ring.frames_available_to_write();
		if free == 0 {
			return NextStep::Wait;
		}
		let count = self
			.shared
			.ring
			.write(&self.pending, self.pending_start, self.pending_len.min(free));
		if count == 0 {
			return NextStep::Wait;
		}
		slot.add_frames_written(count as u64);
		self.pending_start += count;
		self.pending_len -= count;
		if self.pending_len == 0 {
			self.pending_clear();
		}
		if self.refill_after_seek {
			// the ring now holds audio past the seek target
			self.refill_after_seek = false;
			self.shared
				.is_seeking
				.store(false, Ordering::SeqCst);
		}
		NextStep::Continue
	}

	fn decode_packet(&mut self, index: usize) -> NextStep {
		let slot = &self.shared.slots[index];
		let response = {
			let mut decoder = slot.decoder.lock();
			match decoder.as_mut() {
				Some(decoder) => decoder.decode(),
				None => {
					self.eof = true;
					return NextStep::Continue;
				}
			}
		};
		match response {
			Ok(DecodeResponse::Chunk(chunk)) => {
				let source_channels = slot.channel_count();
				let frames = chunk.frame_count(source_channels);
				if frames > 0 {
					slot.add_frames_decoded(frames as u64);
					self.convert_chunk(&chunk, source_channels, frames);
				}
				NextStep::Continue
			}
			Ok(DecodeResponse::EndOfStream) => {
				self.drain_resampler();
				if let Some(resampler) = &mut self.resampler {
					resampler.flush();
				}
				self.drain_resampler();
				self.eof = true;
				NextStep::Continue
			}
			Err(error) => {
				log::error!("decoder failed: {error}");
				self.emit_error(error);
				// render whatever was already converted, then finish
				self.eof = true;
				NextStep::Continue
			}
		}
	}

	/// Converts one source packet to canonical planar form and moves it
	/// into `pending`, through the rate converter when one is needed.
	fn convert_chunk(&mut self, chunk: &PcmChunk, source_channels: usize, frames: usize) {
		for channel in self.convert_buffer.iter_mut() {
			channel.resize(frames, 0.0);
		}
		convert::chunk_into_canonical(chunk, source_channels, &mut self.convert_buffer, 0);
		if self.resampler.is_some() {
			let mut offset = 0;
			while offset < frames {
				self.drain_resampler();
				let pushed = self
					.resampler
					.as_mut()
					.expect("resampler checked above")
					.push(&self.convert_buffer, offset, frames - offset);
				if pushed == 0 {
					break;
				}
				offset += pushed;
			}
			self.drain_resampler();
		} else {
			for (pending, converted) in self.pending.iter_mut().zip(self.convert_buffer.iter()) {
				pending.extend_from_slice(&converted[..frames]);
			}
			self.pending_len += frames;
		}
	}

	/// Moves everything staged in the rate converter into `pending`.
	fn drain_resampler(&mut self) {
		let Some(resampler) = &mut self.resampler else {
			return;
		};
		let available = resampler.available();
		if available == 0 {
			return;
		}
		let end = self.pending_start + self.pending_len;
		for channel in self.pending.iter_mut() {
			channel.resize(end + available, 0.0);
		}
		let taken = resampler.take(&mut self.pending, end, available);
		self.pending_len += taken;
	}

	fn perform_seek(&mut self, index: usize) {
		let Some(target) = self.shared.slots[index].take_seek_request() else {
			return;
		};
		self.shared.mute_output.store(true, Ordering::SeqCst);
		self.wait_for_render_pass();
		// reposition first so a failed seek leaves everything intact
		let seeked_to = {
			let mut decoder = self.shared.slots[index].decoder.lock();
			match decoder.as_mut() {
				Some(decoder) => decoder.seek(target),
				None => Err(DecodeError::new("decoder already detached")),
			}
		};
		let position = match seeked_to {
			Ok(position) => position,
			Err(error) => {
				log::error!("seek to frame {target} failed: {error}");
				self.emit_error(error);
				self.shared.mute_output.store(false, Ordering::SeqCst);
				self.shared.is_seeking.store(false, Ordering::SeqCst);
				return;
			}
		};
		self.shared.ring.reset();
		// read-ahead slots lost their ring segments with the reset;
		// roll them back to be decoded again after the current decoder
		let sequence = self.shared.slots[index].sequence();
		for other_index in 0..self.shared.slots.len() {
			let later = {
				let other = &self.shared.slots[other_index];
				other.is_claimed() && other.sequence() > sequence
			};
			if later {
				self.roll_back(other_index);
			}
		}
		{
			let slot = &self.shared.slots[index];
			slot.set_frames_decoded(position);
			slot.begin_segment(self.shared.ring.write_position(), position);
			slot.clear_flags(DECODING_FINISHED);
			slot.set_flags(DECODING_STARTED);
		}
		self.current = Some(index);
		self.pending_clear();
		self.eof = false;
		let sample_rate = self.shared.slots[index].sample_rate();
		self.resampler = Resampler::new(
			sample_rate,
			self.shared.canonical_sample_rate,
			self.shared.channel_count,
		)
		.unwrap_or(None);
		self.refill_after_seek = true;
		self.shared.mute_output.store(false, Ordering::SeqCst);
	}

	/// Rolls a read-ahead slot back to frame 0 so it can be re-decoded.
	/// A source that cannot seek cannot be replayed; it is cancelled.
	fn roll_back(&mut self, index: usize) {
		let result = {
			let mut decoder = self.shared.slots[index].decoder.lock();
			match decoder.as_mut() {
				Some(decoder) if decoder.supports_seeking() => decoder.seek(0).map(Some),
				Some(_) | None => Ok(None),
			}
		};
		match result {
			Ok(Some(_)) => self.shared.slots[index].reset_for_restart(),
			Ok(None) => {
				log::warn!("dropping an unseekable read-ahead decoder after a seek");
				self.emit_error(DecodeError::new(
					"read-ahead decoder does not support seeking and was dropped",
				));
				self.cancel_slot(index);
			}
			Err(error) => {
				self.emit_error(error);
				self.cancel_slot(index);
			}
		}
	}

	fn cancel_slot(&mut self, index: usize) {
		self.shared.slots[index]
			.set_flags(CANCEL_DECODING | DECODING_FINISHED | RENDERING_FINISHED);
		self.shared.collector_semaphore.post();
	}

	/// Waits until the render callback has run once with the mute flag
	/// visible (or the device is not running), so the ring can be reset
	/// out from under it.
	fn wait_for_render_pass(&self) {
		if !self.shared.device_playing.load(Ordering::SeqCst) {
			return;
		}
		let generation = self.shared.callback_generation.load(Ordering::SeqCst);
		let deadline = Instant::now() + RENDER_ACK_TIMEOUT;
		while self.shared.device_playing.load(Ordering::SeqCst)
			&& self.shared.callback_generation.load(Ordering::SeqCst) == generation
			&& Instant::now() < deadline
		{
			std::thread::sleep(Duration::from_micros(500));
		}
	}

	fn finish_current(&mut self) {
		if let Some(index) = self.current.take() {
			let slot = &self.shared.slots[index];
			slot.set_flags(DECODING_FINISHED);
		}
		if self.refill_after_seek {
			self.refill_after_seek = false;
			self.shared
				.is_seeking
				.store(false, Ordering::SeqCst);
		}
		self.resampler = None;
		self.pending_clear();
	}

	fn pending_clear(&mut self) {
		for channel in self.pending.iter_mut() {
			channel.clear();
		}
		self.pending_start = 0;
		self.pending_len = 0;
	}

	fn emit_error(&mut self, error: DecodeError) {
		self.event_producer
			.push(PlaybackEvent::DecoderError(error))
			.ok();
	}
}
