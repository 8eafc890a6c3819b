
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::decoder::Decoder;

pub(crate) const CLAIMED: u32 = 1 << 0;
pub(crate) const DECODING_STARTED: u32 = 1 << 1;
pub(crate) const DECODING_FINISHED: u32 = 1 << 2;
pub(crate) const RENDERING_STARTED: u32 = 1 << 3;
pub(crate) const RENDERING_FINISHED: u32 = 1 << 4;
pub(crate) const CANCEL_DECODING: u32 = 1 << 5;

/// `seek_request` value meaning no seek is pending.
pub(crate) const NO_SEEK_REQUEST: u64 = u64::MAX;
/// `timestamp` value meaning the slot's segment has not been written
/// to the ring yet.
pub(crate) const NO_TIMESTAMP: u64 = u64::MAX;

/**
The state of one live decoder.

Slots are allocated once and live for the lifetime of the engine. An
empty slot has `flags == 0`; the decode thread claims one with a
compare-exchange to `CLAIMED` and the collector releases it by storing
zero last, after tearing the rest of the slot down. Everything that
crosses threads is atomic; the decoder handle itself sits behind a
mutex that only the decode thread (while decoding) and the collector
(at teardown) ever lock, so the render callback stays lock-free.

Counter model: `frames_decoded` is the absolute source-frame position
of the decode side. The ring-timeline counters describe the slot's
current *segment*, the run of frames written since the decoder was
claimed or last repositioned: `timestamp` is the ring write position
where the segment began, `frames_written` how many canonical frames of
it entered the ring, `frames_rendered` how many of those the render
callback has consumed. A seek starts a new segment with `seek_base`
recording the source frame it maps to.
*/
pub(crate) struct DecoderState {
	flags: AtomicU32,
	sequence: AtomicU64,
	sample_rate: AtomicU32,
	channel_count: AtomicU32,
	total_frames: AtomicU64,
	frames_decoded: AtomicU64,
	seek_base: AtomicU64,
	timestamp: AtomicU64,
	frames_written: AtomicU64,
	frames_rendered: AtomicU64,
	seek_request: AtomicU64,
	pub decoder: Mutex<Option<Box<dyn Decoder>>>,
}

impl DecoderState {
	#[must_use]
	pub fn new() -> Self {
		Self {
			flags: AtomicU32::new(0),
			sequence: AtomicU64::new(0),
			sample_rate: AtomicU32::new(0),
			channel_count: AtomicU32::new(0),
			total_frames: AtomicU64::new(0),
			frames_decoded: AtomicU64::new(0),
			seek_base: AtomicU64::new(0),
			timestamp: AtomicU64::new(NO_TIMESTAMP),
			frames_written: AtomicU64::new(0),
			frames_rendered: AtomicU64::new(0),
			seek_request: AtomicU64::new(NO_SEEK_REQUEST),
			decoder: Mutex::new(None),
		}
	}

	/// Claims an empty slot for `decoder`. Returns whether the claim
	/// won; on success the slot metadata is published before any other
	/// thread can observe a lifecycle flag.
	pub fn try_claim(&self, decoder: Box<dyn Decoder>, sequence: u64) -> bool {
		if self
			.flags
			.compare_exchange(0, CLAIMED, Ordering::SeqCst, Ordering::SeqCst)
			.is_err()
		{
			return false;
		}
		let format = decoder.format();
		self.sequence.store(sequence, Ordering::SeqCst);
		self.sample_rate.store(format.sample_rate, Ordering::SeqCst);
		self.channel_count
			.store(format.channel_count as u32, Ordering::SeqCst);
		self.total_frames
			.store(decoder.total_frames(), Ordering::SeqCst);
		self.frames_decoded.store(0, Ordering::SeqCst);
		self.seek_base.store(0, Ordering::SeqCst);
		self.timestamp.store(NO_TIMESTAMP, Ordering::SeqCst);
		self.frames_written.store(0, Ordering::SeqCst);
		self.frames_rendered.store(0, Ordering::SeqCst);
		self.seek_request.store(NO_SEEK_REQUEST, Ordering::SeqCst);
		*self.decoder.lock() = Some(decoder);
		true
	}

	/// Tears the slot down and makes it claimable again. Collector
	/// only; the decoder handle must already have been taken out.
	pub fn release(&self) {
		self.sequence.store(0, Ordering::SeqCst);
		self.sample_rate.store(0, Ordering::SeqCst);
		self.channel_count.store(0, Ordering::SeqCst);
		self.total_frames.store(0, Ordering::SeqCst);
		self.frames_decoded.store(0, Ordering::SeqCst);
		self.seek_base.store(0, Ordering::SeqCst);
		self.timestamp.store(NO_TIMESTAMP, Ordering::SeqCst);
		self.frames_written.store(0, Ordering::SeqCst);
		self.frames_rendered.store(0, Ordering::SeqCst);
		self.seek_request.store(NO_SEEK_REQUEST, Ordering::SeqCst);
		self.flags.store(0, Ordering::SeqCst);
	}

	#[must_use]
	pub fn is_claimed(&self) -> bool {
		self.flags.load(Ordering::SeqCst) & CLAIMED != 0
	}

	#[must_use]
	pub fn has_flags(&self, mask: u32) -> bool {
		self.flags.load(Ordering::SeqCst) & mask == mask
	}

	pub fn set_flags(&self, mask: u32) {
		self.flags.fetch_or(mask, Ordering::SeqCst);
	}

	pub fn clear_flags(&self, mask: u32) {
		self.flags.fetch_and(!mask, Ordering::SeqCst);
	}

	/// Sets `mask` and returns whether it was already fully set.
	pub fn test_and_set_flags(&self, mask: u32) -> bool {
		self.flags.fetch_or(mask, Ordering::SeqCst) & mask == mask
	}

	/// Sets `mask` only while the slot is still claimed, so a slot the
	/// collector releases concurrently is never left with stray flags
	/// (a nonzero flag word would make it unclaimable).
	pub fn set_flags_if_claimed(&self, mask: u32) -> bool {
		let mut flags = self.flags.load(Ordering::SeqCst);
		loop {
			if flags & CLAIMED == 0 {
				return false;
			}
			match self.flags.compare_exchange(
				flags,
				flags | mask,
				Ordering::SeqCst,
				Ordering::SeqCst,
			) {
				Ok(_) => return true,
				Err(current) => flags = current,
			}
		}
	}

	#[must_use]
	pub fn sequence(&self) -> u64 {
		self.sequence.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn sample_rate(&self) -> u32 {
		self.sample_rate.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn channel_count(&self) -> usize {
		self.channel_count.load(Ordering::SeqCst) as usize
	}

	#[must_use]
	pub fn total_frames(&self) -> u64 {
		self.total_frames.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn frames_decoded(&self) -> u64 {
		self.frames_decoded.load(Ordering::SeqCst)
	}

	pub fn set_frames_decoded(&self, frames: u64) {
		self.frames_decoded.store(frames, Ordering::SeqCst);
	}

	pub fn add_frames_decoded(&self, frames: u64) {
		self.frames_decoded.fetch_add(frames, Ordering::SeqCst);
	}

	#[must_use]
	pub fn seek_base(&self) -> u64 {
		self.seek_base.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn timestamp(&self) -> u64 {
		self.timestamp.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn frames_written(&self) -> u64 {
		self.frames_written.load(Ordering::SeqCst)
	}

	pub fn add_frames_written(&self, frames: u64) {
		self.frames_written.fetch_add(frames, Ordering::SeqCst);
	}

	#[must_use]
	pub fn frames_rendered(&self) -> u64 {
		self.frames_rendered.load(Ordering::SeqCst)
	}

	pub fn add_frames_rendered(&self, frames: u64) {
		self.frames_rendered.fetch_add(frames, Ordering::SeqCst);
	}

	pub fn request_seek(&self, frame: u64) {
		self.seek_request.store(frame, Ordering::SeqCst);
	}

	#[must_use]
	pub fn has_seek_request(&self) -> bool {
		self.seek_request.load(Ordering::SeqCst) != NO_SEEK_REQUEST
	}

	/// Claims a pending seek request, if any. Decode thread only.
	#[must_use]
	pub fn take_seek_request(&self) -> Option<u64> {
		let request = self.seek_request.swap(NO_SEEK_REQUEST, Ordering::SeqCst);
		(request != NO_SEEK_REQUEST).then_some(request)
	}

	/// Starts a new ring segment at `timestamp` mapping to source frame
	/// `base`. Called by the decode thread while the ring is quiescent.
	pub fn begin_segment(&self, timestamp: u64, base: u64) {
		self.seek_base.store(base, Ordering::SeqCst);
		self.timestamp.store(timestamp, Ordering::SeqCst);
		self.frames_written.store(0, Ordering::SeqCst);
		self.frames_rendered.store(0, Ordering::SeqCst);
	}

	/// Rolls a read-ahead slot back to the beginning of its source so
	/// it can be re-decoded after a seek invalidated its ring segment.
	pub fn reset_for_restart(&self) {
		self.frames_decoded.store(0, Ordering::SeqCst);
		self.seek_base.store(0, Ordering::SeqCst);
		self.timestamp.store(NO_TIMESTAMP, Ordering::SeqCst);
		self.frames_written.store(0, Ordering::SeqCst);
		self.frames_rendered.store(0, Ordering::SeqCst);
		self.clear_flags(DECODING_STARTED | DECODING_FINISHED | RENDERING_STARTED);
	}

	/// The absolute source-frame position of the render side: the seek
	/// base plus the rendered span of the current segment, scaled from
	/// the ring timeline back to the source rate.
	#[must_use]
	pub fn playback_position(&self, canonical_sample_rate: u32) -> u64 {
		let rendered = self.frames_rendered.load(Ordering::SeqCst);
		let source_rate = self.sample_rate.load(Ordering::SeqCst);
		let base = self.seek_base.load(Ordering::SeqCst);
		if source_rate == 0 || canonical_sample_rate == 0 || source_rate == canonical_sample_rate {
			return base + rendered;
		}
		base + (rendered as u128 * source_rate as u128 / canonical_sample_rate as u128) as u64
	}
}
