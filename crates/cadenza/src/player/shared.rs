use std::{
	collections::VecDeque,
	sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use parking_lot::Mutex;

use crate::{
	ACTIVE_DECODER_CAPACITY, MAX_OUTPUT_CHANNELS,
	decoder::Decoder,
	ring_buffer::RingBuffer,
	state::{DecoderState, RENDERING_FINISHED},
	sync::Semaphore,
};

/// State shared between the controller, decode, render and collector
/// threads. The canonical format (sample rate and channel count) is
/// fixed for the lifetime of the engine; output-side sample rate
/// changes are absorbed by the renderer's converter chain.
pub(crate) struct PlayerShared {
	pub ring: RingBuffer,
	pub slots: [DecoderState; ACTIVE_DECODER_CAPACITY],
	pub queue: Mutex<VecDeque<Box<dyn Decoder>>>,
	pub canonical_sample_rate: u32,
	pub channel_count: usize,
	master_volume: AtomicU64,
	channel_volumes: [AtomicU64; MAX_OUTPUT_CHANNELS],
	pub mute_output: AtomicBool,
	pub is_seeking: AtomicBool,
	pub keep_decoding: AtomicBool,
	pub keep_collecting: AtomicBool,
	pub device_playing: AtomicBool,
	pub callback_generation: AtomicU64,
	pub underrun_frames: AtomicU64,
	pub next_sequence: AtomicU64,
	pub decoder_semaphore: Semaphore,
	pub collector_semaphore: Semaphore,
}

impl PlayerShared {
	#[must_use]
	pub fn new(ring: RingBuffer, canonical_sample_rate: u32, channel_count: usize) -> Self {
		Self {
			ring,
			slots: std::array::from_fn(|_| DecoderState::new()),
			queue: Mutex::new(VecDeque::new()),
			canonical_sample_rate,
			channel_count,
			master_volume: AtomicU64::new(1.0f64.to_bits()),
			channel_volumes: std::array::from_fn(|_| AtomicU64::new(1.0f64.to_bits())),
			mute_output: AtomicBool::new(false),
			is_seeking: AtomicBool::new(false),
			keep_decoding: AtomicBool::new(true),
			keep_collecting: AtomicBool::new(true),
			device_playing: AtomicBool::new(false),
			callback_generation: AtomicU64::new(0),
			underrun_frames: AtomicU64::new(0),
			// sequence 0 is reserved for empty slots
			next_sequence: AtomicU64::new(1),
			decoder_semaphore: Semaphore::new(),
			collector_semaphore: Semaphore::new(),
		}
	}

	#[must_use]
	pub fn master_volume(&self) -> f64 {
		f64::from_bits(self.master_volume.load(Ordering::SeqCst))
	}

	pub fn set_master_volume(&self, volume: f64) {
		self.master_volume
			.store(volume.max(0.0).to_bits(), Ordering::SeqCst);
	}

	#[must_use]
	pub fn channel_volume(&self, channel: usize) -> f64 {
		match self.channel_volumes.get(channel) {
			Some(volume) => f64::from_bits(volume.load(Ordering::SeqCst)),
			None => 1.0,
		}
	}

	pub fn set_channel_volume(&self, channel: usize, volume: f64) {
		if let Some(slot) = self.channel_volumes.get(channel) {
			slot.store(volume.max(0.0).to_bits(), Ordering::SeqCst);
		}
	}

	/// The earliest claimed slot matching `predicate`, in claim order.
	#[must_use]
	pub fn earliest_slot(
		&self,
		predicate: impl Fn(&DecoderState) -> bool,
	) -> Option<&DecoderState> {
		self.slots
			.iter()
			.filter(|slot| slot.is_claimed() && predicate(slot))
			.min_by_key(|slot| slot.sequence())
	}

	/// The decoder currently being (or next to be) rendered.
	#[must_use]
	pub fn current_slot(&self) -> Option<&DecoderState> {
		self.earliest_slot(|slot| !slot.has_flags(RENDERING_FINISHED))
	}
}
