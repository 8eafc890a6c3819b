
use std::{
	cell::UnsafeCell,
	sync::atomic::{AtomicU64, Ordering},
};

/**
A lock-free single-producer single-consumer ring buffer of deinterleaved
`f64` frames.

One frame is one sample per channel at the same instant. The payload is
stored planar: `channel_count` regions of `capacity` samples each inside
one contiguous allocation. Capacity is rounded up to the next power of
two so wrap-around reduces to masking.

The cursors are absolute: `write_position` and `read_position` count
every frame ever written or read and never wrap. This makes them usable
as a shared timeline: the decode thread stamps each decoder with the
write position at which its first frame entered the buffer, and the
render callback maps consumed spans back to decoders by intersecting
cursor ranges.

`write` and `read` never allocate, never block and never fail; when
fewer frames can be transferred than requested, the count actually
moved is returned.

# Concurrency contract

Exactly one thread may call `write` and exactly one thread may call
`read` at any moment (they may be different threads, concurrently).
`reset` may only be called while no thread can be inside `read` or
`write`. The cursors are published with release stores and observed
with acquire loads, which is what makes the disjoint payload regions
safe to access without locks.
*/
pub struct RingBuffer {
	samples: Box<[UnsafeCell<f64>]>,
	capacity: usize,
	mask: u64,
	channel_count: usize,
	write_pos: AtomicU64,
	read_pos: AtomicU64,
}

// Safe per the concurrency contract above: the writer only touches
// payload in [read_pos + capacity - free, write_pos + free) and the
// reader only touches [read_pos, write_pos), and the acquire/release
// cursor pair orders those accesses.
unsafe impl Sync for RingBuffer {}
unsafe impl Send for RingBuffer {}

impl RingBuffer {
	/// Creates a ring buffer holding at least `capacity_frames` frames
	/// of `channel_count` channels, zero-filled.
	#[must_use]
	pub fn new(capacity_frames: usize, channel_count: usize) -> Self {
		assert!(channel_count > 0, "ring buffer needs at least one channel");
		let capacity = capacity_frames.max(2).next_power_of_two();
		let samples = (0..capacity * channel_count)
			.map(|_| UnsafeCell::new(0.0))
			.collect::<Vec<_>>()
			.into_boxed_slice();
		Self {
			samples,
			capacity,
			mask: capacity as u64 - 1,
			channel_count,
			write_pos: AtomicU64::new(0),
			read_pos: AtomicU64::new(0),
		}
	}

	#[must_use]
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	#[must_use]
	pub fn channel_count(&self) -> usize {
		self.channel_count
	}

	/// The total number of frames ever written.
	#[must_use]
	pub fn write_position(&self) -> u64 {
		self.write_pos.load(Ordering::Acquire)
	}

	/// The total number of frames ever read.
	#[must_use]
	pub fn read_position(&self) -> u64 {
		self.read_pos.load(Ordering::Acquire)
	}

	#[must_use]
	pub fn frames_available_to_read(&self) -> usize {
		let write_pos = self.write_pos.load(Ordering::Acquire);
		let read_pos = self.read_pos.load(Ordering::Acquire);
		(write_pos - read_pos) as usize
	}

	#[must_use]
	pub fn frames_available_to_write(&self) -> usize {
		self.capacity - self.frames_available_to_read()
	}

	/// Writes up to `frames` frames taken from `source[channel][offset..]`
	/// and returns the number of frames actually written.
	///
	/// Only the producer thread may call this.
	pub fn write(&self, source: &[Vec<f64>], offset: usize, frames: usize) -> usize {
		let write_pos = self.write_pos.load(Ordering::Relaxed);
		let read_pos = self.read_pos.load(Ordering::Acquire);
		let free = self.capacity - (write_pos - read_pos) as usize;
		let mut count = frames.min(free);
		for channel in source.iter().take(self.channel_count) {
			count = count.min(channel.len().saturating_sub(offset));
		}
		for (channel_index, channel) in source.iter().enumerate().take(self.channel_count) {
			let base = channel_index * self.capacity;
			for i in 0..count {
				let index = base + ((write_pos + i as u64) & self.mask) as usize;
				unsafe {
					*self.samples[index].get() = channel[offset + i];
				}
			}
		}
		self.write_pos
			.store(write_pos + count as u64, Ordering::Release);
		count
	}

	/// Reads up to `frames` frames into `dest[channel][offset..]` and
	/// returns the number of frames actually read.
	///
	/// Only the consumer thread may call this.
	pub fn read(&self, dest: &mut [Vec<f64>], offset: usize, frames: usize) -> usize {
		let read_pos = self.read_pos.load(Ordering::Relaxed);
		let write_pos = self.write_pos.load(Ordering::Acquire);
		let available = (write_pos - read_pos) as usize;
		let mut count = frames.min(available);
		for channel in dest.iter().take(self.channel_count) {
			count = count.min(channel.len().saturating_sub(offset));
		}
		for (channel_index, channel) in dest.iter_mut().enumerate().take(self.channel_count) {
			let base = channel_index * self.capacity;
			for i in 0..count {
				let index = base + ((read_pos + i as u64) & self.mask) as usize;
				channel[offset + i] = unsafe { *self.samples[index].get() };
			}
		}
		self.read_pos
			.store(read_pos + count as u64, Ordering::Release);
		count
	}

	/// Zeroes both cursors and the payload.
	///
	/// May only be called while no thread can be inside `read` or
	/// `write` (device stopped or muted, decode thread idle).
	pub fn reset(&self) {
		for cell in self.samples.iter() {
			unsafe {
				*cell.get() = 0.0;
			}
		}
		self.write_pos.store(0, Ordering::SeqCst);
		self.read_pos.store(0, Ordering::SeqCst);
	}
}
