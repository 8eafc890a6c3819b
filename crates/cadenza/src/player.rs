mod collector;
mod decode;
mod event;
mod render;
mod shared;
#[cfg(test)]
mod test;

pub use event::PlaybackEvent;
pub use render::Renderer;

use std::{
	sync::{Arc, atomic::Ordering},
	thread::JoinHandle,
	time::{Duration, Instant},
};

use rtrb::Consumer;

use crate::{
	MAX_OUTPUT_CHANNELS,
	backend::{Backend, DeviceEvent, OutputConfig},
	decoder::Decoder,
	error::PlaybackError,
	ring_buffer::RingBuffer,
	state::{CANCEL_DECODING, DECODING_FINISHED, RENDERING_FINISHED},
};

use self::{collector::Collector, decode::DecodeWorker, shared::PlayerShared};

const STOP_TIMEOUT: Duration = Duration::from_millis(500);
const SEEK_TIMEOUT: Duration = Duration::from_millis(500);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The playback state of an [`AudioPlayer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
	/// Device I/O is stopped and no decoders are live.
	Stopped,
	/// The device is running and consuming audio.
	Playing,
	/// Device I/O is suspended; all state is preserved.
	Paused,
}

/// Settings for an [`AudioPlayer`].
pub struct AudioPlayerSettings<B: Backend> {
	/// Settings for the device backend.
	pub backend_settings: B::Settings,
	/// The capacity of the decoded-audio ring buffer in frames
	/// (rounded up to a power of two).
	pub ring_buffer_capacity: usize,
	/// The minimum free ring space, in frames, before the decode
	/// thread pulls another packet.
	pub decode_chunk_frames: usize,
	/// The capacity of each asynchronous event queue.
	pub event_capacity: usize,
}

impl<B: Backend> Default for AudioPlayerSettings<B>
where
	B::Settings: Default,
{
	fn default() -> Self {
		Self {
			backend_settings: B::Settings::default(),
			ring_buffer_capacity: 16_384,
			decode_chunk_frames: 4096,
			event_capacity: 64,
		}
	}
}

/**
Plays a queue of [`Decoder`]s gaplessly through an audio device.

Decoders are drained by a decode thread into a lock-free ring buffer
and consumed by the device's realtime render callback; successive
decoders join with sample accuracy. The player itself is the control
surface: it owns the backend, serializes all state transitions (it is
`&mut self` everywhere) and never touches audio data.

```no_run
use cadenza::{AudioPlayer, AudioPlayerSettings, backend::DefaultBackend};
use cadenza::decoder::SymphoniaDecoder;

let mut player = AudioPlayer::<DefaultBackend>::new(AudioPlayerSettings::default())?;
player.enqueue(SymphoniaDecoder::from_file("intro.flac")?)?;
player.enqueue(SymphoniaDecoder::from_file("main.flac")?)?;
player.play()?;
# Result::<(), Box<dyn std::error::Error>>::Ok(())
```
*/
pub struct AudioPlayer<B: Backend> {
	backend: B,
	shared: Arc<PlayerShared>,
	renderer: Option<Renderer>,
	state: PlaybackState,
	stream_sample_rate: u32,
	decode_thread: Option<JoinHandle<()>>,
	collector_thread: Option<JoinHandle<()>>,
	render_event_consumer: Consumer<PlaybackEvent>,
	decode_event_consumer: Consumer<PlaybackEvent>,
}

impl<B: Backend> AudioPlayer<B> {
	/// Creates a new [`AudioPlayer`] and its worker threads. The
	/// engine starts in the [`Stopped`](PlaybackState::Stopped) state.
	pub fn new(settings: AudioPlayerSettings<B>) -> Result<Self, B::Error> {
		let (backend, config) = B::setup(settings.backend_settings)?;
		let channel_count = (config.channel_count as usize).clamp(1, MAX_OUTPUT_CHANNELS);
		let ring = RingBuffer::new(settings.ring_buffer_capacity, channel_count);
		// the decode thread gates on this much free space; a chunk
		// larger than the ring would deadlock it
		let decode_chunk_frames = settings
			.decode_chunk_frames
			.clamp(1, ring.capacity() / 2);
		let shared = Arc::new(PlayerShared::new(ring, config.sample_rate, channel_count));
		let (render_event_producer, render_event_consumer) =
			rtrb::RingBuffer::new(settings.event_capacity);
		let (decode_event_producer, decode_event_consumer) =
			rtrb::RingBuffer::new(settings.event_capacity);
		let renderer = Renderer::new(shared.clone(), config.sample_rate, render_event_producer);
		let decode_thread =
			DecodeWorker::new(shared.clone(), decode_chunk_frames, decode_event_producer).start();
		let collector_thread = Collector::new(shared.clone()).start();
		Ok(Self {
			backend,
			shared,
			renderer: Some(renderer),
			state: PlaybackState::Stopped,
			stream_sample_rate: config.sample_rate,
			decode_thread: Some(decode_thread),
			collector_thread: Some(collector_thread),
			render_event_consumer,
			decode_event_consumer,
		})
	}

	/// Starts (or resumes) device I/O. Idempotent while playing.
	pub fn play(&mut self) -> Result<(), PlaybackError> {
		match self.state {
			PlaybackState::Playing => Ok(()),
			PlaybackState::Paused => {
				self.backend.resume().map_err(backend_error)?;
				self.shared.device_playing.store(true, Ordering::SeqCst);
				self.state = PlaybackState::Playing;
				Ok(())
			}
			PlaybackState::Stopped => {
				let renderer = self.renderer.take().ok_or(PlaybackError::FatalInternal)?;
				self.backend.start(renderer).map_err(backend_error)?;
				self.shared.device_playing.store(true, Ordering::SeqCst);
				self.state = PlaybackState::Playing;
				Ok(())
			}
		}
	}

	/// Suspends device I/O, preserving all playback state. Idempotent.
	pub fn pause(&mut self) -> Result<(), PlaybackError> {
		if self.state == PlaybackState::Playing {
			self.backend.pause().map_err(backend_error)?;
			self.shared.device_playing.store(false, Ordering::SeqCst);
			self.state = PlaybackState::Paused;
		}
		Ok(())
	}

	/**
	Stops playback entirely: stops device I/O, cancels and closes every
	live decoder, clears the queue and resets the ring buffer.

	Blocks for a bounded time while the decode and collector threads
	drain; returns [`PlaybackError::Timeout`] if they do not settle
	within the bound.
	*/
	pub fn stop(&mut self) -> Result<(), PlaybackError> {
		if self.state != PlaybackState::Stopped {
			if let Some(renderer) = self.backend.stop() {
				self.renderer = Some(renderer);
			}
			self.shared.device_playing.store(false, Ordering::SeqCst);
			self.state = PlaybackState::Stopped;
		}
		self.shared.queue.lock().clear();
		// keep flagging while we wait: the decode thread may be mid-claim
		let decode_idle = self.wait_bounded(STOP_TIMEOUT, || {
			let mut idle = true;
			for slot in self.shared.slots.iter() {
				if slot.is_claimed() && !slot.has_flags(DECODING_FINISHED) {
					if slot.set_flags_if_claimed(CANCEL_DECODING) {
						self.shared.decoder_semaphore.post();
						idle = false;
					}
				}
			}
			idle
		});
		if decode_idle {
			self.shared.ring.reset();
		}
		for slot in self.shared.slots.iter() {
			slot.set_flags_if_claimed(DECODING_FINISHED | RENDERING_FINISHED);
		}
		self.shared.collector_semaphore.post();
		let collected = self.wait_bounded(STOP_TIMEOUT, || {
			self.shared.slots.iter().all(|slot| !slot.is_claimed())
		});
		self.shared.is_seeking.store(false, Ordering::SeqCst);
		self.shared.mute_output.store(false, Ordering::SeqCst);
		if decode_idle && collected {
			Ok(())
		} else {
			Err(PlaybackError::Timeout)
		}
	}

	/**
	Adds a decoder to the end of the playback queue, taking ownership.

	Returns [`PlaybackError::FormatUnsupported`] if the decoder's
	channel count exceeds the engine's configured channel count; the
	engine never reconfigures itself mid-playback.
	*/
	pub fn enqueue(&mut self, decoder: impl Decoder + 'static) -> Result<(), PlaybackError> {
		let format = decoder.format();
		if format.sample_rate == 0 || format.channel_count == 0 {
			return Err(PlaybackError::InvalidArgument);
		}
		if format.channel_count as usize > self.shared.channel_count {
			return Err(PlaybackError::FormatUnsupported);
		}
		self.shared.queue.lock().push_back(Box::new(decoder));
		self.shared.decoder_semaphore.post();
		Ok(())
	}

	/**
	Seeks the current decoder to `frame`.

	Output is muted while the ring buffer is drained and refilled past
	the seek target; the call returns once audio from the new position
	is buffered. A failed seek leaves the playback position unchanged.
	*/
	pub fn seek_to_frame(&mut self, frame: u64) -> Result<(), PlaybackError> {
		let slot = self.shared.current_slot().ok_or(PlaybackError::NotPlaying)?;
		{
			let decoder = slot.decoder.lock();
			let decoder = decoder.as_ref().ok_or(PlaybackError::NotPlaying)?;
			if !decoder.supports_seeking() {
				return Err(PlaybackError::SeekUnsupported);
			}
		}
		if frame >= slot.total_frames() {
			return Err(PlaybackError::InvalidArgument);
		}
		self.shared.is_seeking.store(true, Ordering::SeqCst);
		slot.request_seek(frame);
		self.shared.decoder_semaphore.post();
		let done = self.wait_bounded(SEEK_TIMEOUT, || {
			!self.shared.is_seeking.load(Ordering::SeqCst)
		});
		if done { Ok(()) } else { Err(PlaybackError::Timeout) }
	}

	/// Whether the current decoder supports seeking.
	#[must_use]
	pub fn supports_seeking(&self) -> bool {
		self.shared
			.current_slot()
			.and_then(|slot| {
				slot.decoder
					.lock()
					.as_ref()
					.map(|decoder| decoder.supports_seeking())
			})
			.unwrap_or(false)
	}

	/// Sets the volume applied to every channel, as an amplitude
	/// factor. Takes effect on the next render callback.
	pub fn set_master_volume(&mut self, volume: f64) {
		self.shared.set_master_volume(volume);
	}

	/// Sets the volume of one output channel, as an amplitude factor.
	pub fn set_channel_volume(&mut self, channel: usize, volume: f64) -> Result<(), PlaybackError> {
		if channel >= self.shared.channel_count {
			return Err(PlaybackError::InvalidArgument);
		}
		self.shared.set_channel_volume(channel, volume);
		Ok(())
	}

	/**
	Rebuilds the output stream for a new sample rate.

	The device is stopped, the renderer's converter chain is rebuilt
	and the device restarted if it had been playing. Decoders are not
	touched; playback continues from the same source frame.
	*/
	pub fn set_output_stream_format(&mut self, sample_rate: u32) -> Result<(), PlaybackError> {
		if sample_rate == 0 {
			return Err(PlaybackError::InvalidArgument);
		}
		if sample_rate == self.stream_sample_rate {
			return Ok(());
		}
		let was_playing = self.state == PlaybackState::Playing;
		if self.state != PlaybackState::Stopped {
			if let Some(renderer) = self.backend.stop() {
				self.renderer = Some(renderer);
			}
			self.shared.device_playing.store(false, Ordering::SeqCst);
			self.state = PlaybackState::Stopped;
		}
		let config = OutputConfig {
			sample_rate,
			channel_count: self.shared.channel_count as u16,
		};
		if let Err(error) = self.backend.set_output_config(config) {
			log::error!("stream format change rejected: {error:?}");
			// roll back to the previous configuration
			if was_playing {
				self.play()?;
			}
			return Err(PlaybackError::FormatUnsupported);
		}
		if let Some(renderer) = &mut self.renderer {
			renderer.on_change_sample_rate(sample_rate);
		}
		self.stream_sample_rate = sample_rate;
		if was_playing {
			self.play()?;
		}
		Ok(())
	}

	#[must_use]
	pub fn state(&self) -> PlaybackState {
		self.state
	}

	#[must_use]
	pub fn is_playing(&self) -> bool {
		self.state == PlaybackState::Playing
	}

	/// The playback position within the current decoder, in source
	/// frames, or [`None`] when no decoder is live.
	#[must_use]
	pub fn current_frame(&self) -> Option<u64> {
		self.shared
			.current_slot()
			.map(|slot| slot.playback_position(self.shared.canonical_sample_rate))
	}

	/// The length of the current decoder in source frames.
	#[must_use]
	pub fn total_frames(&self) -> Option<u64> {
		self.shared.current_slot().map(|slot| slot.total_frames())
	}

	/// The playback position within the current decoder, in seconds.
	#[must_use]
	pub fn current_time(&self) -> Option<f64> {
		self.shared.current_slot().map(|slot| {
			slot.playback_position(self.shared.canonical_sample_rate) as f64
				/ slot.sample_rate() as f64
		})
	}

	/// The duration of the current decoder, in seconds.
	#[must_use]
	pub fn total_time(&self) -> Option<f64> {
		self.shared
			.current_slot()
			.map(|slot| slot.total_frames() as f64 / slot.sample_rate() as f64)
	}

	/// The total number of frames the render callback padded with
	/// silence because the ring buffer was starved mid-decoder.
	#[must_use]
	pub fn underrun_frames(&self) -> u64 {
		self.shared.underrun_frames.load(Ordering::SeqCst)
	}

	/// Returns the oldest unread asynchronous event, if any.
	pub fn pop_event(&mut self) -> Option<PlaybackEvent> {
		if let Ok(event) = self.render_event_consumer.pop() {
			return Some(event);
		}
		if let Ok(event) = self.decode_event_consumer.pop() {
			return Some(event);
		}
		match self.backend.pop_device_event() {
			Some(DeviceEvent::DeviceLost) => {
				// the stream is gone; reflect that in the engine state
				self.shared.device_playing.store(false, Ordering::SeqCst);
				self.state = PlaybackState::Stopped;
				Some(PlaybackEvent::PlaybackInterrupted)
			}
			Some(DeviceEvent::ConfigChanged(config)) => {
				self.stream_sample_rate = config.sample_rate;
				Some(PlaybackEvent::StreamFormatChanged {
					sample_rate: config.sample_rate,
				})
			}
			None => None,
		}
	}

	/// Returns a mutable reference to this player's backend.
	pub fn backend_mut(&mut self) -> &mut B {
		&mut self.backend
	}

	fn wait_bounded(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
		let deadline = Instant::now() + timeout;
		loop {
			if done() {
				return true;
			}
			if Instant::now() > deadline {
				return false;
			}
			std::thread::sleep(WAIT_POLL_INTERVAL);
		}
	}
}

impl<B: Backend> Drop for AudioPlayer<B> {
	fn drop(&mut self) {
		self.shared.keep_decoding.store(false, Ordering::SeqCst);
		self.shared.keep_collecting.store(false, Ordering::SeqCst);
		self.shared.decoder_semaphore.post();
		self.shared.collector_semaphore.post();
		if let Some(handle) = self.decode_thread.take() {
			handle.join().ok();
		}
		if let Some(handle) = self.collector_thread.take() {
			handle.join().ok();
		}
		self.backend.stop();
	}
}

fn backend_error<E: std::fmt::Debug>(error: E) -> PlaybackError {
	log::error!("backend error: {error:?}");
	PlaybackError::DeviceUnavailable
}
