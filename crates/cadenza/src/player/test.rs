use std::{
	sync::{Arc, atomic::Ordering},
	time::{Duration, Instant},
};

use approx::assert_relative_eq;
use rtrb::Consumer;

use crate::{
	backend::{
		OutputConfig,
		mock::{MockBackend, MockBackendSettings},
	},
	convert::SampleType,
	decoder::{DecodeResponse, Decoder, SourceFormat, mock::MockDecoder},
	error::{DecodeError, PlaybackError},
	ring_buffer::RingBuffer,
	state::{DECODING_FINISHED, RENDERING_FINISHED},
};

use super::{
	AudioPlayer, AudioPlayerSettings, PlaybackEvent, PlaybackState,
	collector::Collector,
	decode::{DecodeWorker, NextStep},
	render::Renderer,
	shared::PlayerShared,
};

const TEST_SAMPLE_RATE: u32 = 10;

/// The decode worker, renderer and shared state wired together without
/// any threads, for deterministic scheduling from tests.
struct TestEngine {
	shared: Arc<PlayerShared>,
	worker: DecodeWorker,
	renderer: Renderer,
	render_events: Consumer<PlaybackEvent>,
	decode_events: Consumer<PlaybackEvent>,
}

fn test_engine(ring_capacity: usize) -> TestEngine {
	let ring = RingBuffer::new(ring_capacity, 1);
	let shared = Arc::new(PlayerShared::new(ring, TEST_SAMPLE_RATE, 1));
	let (render_event_producer, render_events) = rtrb::RingBuffer::new(16);
	let (decode_event_producer, decode_events) = rtrb::RingBuffer::new(16);
	let renderer = Renderer::new(shared.clone(), TEST_SAMPLE_RATE, render_event_producer);
	let worker = DecodeWorker::new(shared.clone(), 4, decode_event_producer);
	TestEngine {
		shared,
		worker,
		renderer,
		render_events,
		decode_events,
	}
}

impl TestEngine {
	fn enqueue(&self, decoder: MockDecoder) {
		self.shared.queue.lock().push_back(Box::new(decoder));
	}

	/// Runs the decode step function until it has nothing left to do.
	fn decode_until_idle(&mut self) {
		for _ in 0..10_000 {
			match self.worker.run() {
				NextStep::Continue => {}
				NextStep::Wait | NextStep::End => return,
			}
		}
		panic!("the decode loop did not settle");
	}

	fn render(&mut self, frames: usize) -> Vec<f32> {
		let mut out = vec![0.0f32; frames];
		self.renderer.process(&mut out, 1);
		out
	}

	fn collect(&self) {
		Collector::new(self.shared.clone()).collect();
	}
}

/// Ten samples 0.1, 0.2, .. 1.0; never zero, so rendered silence is
/// distinguishable from data.
fn ramp(frames: usize) -> Vec<f64> {
	(1..=frames).map(|i| i as f64 / 100.0).collect()
}

#[test]
fn renders_two_decoders_gaplessly() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(vec![0.1, 0.2, 0.3], TEST_SAMPLE_RATE));
	engine.enqueue(MockDecoder::new(vec![0.4, 0.5, 0.6], TEST_SAMPLE_RATE));
	engine.decode_until_idle();
	let out = engine.render(6);
	// the first sample of the second decoder lands exactly one frame
	// after the last sample of the first, with nothing in between
	for (i, expected) in [0.1, 0.2, 0.3, 0.4, 0.5, 0.6].iter().enumerate() {
		assert_relative_eq!(out[i], *expected as f32);
	}
	assert!(matches!(
		engine.render_events.pop(),
		Ok(PlaybackEvent::RenderingStarted { sequence: 1 })
	));
	assert!(matches!(
		engine.render_events.pop(),
		Ok(PlaybackEvent::RenderingStarted { sequence: 2 })
	));
	for slot in engine.shared.slots.iter() {
		if slot.is_claimed() {
			assert!(slot.has_flags(DECODING_FINISHED | RENDERING_FINISHED));
		}
	}
	engine.collect();
	assert!(engine.shared.slots.iter().all(|slot| !slot.is_claimed()));
}

#[test]
fn no_sample_of_the_second_decoder_renders_before_the_first_finishes() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(vec![0.1, 0.2, 0.3], TEST_SAMPLE_RATE));
	engine.enqueue(MockDecoder::new(vec![0.4, 0.5, 0.6], TEST_SAMPLE_RATE));
	engine.decode_until_idle();
	let first = engine.shared.earliest_slot(|_| true).unwrap().sequence();
	// render one frame at a time; the second decoder must not start
	// until the first has rendered every frame
	for _ in 0..3 {
		let started_second = engine
			.shared
			.earliest_slot(|slot| slot.sequence() > first)
			.map(|slot| slot.has_flags(crate::state::RENDERING_STARTED))
			.unwrap_or(false);
		assert!(!started_second);
		engine.render(1);
	}
	engine.render(1);
	let second = engine
		.shared
		.earliest_slot(|slot| slot.sequence() > first)
		.unwrap();
	assert!(second.has_flags(crate::state::RENDERING_STARTED));
}

#[test]
fn counter_invariants_hold_across_arbitrary_interleavings() {
	let mut engine = test_engine(8);
	engine.enqueue(MockDecoder::new(ramp(20), TEST_SAMPLE_RATE));
	engine.enqueue(MockDecoder::new(ramp(15), TEST_SAMPLE_RATE));
	let mut previous: Vec<(u64, u64, u64)> = vec![(0, 0, 0); 8];
	for step in 0..200 {
		if step % 3 == 0 {
			engine.worker.run();
		} else {
			engine.render(1 + step % 5);
		}
		for (index, slot) in engine.shared.slots.iter().enumerate() {
			if !slot.is_claimed() {
				previous[index] = (0, 0, 0);
				continue;
			}
			let decoded = slot.frames_decoded();
			let written = slot.frames_written();
			let rendered = slot.frames_rendered();
			assert!(rendered <= written, "rendered past what was written");
			assert!(decoded <= slot.total_frames(), "decoded past the end");
			let (previous_decoded, previous_written, previous_rendered) = previous[index];
			assert!(decoded >= previous_decoded, "frames_decoded went backwards");
			assert!(written >= previous_written, "frames_written went backwards");
			assert!(rendered >= previous_rendered, "frames_rendered went backwards");
			previous[index] = (decoded, written, rendered);
		}
	}
}

#[test]
fn pads_with_silence_on_underrun_and_resumes_bit_identically() {
	let mut engine = test_engine(8);
	engine.enqueue(MockDecoder::new(ramp(10), TEST_SAMPLE_RATE));
	engine.decode_until_idle();
	let mut collected: Vec<f32> = vec![];
	// request more than the ring can hold so the tail is padded
	let out = engine.render(8);
	let silent = out.iter().filter(|sample| **sample == 0.0).count();
	assert!(silent > 0, "expected an underrun");
	assert!(engine.shared.underrun_frames.load(Ordering::SeqCst) > 0);
	collected.extend(out.iter().copied().filter(|sample| *sample != 0.0));
	// refill and drain the rest; the stream must continue exactly
	// where it left off
	for _ in 0..5 {
		engine.decode_until_idle();
		let out = engine.render(4);
		collected.extend(out.iter().copied().filter(|sample| *sample != 0.0));
	}
	assert_eq!(collected.len(), 10);
	for (i, sample) in collected.iter().enumerate() {
		assert_relative_eq!(*sample, ((i + 1) as f64 / 100.0) as f32);
	}
}

#[test]
fn seeks_to_the_requested_frame() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(ramp(30), TEST_SAMPLE_RATE));
	engine.decode_until_idle();
	engine.render(6);
	let slot = engine.shared.current_slot().unwrap();
	engine.shared.is_seeking.store(true, Ordering::SeqCst);
	slot.request_seek(15);
	engine.decode_until_idle();
	assert!(!engine.shared.is_seeking.load(Ordering::SeqCst));
	let out = engine.render(3);
	// the mock decoder seeks exactly to packet-aligned frame 15
	assert_relative_eq!(out[0], 0.16);
	assert_relative_eq!(out[1], 0.17);
	assert_relative_eq!(out[2], 0.18);
	let slot = engine.shared.current_slot().unwrap();
	assert_eq!(slot.playback_position(TEST_SAMPLE_RATE), 18);
}

#[test]
fn seeking_to_the_current_frame_changes_nothing_downstream() {
	let straight = {
		let mut engine = test_engine(64);
		engine.enqueue(MockDecoder::new(ramp(30), TEST_SAMPLE_RATE));
		engine.decode_until_idle();
		engine.render(6);
		engine.render(6)
	};
	let seeked = {
		let mut engine = test_engine(64);
		engine.enqueue(MockDecoder::new(ramp(30), TEST_SAMPLE_RATE));
		engine.decode_until_idle();
		engine.render(6);
		let slot = engine.shared.current_slot().unwrap();
		engine.shared.is_seeking.store(true, Ordering::SeqCst);
		slot.request_seek(6);
		engine.decode_until_idle();
		engine.render(6)
	};
	assert_eq!(straight, seeked);
}

#[test]
fn seek_works_after_decoding_already_finished() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(ramp(12), TEST_SAMPLE_RATE));
	engine.decode_until_idle();
	let slot = engine.shared.current_slot().unwrap();
	assert!(slot.has_flags(DECODING_FINISHED));
	engine.shared.is_seeking.store(true, Ordering::SeqCst);
	slot.request_seek(3);
	engine.decode_until_idle();
	let out = engine.render(3);
	assert_relative_eq!(out[0], 0.04);
	assert_relative_eq!(out[1], 0.05);
	assert_relative_eq!(out[2], 0.06);
}

#[test]
fn seek_rolls_read_ahead_decoders_back() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(ramp(9), TEST_SAMPLE_RATE));
	engine.enqueue(MockDecoder::new(
		vec![0.91, 0.92, 0.93],
		TEST_SAMPLE_RATE,
	));
	engine.decode_until_idle();
	engine.render(3);
	// both decoders are fully in the ring; seek the first one
	let slot = engine.shared.current_slot().unwrap();
	engine.shared.is_seeking.store(true, Ordering::SeqCst);
	slot.request_seek(6);
	engine.decode_until_idle();
	// remainder of the first decoder, then the second from its start
	let out = engine.render(6);
	for (i, expected) in [0.07, 0.08, 0.09, 0.91, 0.92, 0.93].iter().enumerate() {
		assert_relative_eq!(out[i], *expected as f32);
	}
}

#[test]
fn unseekable_read_ahead_decoders_are_dropped_on_seek() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(ramp(9), TEST_SAMPLE_RATE));
	engine.enqueue(MockDecoder::new(vec![0.91, 0.92, 0.93], TEST_SAMPLE_RATE).unseekable());
	engine.decode_until_idle();
	engine.render(3);
	let slot = engine.shared.current_slot().unwrap();
	engine.shared.is_seeking.store(true, Ordering::SeqCst);
	slot.request_seek(3);
	engine.decode_until_idle();
	assert!(matches!(
		engine.decode_events.pop(),
		Ok(PlaybackEvent::DecoderError(_))
	));
	// only the seekable decoder's audio remains
	let out = engine.render(9);
	for (i, expected) in [0.04, 0.05, 0.06, 0.07, 0.08, 0.09].iter().enumerate() {
		assert_relative_eq!(out[i], *expected as f32);
	}
	assert_relative_eq!(out[6], 0.0);
	engine.collect();
	assert!(engine.shared.slots.iter().all(|slot| !slot.is_claimed()));
}

#[test]
fn a_failing_decoder_does_not_stop_the_engine() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(
		vec![0.1, 0.2, 0.3, f64::NAN, 0.0, 0.0],
		TEST_SAMPLE_RATE,
	));
	engine.enqueue(MockDecoder::new(vec![0.7, 0.8, 0.9], TEST_SAMPLE_RATE));
	engine.decode_until_idle();
	assert!(matches!(
		engine.decode_events.pop(),
		Ok(PlaybackEvent::DecoderError(_))
	));
	// the failed decoder's decoded audio plays out, then the next
	// decoder joins right after it
	let out = engine.render(6);
	for (i, expected) in [0.1, 0.2, 0.3, 0.7, 0.8, 0.9].iter().enumerate() {
		assert_relative_eq!(out[i], *expected as f32);
	}
}

#[test]
fn volume_scales_in_the_canonical_domain() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(vec![0.5, 0.5, 0.5], TEST_SAMPLE_RATE));
	engine.decode_until_idle();
	engine.shared.set_master_volume(0.5);
	let out = engine.render(1);
	assert_relative_eq!(out[0], 0.25);
	engine.shared.set_channel_volume(0, 0.0);
	let out = engine.render(1);
	assert_relative_eq!(out[0], 0.0);
	engine.shared.set_channel_volume(0, 1.0);
	engine.shared.set_master_volume(1.0);
	let out = engine.render(1);
	assert_relative_eq!(out[0], 0.5);
}

#[test]
fn mute_fills_silence_without_consuming_the_ring() {
	let mut engine = test_engine(64);
	engine.enqueue(MockDecoder::new(ramp(6), TEST_SAMPLE_RATE));
	engine.decode_until_idle();
	let before = engine.shared.ring.read_position();
	engine.shared.mute_output.store(true, Ordering::SeqCst);
	let out = engine.render(4);
	assert!(out.iter().all(|sample| *sample == 0.0));
	assert_eq!(engine.shared.ring.read_position(), before);
	engine.shared.mute_output.store(false, Ordering::SeqCst);
	let out = engine.render(1);
	assert_relative_eq!(out[0], 0.01);
}

#[test]
fn stream_rate_change_keeps_playing_from_the_same_frame() {
	let mut engine = test_engine(256);
	engine.enqueue(MockDecoder::new(
		(1..=200).map(|i| i as f64 / 1000.0).collect(),
		TEST_SAMPLE_RATE,
	));
	engine.decode_until_idle();
	engine.render(10);
	let position_before = engine
		.shared
		.current_slot()
		.unwrap()
		.playback_position(TEST_SAMPLE_RATE);
	// the device's virtual format flips to twice the rate; the
	// renderer rebuilds its converter chain while the stream is down
	engine.renderer.on_change_sample_rate(TEST_SAMPLE_RATE * 2);
	assert!(matches!(
		engine.render_events.pop(),
		Ok(PlaybackEvent::StreamFormatChanged { sample_rate }) if sample_rate == TEST_SAMPLE_RATE * 2
	));
	let position_after = engine
		.shared
		.current_slot()
		.unwrap()
		.playback_position(TEST_SAMPLE_RATE);
	assert_eq!(position_before, position_after);
	let decoded_before = engine
		.shared
		.earliest_slot(|_| true)
		.unwrap()
		.frames_decoded();
	// rendering continues through the new converter chain without the
	// decoder being reopened or re-decoded
	let mut saw_audio = false;
	for _ in 0..20 {
		let out = engine.render(256);
		if out.iter().any(|sample| *sample != 0.0) {
			saw_audio = true;
		}
	}
	assert!(saw_audio, "no audio after the rate change");
	assert_eq!(
		engine
			.shared
			.earliest_slot(|_| true)
			.unwrap()
			.frames_decoded(),
		decoded_before
	);
}

#[test]
fn a_source_at_another_rate_is_converted_while_decoding() {
	let mut engine = test_engine(1024);
	// a source at twice the canonical rate: 200 source frames should
	// come out to roughly 100 canonical frames
	engine.enqueue(MockDecoder::new(
		(1..=200).map(|i| i as f64 / 1000.0).collect(),
		TEST_SAMPLE_RATE * 2,
	));
	engine.decode_until_idle();
	let slot = engine.shared.earliest_slot(|_| true).unwrap();
	assert_eq!(slot.frames_decoded(), 200);
	assert!(slot.has_flags(DECODING_FINISHED));
	let written = slot.frames_written();
	assert!(
		(90..=260).contains(&(written as usize)),
		"expected about 100 canonical frames, got {written}"
	);
	// drain it and check the position maps back to the source rate
	while !engine
		.shared
		.earliest_slot(|_| true)
		.unwrap()
		.has_flags(RENDERING_FINISHED)
	{
		engine.render(64);
	}
	let slot = engine.shared.earliest_slot(|_| true).unwrap();
	assert_eq!(slot.frames_rendered(), written);
	let position = slot.playback_position(TEST_SAMPLE_RATE);
	assert_eq!(position, written * 2);
}

#[test]
fn more_decoders_than_slots_all_play_in_order() {
	let mut engine = test_engine(64);
	let queued = crate::ACTIVE_DECODER_CAPACITY + 2;
	for decoder_index in 0..queued {
		let base = decoder_index * 3;
		engine.enqueue(MockDecoder::new(
			(1..=3).map(|i| (base + i) as f64 / 100.0).collect(),
			TEST_SAMPLE_RATE,
		));
	}
	let mut collected: Vec<f32> = vec![];
	for _ in 0..100 {
		engine.decode_until_idle();
		let out = engine.render(4);
		collected.extend(out.iter().copied().filter(|sample| *sample != 0.0));
		engine.collect();
		if collected.len() >= queued * 3 {
			break;
		}
	}
	assert_eq!(collected.len(), queued * 3);
	for (i, sample) in collected.iter().enumerate() {
		assert_relative_eq!(*sample, ((i + 1) as f64 / 100.0) as f32);
	}
	assert!(engine.shared.slots.iter().all(|slot| !slot.is_claimed()));
	assert!(engine.shared.queue.lock().is_empty());
}

#[test]
fn enqueue_rejects_a_zero_sample_rate() {
	let mut player = test_player();
	let result = player.enqueue(MockDecoder::new(vec![0.1], 0));
	assert!(matches!(result, Err(PlaybackError::InvalidArgument)));
}

#[derive(Debug)]
struct StereoProbeDecoder;

impl Decoder for StereoProbeDecoder {
	fn format(&self) -> SourceFormat {
		SourceFormat {
			sample_rate: 44_100,
			channel_count: 2,
			sample_type: SampleType::F64,
			frames_per_packet: None,
		}
	}

	fn total_frames(&self) -> u64 {
		1
	}

	fn supports_seeking(&self) -> bool {
		false
	}

	fn seek(&mut self, _frame: u64) -> Result<u64, DecodeError> {
		Err(DecodeError::new("unsupported"))
	}

	fn decode(&mut self) -> Result<DecodeResponse, DecodeError> {
		Ok(DecodeResponse::EndOfStream)
	}
}

fn test_player() -> AudioPlayer<MockBackend> {
	AudioPlayer::new(AudioPlayerSettings {
		backend_settings: MockBackendSettings {
			config: OutputConfig {
				sample_rate: TEST_SAMPLE_RATE,
				channel_count: 1,
			},
		},
		ring_buffer_capacity: 64,
		decode_chunk_frames: 4,
		event_capacity: 16,
	})
	.unwrap()
}

/// Pumps the mock device one frame at a time until `count` non-silent
/// samples arrive or the deadline passes.
fn pump_samples(player: &mut AudioPlayer<MockBackend>, count: usize) -> Vec<f32> {
	let mut collected = vec![];
	let deadline = Instant::now() + Duration::from_secs(2);
	while collected.len() < count && Instant::now() < deadline {
		let mut out = [0.0f32; 1];
		player.backend_mut().process(&mut out);
		if out[0] != 0.0 {
			collected.push(out[0]);
		} else {
			std::thread::sleep(Duration::from_micros(200));
		}
	}
	collected
}

#[test]
fn plays_a_queue_end_to_end() {
	let mut player = test_player();
	player
		.enqueue(MockDecoder::new(vec![0.1, 0.2, 0.3], TEST_SAMPLE_RATE))
		.unwrap();
	player
		.enqueue(MockDecoder::new(vec![0.4, 0.5, 0.6], TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	assert!(player.is_playing());
	let samples = pump_samples(&mut player, 6);
	assert_eq!(samples.len(), 6);
	for (i, expected) in [0.1, 0.2, 0.3, 0.4, 0.5, 0.6].iter().enumerate() {
		assert_relative_eq!(samples[i], *expected as f32);
	}
}

#[test]
fn pause_is_idempotent_and_preserves_state() {
	let mut player = test_player();
	player
		.enqueue(MockDecoder::new(ramp(10), TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	let first = pump_samples(&mut player, 2);
	player.pause().unwrap();
	let position = player.current_frame();
	player.pause().unwrap();
	assert_eq!(player.state(), PlaybackState::Paused);
	assert_eq!(player.current_frame(), position);
	// a paused device produces silence
	let mut out = [9.9f32; 4];
	player.backend_mut().process(&mut out);
	assert!(out.iter().all(|sample| *sample == 0.0));
	player.play().unwrap();
	let rest = pump_samples(&mut player, 8);
	let mut all = first;
	all.extend(rest);
	for (i, sample) in all.iter().enumerate() {
		assert_relative_eq!(*sample, ((i + 1) as f64 / 100.0) as f32);
	}
}

#[test]
fn stop_drains_everything_within_the_bound() {
	let mut player = test_player();
	player
		.enqueue(MockDecoder::new(ramp(20), TEST_SAMPLE_RATE))
		.unwrap();
	player
		.enqueue(MockDecoder::new(ramp(20), TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	pump_samples(&mut player, 3);
	player.stop().unwrap();
	assert_eq!(player.state(), PlaybackState::Stopped);
	assert!(player.shared.slots.iter().all(|slot| !slot.is_claimed()));
	assert!(player.shared.queue.lock().is_empty());
	assert_eq!(player.shared.ring.write_position(), 0);
	assert_eq!(player.shared.ring.read_position(), 0);
	assert_eq!(player.current_frame(), None);
	// the engine is reusable after a stop
	player
		.enqueue(MockDecoder::new(vec![0.5, 0.5, 0.5], TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	assert_eq!(pump_samples(&mut player, 3).len(), 3);
}

#[test]
fn stop_twice_is_harmless() {
	let mut player = test_player();
	player
		.enqueue(MockDecoder::new(ramp(10), TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	pump_samples(&mut player, 1);
	player.stop().unwrap();
	player.stop().unwrap();
	assert_eq!(player.state(), PlaybackState::Stopped);
}

#[test]
fn enqueue_rejects_a_wider_channel_layout_than_the_output() {
	let mut player = test_player();
	let result = player.enqueue(StereoProbeDecoder);
	assert!(matches!(result, Err(PlaybackError::FormatUnsupported)));
	assert!(player.shared.queue.lock().is_empty());
}

#[test]
fn seek_requires_a_current_decoder() {
	let mut player = test_player();
	assert!(matches!(
		player.seek_to_frame(0),
		Err(PlaybackError::NotPlaying)
	));
}

#[test]
fn seek_rejects_an_unseekable_decoder() {
	let mut player = test_player();
	player
		.enqueue(MockDecoder::new(ramp(20), TEST_SAMPLE_RATE).unseekable())
		.unwrap();
	player.play().unwrap();
	pump_samples(&mut player, 1);
	assert!(!player.supports_seeking());
	assert!(matches!(
		player.seek_to_frame(6),
		Err(PlaybackError::SeekUnsupported)
	));
}

#[test]
fn seek_rejects_a_frame_past_the_end() {
	let mut player = test_player();
	player
		.enqueue(MockDecoder::new(ramp(20), TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	pump_samples(&mut player, 1);
	assert!(matches!(
		player.seek_to_frame(20),
		Err(PlaybackError::InvalidArgument)
	));
}

#[test]
fn controller_seek_lands_on_the_target() {
	let mut player = test_player();
	player
		.enqueue(MockDecoder::new(ramp(30), TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	pump_samples(&mut player, 2);
	player.seek_to_frame(15).unwrap();
	let samples = pump_samples(&mut player, 3);
	assert_relative_eq!(samples[0], 0.16);
	assert_relative_eq!(samples[1], 0.17);
	assert_relative_eq!(samples[2], 0.18);
}

#[test]
fn stream_format_change_reconfigures_and_notifies() {
	let mut player = test_player();
	player
		.enqueue(MockDecoder::new(ramp(30), TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	pump_samples(&mut player, 2);
	player.set_output_stream_format(TEST_SAMPLE_RATE * 2).unwrap();
	assert!(player.is_playing());
	let deadline = Instant::now() + Duration::from_secs(1);
	let mut saw_format_change = false;
	while Instant::now() < deadline {
		match player.pop_event() {
			Some(PlaybackEvent::StreamFormatChanged { sample_rate })
				if sample_rate == TEST_SAMPLE_RATE * 2 =>
			{
				saw_format_change = true;
				break;
			}
			Some(_) => {}
			None => std::thread::sleep(Duration::from_millis(1)),
		}
	}
	assert!(saw_format_change);
}

#[test]
fn queries_reflect_the_current_decoder() {
	let mut player = test_player();
	assert_eq!(player.current_frame(), None);
	assert_eq!(player.total_frames(), None);
	assert_eq!(player.total_time(), None);
	player
		.enqueue(MockDecoder::new(ramp(20), TEST_SAMPLE_RATE))
		.unwrap();
	player.play().unwrap();
	pump_samples(&mut player, 5);
	assert_eq!(player.total_frames(), Some(20));
	assert_eq!(player.total_time(), Some(2.0));
	let frame = player.current_frame().unwrap();
	assert!(frame >= 5, "rendered 5 samples but position is {frame}");
	assert!(player.supports_seeking());
}

#[test]
fn set_channel_volume_bounds_checks() {
	let mut player = test_player();
	assert!(player.set_channel_volume(0, 0.5).is_ok());
	assert!(matches!(
		player.set_channel_volume(1, 0.5),
		Err(PlaybackError::InvalidArgument)
	));
}
