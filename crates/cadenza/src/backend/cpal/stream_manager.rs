use std::{
	sync::{
		Arc,
		atomic::{AtomicU8, Ordering},
	},
	time::{Duration, Instant},
};

use cpal::{
	BufferSize, Device, SampleRate, Stream, StreamConfig, StreamError,
	traits::{DeviceTrait, HostTrait, StreamTrait},
};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::{
	backend::{DeviceEvent, OutputConfig},
	player::Renderer,
};

use super::{Error, send_on_drop::SendOnDrop};

const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);
const CHECK_STREAM_INTERVAL: Duration = Duration::from_millis(500);
const COMMAND_TIMEOUT: Duration = Duration::from_secs(1);

pub(super) mod command {
	pub const NONE: u8 = 0;
	pub const START: u8 = 1;
	pub const PAUSE: u8 = 2;
	pub const RESUME: u8 = 3;
	pub const STOP: u8 = 4;
	pub const SHUTDOWN: u8 = 5;
}

/// The backend's handle to the stream thread.
pub(super) struct StreamManagerController {
	command: Arc<AtomicU8>,
	result_consumer: Consumer<Result<(), Error>>,
	renderer_producer: Producer<(Renderer, Option<u32>)>,
	renderer_consumer: Consumer<Renderer>,
	event_consumer: Consumer<DeviceEvent>,
	error_consumer: Consumer<StreamError>,
}

impl StreamManagerController {
	/// Sends a command and waits for the stream thread to execute it.
	pub fn execute(&mut self, command: u8) -> Result<(), Error> {
		self.command.store(command, Ordering::SeqCst);
		let deadline = Instant::now() + COMMAND_TIMEOUT;
		loop {
			if let Ok(result) = self.result_consumer.pop() {
				return result;
			}
			if Instant::now() > deadline {
				return Err(Error::CommandTimeout);
			}
			std::thread::sleep(Duration::from_millis(1));
		}
	}

	pub fn send_renderer(&mut self, renderer: Renderer, rate_override: Option<u32>) {
		self.renderer_producer.push((renderer, rate_override)).ok();
	}

	pub fn take_renderer(&mut self) -> Option<Renderer> {
		self.renderer_consumer.pop().ok()
	}

	pub fn pop_event(&mut self) -> Option<DeviceEvent> {
		self.event_consumer.pop().ok()
	}

	pub fn pop_error(&mut self) -> Option<StreamError> {
		self.error_consumer.pop().ok()
	}

	/// Asks the stream thread to exit without waiting for it.
	pub fn shutdown(&self) {
		self.command.store(command::SHUTDOWN, Ordering::SeqCst);
	}
}

#[allow(clippy::large_enum_variant)]
enum State {
	Idle,
	Running {
		stream: Stream,
		stream_error_consumer: Consumer<StreamError>,
		renderer_consumer: Consumer<Renderer>,
	},
}

/// Owns the cpal stream on its own thread, restarting it on device
/// changes or disconnections and parking the renderer between streams.
pub(super) struct StreamManager {
	state: State,
	device: Device,
	config: StreamConfig,
	device_name: String,
	custom_device: bool,
	buffer_size: BufferSize,
	rate_override: Option<u32>,
	parked: Option<Renderer>,
	paused: bool,
	renderer_return_producer: Producer<Renderer>,
	event_producer: Producer<DeviceEvent>,
	error_forward_producer: Producer<StreamError>,
}

impl StreamManager {
	pub fn spawn(
		device: Device,
		config: StreamConfig,
		custom_device: bool,
		buffer_size: BufferSize,
	) -> StreamManagerController {
		let command = Arc::new(AtomicU8::new(command::NONE));
		let command_clone = command.clone();
		let (result_producer, result_consumer) = RingBuffer::new(4);
		let (renderer_producer, renderer_in_consumer) = RingBuffer::new(1);
		let (renderer_return_producer, renderer_consumer) = RingBuffer::new(1);
		let (event_producer, event_consumer) = RingBuffer::new(8);
		let (error_forward_producer, error_consumer) = RingBuffer::new(8);
		std::thread::spawn(move || {
			let manager = StreamManager {
				state: State::Idle,
				device_name: device_name(&device),
				device,
				config,
				custom_device,
				buffer_size,
				rate_override: None,
				parked: None,
				paused: false,
				renderer_return_producer,
				event_producer,
				error_forward_producer,
			};
			manager.run(command_clone, result_producer, renderer_in_consumer);
		});
		StreamManagerController {
			command,
			result_consumer,
			renderer_producer,
			renderer_consumer,
			event_consumer,
			error_consumer,
		}
	}

	fn run(
		mut self,
		command: Arc<AtomicU8>,
		mut results: Producer<Result<(), Error>>,
		mut renderer_in: Consumer<(Renderer, Option<u32>)>,
	) {
		let mut last_check = Instant::now();
		loop {
			std::thread::sleep(COMMAND_POLL_INTERVAL);
			match command.swap(command::NONE, Ordering::SeqCst) {
				command::NONE => {}
				command::START => {
					let result = match renderer_in.pop() {
						Ok((renderer, rate_override)) => {
							self.rate_override = rate_override;
							self.start_stream(renderer)
						}
						Err(_) => match self.parked.take() {
							Some(renderer) => self.start_stream(renderer),
							None => Err(Error::NoRenderer),
						},
					};
					results.push(result).ok();
				}
				command::PAUSE => {
					results.push(self.pause_stream()).ok();
				}
				command::RESUME => {
					results.push(self.resume_stream()).ok();
				}
				command::STOP => {
					self.stop_stream();
					if let Some(renderer) = self.parked.take() {
						self.renderer_return_producer.push(renderer).ok();
					}
					results.push(Ok(())).ok();
				}
				command::SHUTDOWN => {
					self.stop_stream();
					if let Some(renderer) = self.parked.take() {
						self.renderer_return_producer.push(renderer).ok();
					}
					break;
				}
				_ => unreachable!("unknown stream command"),
			}
			if last_check.elapsed() >= CHECK_STREAM_INTERVAL {
				self.check_stream();
				last_check = Instant::now();
			}
		}
		log::debug!("stream thread exited");
	}

	fn start_stream(&mut self, mut renderer: Renderer) -> Result<(), Error> {
		let mut config = self.config.clone();
		if let Some(rate) = self.rate_override {
			config.sample_rate = SampleRate(rate);
		}
		// this won't change anything if the buffer size is BufferSize::Default
		config.buffer_size = self.buffer_size;
		if renderer.stream_sample_rate() != config.sample_rate.0 {
			renderer.on_change_sample_rate(config.sample_rate.0);
		}
		let (mut wrapper, renderer_consumer) = SendOnDrop::new(renderer);
		let (mut stream_error_producer, stream_error_consumer) = RingBuffer::new(4);
		let channels = config.channels;
		let build_result = self.device.build_output_stream(
			&config,
			move |data: &mut [f32], _| {
				#[cfg(feature = "assert_no_alloc")]
				assert_no_alloc::assert_no_alloc(|| {
					process_renderer(&mut wrapper, data, channels);
				});
				#[cfg(not(feature = "assert_no_alloc"))]
				process_renderer(&mut wrapper, data, channels);
			},
			move |error| {
				stream_error_producer.push(error).ok();
			},
			None,
		);
		let stream = match build_result {
			Ok(stream) => stream,
			Err(error) => {
				self.recover_renderer(renderer_consumer);
				return Err(Error::BuildStreamError(error));
			}
		};
		if let Err(error) = stream.play() {
			drop(stream);
			self.recover_renderer(renderer_consumer);
			return Err(Error::PlayStreamError(error));
		}
		self.state = State::Running {
			stream,
			stream_error_consumer,
			renderer_consumer,
		};
		self.paused = false;
		Ok(())
	}

	fn recover_renderer(&mut self, mut renderer_consumer: Consumer<Renderer>) {
		if let Ok(renderer) = renderer_consumer.pop() {
			self.parked = Some(renderer);
		}
	}

	fn stop_stream(&mut self) {
		if let State::Running {
			stream,
			mut renderer_consumer,
			..
		} = std::mem::replace(&mut self.state, State::Idle)
		{
			drop(stream);
			match renderer_consumer.pop() {
				Ok(renderer) => self.parked = Some(renderer),
				Err(_) => log::error!("could not retrieve the renderer from a dropped stream"),
			}
		}
		self.paused = false;
	}

	fn pause_stream(&mut self) -> Result<(), Error> {
		if let State::Running { stream, .. } = &self.state {
			stream.pause().map_err(Error::PauseStreamError)?;
			self.paused = true;
		}
		Ok(())
	}

	fn resume_stream(&mut self) -> Result<(), Error> {
		if let State::Running { stream, .. } = &self.state {
			stream.play().map_err(Error::PlayStreamError)?;
			self.paused = false;
		}
		Ok(())
	}

	/// Restarts the stream if the device disappeared or (when following
	/// the default device) the default device or its rate changed.
	fn check_stream(&mut self) {
		let mut device_lost = false;
		let mut forwarded = Vec::new();
		if let State::Running {
			stream_error_consumer,
			..
		} = &mut self.state
		{
			while let Ok(error) = stream_error_consumer.pop() {
				if matches!(error, StreamError::DeviceNotAvailable) {
					device_lost = true;
				}
				forwarded.push(error);
			}
		} else {
			return;
		}
		for error in forwarded {
			self.error_forward_producer.push(error).ok();
		}
		if device_lost {
			self.stop_stream();
			self.restart_on_default_device();
			return;
		}
		// check for device changes if a custom device hasn't been specified
		// Disabled on macos due to audio artifacts that seem to occur when the device is
		// queried while playing.
		#[cfg(not(target_os = "macos"))]
		if !self.custom_device && !self.paused {
			if let Ok((device, config)) = default_device_and_config() {
				let name = device_name(&device);
				let rate_changed = self.rate_override.is_none()
					&& config.sample_rate != self.config.sample_rate;
				if name != self.device_name || rate_changed {
					self.stop_stream();
					self.adopt_device(device, config);
					self.restart_parked();
				}
			}
		}
	}

	fn restart_on_default_device(&mut self) {
		match default_device_and_config() {
			Ok((device, config)) => {
				self.adopt_device(device, config);
				self.restart_parked();
			}
			Err(_) => {
				self.event_producer.push(DeviceEvent::DeviceLost).ok();
			}
		}
	}

	fn adopt_device(&mut self, device: Device, config: StreamConfig) {
		self.device_name = device_name(&device);
		self.device = device;
		self.config = config;
	}

	fn restart_parked(&mut self) {
		let Some(renderer) = self.parked.take() else {
			return;
		};
		match self.start_stream(renderer) {
			Ok(()) => {
				self.event_producer
					.push(DeviceEvent::ConfigChanged(OutputConfig {
						sample_rate: self.config.sample_rate.0,
						channel_count: self.config.channels,
					}))
					.ok();
			}
			Err(error) => {
				log::error!("could not restart the stream: {error}");
				self.event_producer.push(DeviceEvent::DeviceLost).ok();
			}
		}
	}
}

fn default_device_and_config() -> Result<(Device, StreamConfig), Error> {
	let host = cpal::default_host();
	let device = host
		.default_output_device()
		.ok_or(Error::NoDefaultOutputDevice)?;
	let config = device.default_output_config()?.config();
	Ok((device, config))
}

fn device_name(device: &Device) -> String {
	device
		.name()
		.unwrap_or_else(|_| "device name unavailable".to_string())
}

fn process_renderer(renderer: &mut SendOnDrop, data: &mut [f32], channels: u16) {
	renderer.process(data, channels);
}
