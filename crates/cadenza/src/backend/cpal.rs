mod send_on_drop;
mod stream_manager;

use std::{
	error::Error as StdError,
	fmt::{Display, Formatter},
};

use cpal::{
	BufferSize, Device, StreamError,
	traits::{DeviceTrait, HostTrait},
};

use stream_manager::{StreamManager, StreamManagerController, command};

use super::{Backend, DeviceEvent, OutputConfig, Renderer};
use crate::error::PlaybackError;

/// Errors that can occur when using the cpal backend.
#[derive(Debug)]
pub enum Error {
	/// A default audio output device could not be determined.
	NoDefaultOutputDevice,
	/// An error occurred when getting the default output configuration.
	DefaultStreamConfigError(cpal::DefaultStreamConfigError),
	/// An error occurred when building the audio stream.
	BuildStreamError(cpal::BuildStreamError),
	/// An error occurred when starting the audio stream.
	PlayStreamError(cpal::PlayStreamError),
	/// An error occurred when pausing the audio stream.
	PauseStreamError(cpal::PauseStreamError),
	/// The stream thread has no renderer to start a stream with.
	NoRenderer,
	/// The stream thread did not acknowledge a command in time.
	CommandTimeout,
}

impl Display for Error {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::NoDefaultOutputDevice => {
				f.write_str("Cannot find the default audio output device")
			}
			Error::DefaultStreamConfigError(error) => error.fmt(f),
			Error::BuildStreamError(error) => error.fmt(f),
			Error::PlayStreamError(error) => error.fmt(f),
			Error::PauseStreamError(error) => error.fmt(f),
			Error::NoRenderer => f.write_str("The stream thread has no renderer"),
			Error::CommandTimeout => f.write_str("The stream thread did not respond in time"),
		}
	}
}

impl StdError for Error {
	fn source(&self) -> Option<&(dyn StdError + 'static)> {
		match self {
			Error::DefaultStreamConfigError(error) => Some(error),
			Error::BuildStreamError(error) => Some(error),
			Error::PlayStreamError(error) => Some(error),
			Error::PauseStreamError(error) => Some(error),
			_ => None,
		}
	}
}

impl From<cpal::DefaultStreamConfigError> for Error {
	fn from(error: cpal::DefaultStreamConfigError) -> Self {
		Self::DefaultStreamConfigError(error)
	}
}

impl From<cpal::BuildStreamError> for Error {
	fn from(error: cpal::BuildStreamError) -> Self {
		Self::BuildStreamError(error)
	}
}

impl From<cpal::PlayStreamError> for Error {
	fn from(error: cpal::PlayStreamError) -> Self {
		Self::PlayStreamError(error)
	}
}

impl From<cpal::PauseStreamError> for Error {
	fn from(error: cpal::PauseStreamError) -> Self {
		Self::PauseStreamError(error)
	}
}

impl From<Error> for PlaybackError {
	fn from(error: Error) -> Self {
		match error {
			Error::NoDefaultOutputDevice => PlaybackError::DeviceUnavailable,
			Error::DefaultStreamConfigError(_) => PlaybackError::DeviceUnavailable,
			Error::BuildStreamError(cpal::BuildStreamError::StreamConfigNotSupported) => {
				PlaybackError::StreamUnsupported
			}
			Error::BuildStreamError(_) => PlaybackError::DeviceUnavailable,
			Error::PlayStreamError(_) => PlaybackError::DeviceUnavailable,
			Error::PauseStreamError(_) => PlaybackError::DeviceUnavailable,
			Error::NoRenderer => PlaybackError::FatalInternal,
			Error::CommandTimeout => PlaybackError::Timeout,
		}
	}
}

/// Settings for the cpal backend.
pub struct CpalBackendSettings {
	/// The output audio device to use. If [`None`], the default output
	/// device will be used, and the stream will follow default device
	/// changes.
	pub device: Option<Device>,
	/// The buffer size used for the output stream.
	pub buffer_size: BufferSize,
}

impl Default for CpalBackendSettings {
	fn default() -> Self {
		Self {
			device: None,
			buffer_size: BufferSize::Default,
		}
	}
}

/**
A backend that uses [cpal](https://crates.io/crates/cpal) to connect a
[`Renderer`] to the operating system's audio driver.

The stream itself lives on a watchdog thread that restarts it when the
device disappears or the default device changes; the renderer travels
into the stream callback on `start` and back out on `stop`.
*/
pub struct CpalBackend {
	controller: StreamManagerController,
	rate_override: Option<u32>,
}

impl CpalBackend {
	/// Returns the oldest unhandled stream error, if any.
	pub fn pop_error(&mut self) -> Option<StreamError> {
		self.controller.pop_error()
	}
}

impl Backend for CpalBackend {
	type Settings = CpalBackendSettings;

	type Error = Error;

	fn setup(settings: Self::Settings) -> Result<(Self, OutputConfig), Self::Error> {
		let host = cpal::default_host();
		let (device, custom_device) = if let Some(device) = settings.device {
			(device, true)
		} else {
			(
				host.default_output_device()
					.ok_or(Error::NoDefaultOutputDevice)?,
				false,
			)
		};
		let config = device.default_output_config()?.config();
		let output_config = OutputConfig {
			sample_rate: config.sample_rate.0,
			channel_count: config.channels,
		};
		let controller =
			StreamManager::spawn(device, config, custom_device, settings.buffer_size);
		Ok((
			Self {
				controller,
				rate_override: None,
			},
			output_config,
		))
	}

	fn start(&mut self, renderer: Renderer) -> Result<(), Self::Error> {
		self.controller.send_renderer(renderer, self.rate_override);
		self.controller.execute(command::START)
	}

	fn pause(&mut self) -> Result<(), Self::Error> {
		self.controller.execute(command::PAUSE)
	}

	fn resume(&mut self) -> Result<(), Self::Error> {
		self.controller.execute(command::RESUME)
	}

	fn stop(&mut self) -> Option<Renderer> {
		if let Err(error) = self.controller.execute(command::STOP) {
			log::error!("could not stop the stream cleanly: {error}");
		}
		self.controller.take_renderer()
	}

	fn set_output_config(&mut self, config: OutputConfig) -> Result<(), Self::Error> {
		// the channel count is fixed by the engine's canonical format;
		// only the sample rate can be renegotiated
		self.rate_override = Some(config.sample_rate);
		Ok(())
	}

	fn pop_device_event(&mut self) -> Option<DeviceEvent> {
		self.controller.pop_event()
	}
}

impl Drop for CpalBackend {
	fn drop(&mut self) {
		self.controller.shutdown();
	}
}
