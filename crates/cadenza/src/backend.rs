//! Communication between the engine and a low-level audio API.

#[cfg(feature = "cpal")]
pub mod cpal;
pub mod mock;

pub use crate::player::Renderer;

#[cfg(feature = "cpal")]
/// The default backend used by [`AudioPlayer`](crate::AudioPlayer)s.
///
/// If the `cpal` feature is enabled, this will be the cpal backend.
/// Otherwise, it will be the mock backend.
pub type DefaultBackend = cpal::CpalBackend;
#[cfg(not(feature = "cpal"))]
/// The default backend used by [`AudioPlayer`](crate::AudioPlayer)s.
///
/// If the `cpal` feature is enabled, this will be the cpal backend.
/// Otherwise, it will be the mock backend.
pub type DefaultBackend = mock::MockBackend;

/// The format of the hardware output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputConfig {
	/// Sample rate in Hz.
	pub sample_rate: u32,
	pub channel_count: u16,
}

/// A change reported by the device layer, surfaced through
/// [`AudioPlayer::pop_event`](crate::AudioPlayer::pop_event).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceEvent {
	/// The output device disappeared and no replacement could be
	/// started.
	DeviceLost,
	/// The stream was rebuilt with a new configuration (device change
	/// or virtual format change).
	ConfigChanged(OutputConfig),
}

/// Connects a [`Renderer`] to a lower level audio API.
pub trait Backend: Sized {
	/// Settings for this backend.
	type Settings;

	/// Errors that can occur when using this backend.
	type Error: std::fmt::Debug;

	/// Starts the backend and returns itself and the output
	/// configuration the engine's canonical format derives from.
	fn setup(settings: Self::Settings) -> Result<(Self, OutputConfig), Self::Error>;

	/// Sends the renderer to the backend and starts the device I/O.
	fn start(&mut self, renderer: Renderer) -> Result<(), Self::Error>;

	/// Suspends device I/O, keeping the renderer and its state.
	fn pause(&mut self) -> Result<(), Self::Error>;

	/// Resumes device I/O after [`pause`](Backend::pause).
	fn resume(&mut self) -> Result<(), Self::Error>;

	/// Tears down the stream and hands the renderer back so the
	/// controller can reconfigure or restart it.
	fn stop(&mut self) -> Option<Renderer>;

	/// Requests a stream configuration to be used by the next
	/// [`start`](Backend::start).
	fn set_output_config(&mut self, config: OutputConfig) -> Result<(), Self::Error>;

	/// Drains device-layer notifications. The default implementation
	/// reports none.
	fn pop_device_event(&mut self) -> Option<DeviceEvent> {
		None
	}
}
