//! Useful for testing and benchmarking.

use super::{Backend, OutputConfig, Renderer};

/// Settings for the mock backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockBackendSettings {
	/// The output configuration the backend should report.
	pub config: OutputConfig,
}

impl Default for MockBackendSettings {
	fn default() -> Self {
		Self {
			config: OutputConfig {
				sample_rate: 48_000,
				channel_count: 2,
			},
		}
	}
}

/// A backend that does not connect to any lower-level audio API, but
/// allows manually pumping the [`Renderer`] with
/// [`process`](MockBackend::process).
pub struct MockBackend {
	config: OutputConfig,
	renderer: Option<Renderer>,
	paused: bool,
}

impl MockBackend {
	/// Fills `out` the way a device callback would: silence while
	/// paused or before `start`, rendered audio otherwise.
	pub fn process(&mut self, out: &mut [f32]) {
		if self.paused {
			out.fill(0.0);
			return;
		}
		let channels = self.config.channel_count;
		match &mut self.renderer {
			Some(renderer) => renderer.process(out, channels),
			None => out.fill(0.0),
		}
	}

	/// Whether a renderer has been started and not stopped.
	#[must_use]
	pub fn is_started(&self) -> bool {
		self.renderer.is_some()
	}

	#[must_use]
	pub fn is_paused(&self) -> bool {
		self.paused
	}
}

impl Backend for MockBackend {
	type Settings = MockBackendSettings;

	type Error = ();

	fn setup(settings: Self::Settings) -> Result<(Self, OutputConfig), Self::Error> {
		Ok((
			Self {
				config: settings.config,
				renderer: None,
				paused: false,
			},
			settings.config,
		))
	}

	fn start(&mut self, renderer: Renderer) -> Result<(), Self::Error> {
		self.renderer = Some(renderer);
		self.paused = false;
		Ok(())
	}

	fn pause(&mut self) -> Result<(), Self::Error> {
		self.paused = true;
		Ok(())
	}

	fn resume(&mut self) -> Result<(), Self::Error> {
		self.paused = false;
		Ok(())
	}

	fn stop(&mut self) -> Option<Renderer> {
		self.paused = false;
		self.renderer.take()
	}

	fn set_output_config(&mut self, config: OutputConfig) -> Result<(), Self::Error> {
		self.config = config;
		Ok(())
	}
}
