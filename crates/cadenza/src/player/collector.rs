use std::{
	sync::{Arc, atomic::Ordering},
	time::Duration,
};

use crate::state::{DECODING_FINISHED, RENDERING_FINISHED};

use super::shared::PlayerShared;

const COLLECTOR_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Reaps decoders whose slots have both finished flags set.
///
/// Closing a decoder can do real work (file handles, codec teardown),
/// so it happens here and never on the render or decode threads.
pub(crate) struct Collector {
	shared: Arc<PlayerShared>,
}

impl Collector {
	#[must_use]
	pub fn new(shared: Arc<PlayerShared>) -> Self {
		Self { shared }
	}

	pub fn start(self) -> std::thread::JoinHandle<()> {
		std::thread::spawn(move || {
			loop {
				self.shared
					.collector_semaphore
					.wait_timeout(COLLECTOR_WAIT_TIMEOUT);
				self.collect();
				if !self.shared.keep_collecting.load(Ordering::SeqCst) {
					break;
				}
			}
			log::debug!("collector thread exited");
		})
	}

	pub fn collect(&self) {
		for slot in self.shared.slots.iter() {
			if slot.is_claimed() && slot.has_flags(DECODING_FINISHED | RENDERING_FINISHED) {
				let decoder = slot.decoder.lock().take();
				let sequence = slot.sequence();
				drop(decoder);
				slot.release();
				// a queued decoder may have been waiting for a free slot
				self.shared.decoder_semaphore.post();
				log::debug!("closed decoder {sequence}");
			}
		}
	}
}
