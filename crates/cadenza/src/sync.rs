use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A counting semaphore backing the decode and collector wake signals.
///
/// `post` keeps its critical section to a single increment so it is safe
/// to call from the render callback; `wait_timeout` is only ever called
/// from the decode and collector threads, which are allowed to block.
pub(crate) struct Semaphore {
	permits: Mutex<usize>,
	condvar: Condvar,
}

impl Semaphore {
	#[must_use]
	pub fn new() -> Self {
		Self {
			permits: Mutex::new(0),
			condvar: Condvar::new(),
		}
	}

	pub fn post(&self) {
		let mut permits = self.permits.lock();
		*permits += 1;
		drop(permits);
		self.condvar.notify_one();
	}

	/// Waits for a permit, giving up after `timeout`. Returns whether a
	/// permit was consumed.
	pub fn wait_timeout(&self, timeout: Duration) -> bool {
		let mut permits = self.permits.lock();
		if *permits == 0 {
			self.condvar.wait_for(&mut permits, timeout);
		}
		if *permits > 0 {
			*permits -= 1;
			true
		} else {
			false
		}
	}
}
