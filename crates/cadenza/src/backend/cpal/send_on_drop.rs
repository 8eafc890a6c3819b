use std::ops::{Deref, DerefMut};

use rtrb::{Consumer, Producer, RingBuffer};

use crate::player::Renderer;

/// Sends the renderer back through a channel when dropped.
///
/// The stream callback owns the renderer while the stream is running;
/// wrapping it in a `SendOnDrop` means dropping the stream (or the
/// callback panicking) always returns the renderer to the stream
/// manager instead of destroying it.
pub(super) struct SendOnDrop {
	renderer: Option<Renderer>,
	producer: Producer<Renderer>,
}

impl SendOnDrop {
	pub fn new(renderer: Renderer) -> (Self, Consumer<Renderer>) {
		let (producer, consumer) = RingBuffer::new(1);
		(
			Self {
				renderer: Some(renderer),
				producer,
			},
			consumer,
		)
	}
}

impl Deref for SendOnDrop {
	type Target = Renderer;

	fn deref(&self) -> &Self::Target {
		self.renderer.as_ref().expect("renderer already sent")
	}
}

impl DerefMut for SendOnDrop {
	fn deref_mut(&mut self) -> &mut Self::Target {
		self.renderer.as_mut().expect("renderer already sent")
	}
}

impl Drop for SendOnDrop {
	fn drop(&mut self) {
		if let Some(renderer) = self.renderer.take() {
			self.producer.push(renderer).ok();
		}
	}
}
