use std::{
	future::{Future, IntoFuture},
	pin::Pin,
	task::{Context, Poll},
	time::Duration,
};

use async_channel as chan;
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, error, warn};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle on a joined channel. The feed task keeps running until the handle
/// is closed or dropped.
#[derive(Debug)]
pub struct Subscription {
	topic: String,
	stop_tx: chan::Sender<()>,
	maybe_handle: Option<JoinHandle<()>>,
}

impl Subscription {
	pub(crate) fn new(topic: String, stop_tx: chan::Sender<()>, handle: JoinHandle<()>) -> Self {
		Self {
			topic,
			stop_tx,
			maybe_handle: Some(handle),
		}
	}

	#[must_use]
	pub fn topic(&self) -> &str {
		&self.topic
	}

	/// Whether the feed task is still running.
	#[must_use]
	pub fn is_open(&self) -> bool {
		self.maybe_handle
			.as_ref()
			.is_some_and(|handle| !handle.is_finished())
	}

	/// Leaves the channel and waits for the feed task to finish.
	///
	/// Only the first call does anything; it returns `true`.
	pub async fn close(&mut self) -> bool {
		let Some(handle) = self.maybe_handle.take() else {
			return false;
		};

		if self.stop_tx.send(()).await.is_err() {
			debug!(topic = %self.topic, "Feed task already gone");
		}

		wait_stop_or_abort(handle).await;

		true
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(handle) = self.maybe_handle.take() {
			warn!(topic = %self.topic, "Subscription dropped without being closed");

			if self.stop_tx.try_send(()).is_err() {
				handle.abort();
			}
		}
	}
}

/// Stop signal handed to the feed task. Await `&stopper` to wait for it.
pub(crate) struct Stopper(pub(crate) chan::Receiver<()>);

pin_project_lite::pin_project! {
	pub(crate) struct StopFuture<'recv> {
		#[pin]
		fut: chan::Recv<'recv, ()>,
	}
}

impl Future for StopFuture<'_> {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let this = self.project();

		match this.fut.poll(cx) {
			Poll::Ready(res) => {
				if res.is_err() {
					warn!("Stop channel closed, will stop feed");
				}
				Poll::Ready(())
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

impl<'recv> IntoFuture for &'recv Stopper {
	type Output = ();
	type IntoFuture = StopFuture<'recv>;

	fn into_future(self) -> Self::IntoFuture {
		Self::IntoFuture { fut: self.0.recv() }
	}
}

async fn wait_stop_or_abort(handle: JoinHandle<()>) {
	let abort_handle = handle.abort_handle();

	match timeout(CLOSE_TIMEOUT, handle).await {
		Ok(Ok(())) => {}
		Ok(Err(e)) => {
			if e.is_panic() {
				error!("Feed task panicked");
			}
		}
		Err(_) => {
			error!("Feed task failed to stop in the allotted time, will force abortion");
			abort_handle.abort();
		}
	}
}
