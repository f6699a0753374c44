//! Notifications for whatever renders the bookmark list.

use crate::session::SessionPhase;

use sb_replica::Applied;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

const CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
	Phase { phase: SessionPhase },
	SnapshotLoading,
	SnapshotLoaded { records: usize, replayed: usize },
	SnapshotFailed { reason: String },
	/// The visible list changed because of a live event.
	Changed { kind: &'static str },
	/// The change feed ended on its own, the list no longer follows the store.
	FeedClosed,
	Reset,
}

/// Fan-out of [`Notice`]s to any number of listeners. Listeners that lag
/// simply miss notices, they are expected to re-read the replica.
#[derive(Debug, Clone)]
pub struct SyncBus {
	sender: broadcast::Sender<Notice>,
}

impl SyncBus {
	#[must_use]
	pub fn new() -> Self {
		let (sender, _) = broadcast::channel(CAPACITY);
		Self { sender }
	}

	pub fn emit(&self, notice: Notice) -> usize {
		trace!(?notice, "Emitting notice");

		self.sender.send(notice).unwrap_or_else(|_| {
			debug!("Notice emitted but no subscribers");
			0
		})
	}

	pub(crate) fn emit_applied(&self, kind: &'static str, applied: Applied) {
		if applied.changed() {
			self.emit(Notice::Changed { kind });
		}
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
		self.sender.subscribe()
	}

	#[must_use]
	pub fn subscriber_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for SyncBus {
	fn default() -> Self {
		Self::new()
	}
}
