//! Ties the replica and its change feed to the authentication state: while a
//! session exists exactly one feed subscription is open and the replica holds
//! that user's bookmarks, otherwise both are empty.

use crate::{
	auth::AuthChange,
	bus::{Notice, SyncBus},
	remote::{ChangeFeed, FeedHandle, FeedSubscription},
	sync::Synchronizer,
};

use sb_cloud_api::{auth::Session, Bookmark};
use sb_replica::ChangeEvent;

use std::sync::Arc;

use serde::Serialize;
use tokio::{
	select, spawn,
	sync::{broadcast, mpsc, Mutex, Notify},
	task::JoinHandle,
};
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
	/// Waiting for the initial session lookup.
	Authenticating,
	Unauthenticated,
	/// Signed in with the change feed open.
	Subscribed,
	/// Terminal, nothing is reacted upon anymore.
	TornDown,
}

struct ActiveFeed {
	handle: Box<dyn FeedHandle>,
	pump: JoinHandle<()>,
}

struct State {
	phase: SessionPhase,
	active: Option<ActiveFeed>,
}

pub struct SessionLifecycle {
	sync: Synchronizer,
	feed: Arc<dyn ChangeFeed>,
	bus: SyncBus,
	state: Mutex<State>,
	stopped: Notify,
}

impl SessionLifecycle {
	pub fn new(sync: Synchronizer, feed: Arc<dyn ChangeFeed>) -> Self {
		Self {
			bus: sync.bus().clone(),
			sync,
			feed,
			state: Mutex::new(State {
				phase: SessionPhase::Authenticating,
				active: None,
			}),
			stopped: Notify::new(),
		}
	}

	pub async fn phase(&self) -> SessionPhase {
		self.state.lock().await.phase
	}

	#[must_use]
	pub const fn sync(&self) -> &Synchronizer {
		&self.sync
	}

	/// Outcome of the initial session lookup. Ignored once anything else has
	/// moved the lifecycle out of [`SessionPhase::Authenticating`].
	pub async fn resolve(&self, session: Option<Session>) {
		{
			let mut state = self.state.lock().await;
			if state.phase != SessionPhase::Authenticating {
				debug!(phase = ?state.phase, "Session already resolved, ignoring lookup result");
				return;
			}

			if session.is_none() {
				self.set_phase(&mut state, SessionPhase::Unauthenticated);
				return;
			}
		}

		if let Some(session) = session {
			self.enter(session).await;
		}
	}

	pub async fn on_auth_change(&self, change: AuthChange) {
		match change {
			AuthChange::SignedIn(session) | AuthChange::TokenRefreshed(session) => {
				self.enter(session).await;
			}
			AuthChange::SignedOut => self.leave().await,
		}
	}

	/// Resolves the initial session, then follows auth changes until the
	/// lifecycle is torn down or the sender goes away.
	pub async fn run(
		self: Arc<Self>,
		initial: Option<Session>,
		mut changes: broadcast::Receiver<AuthChange>,
	) {
		self.resolve(initial).await;

		loop {
			select! {
				() = self.stopped.notified() => break,
				change = changes.recv() => match change {
					Ok(change) => self.on_auth_change(change).await,
					Err(broadcast::error::RecvError::Lagged(skipped)) => {
						warn!(skipped, "Missed auth changes");
					}
					Err(broadcast::error::RecvError::Closed) => break,
				}
			}

			if self.phase().await == SessionPhase::TornDown {
				break;
			}
		}

		debug!("Session lifecycle stopped following auth changes");
	}

	/// Releases the feed and clears the replica. Returns `true` only for the
	/// call that actually tore down.
	pub async fn teardown(&self) -> bool {
		let mut state = self.state.lock().await;
		if state.phase == SessionPhase::TornDown {
			return false;
		}

		self.release(&mut state).await;
		self.sync.reset().await;
		self.set_phase(&mut state, SessionPhase::TornDown);
		// Stored as a permit if `run` is busy with a change right now.
		self.stopped.notify_one();

		true
	}

	#[instrument(skip_all, fields(user_id = %session.user.id))]
	async fn enter(&self, session: Session) {
		let generation = {
			let mut state = self.state.lock().await;
			if state.phase == SessionPhase::TornDown {
				debug!("Torn down, ignoring session");
				return;
			}

			self.release(&mut state).await;

			// Events arriving from here on are buffered until the snapshot lands.
			let generation = self.sync.begin(session.user.id).await;

			match self.feed.subscribe(&session).await {
				Ok(FeedSubscription { events, handle }) => {
					state.active = Some(ActiveFeed {
						handle,
						pump: spawn(pump(self.sync.clone(), events)),
					});
				}
				Err(e) => error!(?e, "Failed to open the bookmark feed"),
			}

			self.set_phase(&mut state, SessionPhase::Subscribed);

			generation
		};

		match self.sync.load_snapshot(&session, generation).await {
			Ok(Some(records)) => info!(count = records.len(), "Bookmarks loaded"),
			Ok(None) => debug!("Session changed while loading, snapshot dropped"),
			Err(e) => error!(?e, "Failed to load bookmarks"),
		}
	}

	async fn leave(&self) {
		let mut state = self.state.lock().await;
		if state.phase == SessionPhase::TornDown {
			return;
		}

		self.release(&mut state).await;
		self.sync.reset().await;
		self.set_phase(&mut state, SessionPhase::Unauthenticated);
	}

	async fn release(&self, state: &mut State) {
		let Some(ActiveFeed { mut handle, pump }) = state.active.take() else {
			return;
		};

		// Stopped before closing the feed, so an ending feed is not reported.
		pump.abort();
		if let Err(e) = pump.await {
			if !e.is_cancelled() {
				error!(?e, "Bookmark feed pump failed");
			}
		}

		if !handle.close().await {
			warn!("Bookmark feed was already closed");
		}

		debug!("Released bookmark feed");
	}

	fn set_phase(&self, state: &mut State, phase: SessionPhase) {
		if state.phase != phase {
			info!(from = ?state.phase, to = ?phase, "Session phase changed");
		}

		state.phase = phase;
		self.bus.emit(Notice::Phase { phase });
	}
}

async fn pump(sync: Synchronizer, mut events: mpsc::Receiver<ChangeEvent<Bookmark>>) {
	while let Some(event) = events.recv().await {
		sync.apply(event).await;
	}

	// Not retried, the list stays as it is until the session changes.
	warn!("Bookmark feed ended, live updates stopped");
	sync.bus().emit(Notice::FeedClosed);
}
