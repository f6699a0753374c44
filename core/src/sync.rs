use crate::{
	bus::{Notice, SyncBus},
	remote::BookmarkStore,
	FetchError,
};

use sb_cloud_api::{auth::Session, Bookmark};
use sb_replica::{Applied, ChangeEvent, Replica};

use std::sync::{
	atomic::{AtomicU64, Ordering},
	Arc,
};

use tokio::sync::RwLock;
use tracing::{debug, instrument, trace};
use uuid::Uuid;

/// Keeps the local replica of the signed-in user's bookmarks in step with the
/// store: one snapshot per session entry, live events on top of it.
///
/// Every [`Self::begin`] and [`Self::reset`] moves the generation forward, a
/// snapshot fetched under an older generation is thrown away.
#[derive(Clone)]
pub struct Synchronizer {
	replica: Arc<RwLock<Replica<Bookmark>>>,
	generation: Arc<AtomicU64>,
	store: Arc<dyn BookmarkStore>,
	bus: SyncBus,
}

impl Synchronizer {
	pub fn new(store: Arc<dyn BookmarkStore>, bus: SyncBus) -> Self {
		Self {
			replica: Arc::new(RwLock::new(Replica::new())),
			generation: Arc::new(AtomicU64::new(0)),
			store,
			bus,
		}
	}

	/// Empties the replica and starts buffering events for `owner`. The
	/// returned generation must be handed to [`Self::load_snapshot`].
	pub async fn begin(&self, owner: Uuid) -> u64 {
		let mut replica = self.replica.write().await;
		let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

		replica.begin_snapshot(owner);
		self.bus.emit(Notice::SnapshotLoading);

		generation
	}

	/// Fetches the full list from the store and makes it the new replica
	/// contents, with buffered events replayed on top.
	///
	/// Returns `Ok(None)` when the session this snapshot was meant for is
	/// already gone. On failure the replica is left empty.
	#[instrument(skip_all, fields(user_id = %session.user.id, generation = generation), err)]
	pub async fn load_snapshot(
		&self,
		session: &Session,
		generation: u64,
	) -> Result<Option<Vec<Bookmark>>, FetchError> {
		let fetched = self.store.list(session).await;

		let mut replica = self.replica.write().await;

		if self.generation.load(Ordering::Acquire) != generation {
			debug!("Snapshot resolved for a stale session, discarding it");
			return Ok(None);
		}

		match fetched {
			Ok(records) => {
				let Some(replayed) = replica.complete_snapshot(records) else {
					return Ok(None);
				};

				self.bus.emit(Notice::SnapshotLoaded {
					records: replica.len(),
					replayed,
				});

				Ok(Some(replica.records().to_vec()))
			}
			Err(e) => {
				replica.fail_snapshot();
				self.bus.emit(Notice::SnapshotFailed {
					reason: e.to_string(),
				});

				Err(e.into())
			}
		}
	}

	/// One-shot load for callers that do not keep a live feed around.
	pub async fn load(&self, session: &Session) -> Result<Vec<Bookmark>, FetchError> {
		let generation = self.begin(session.user.id).await;

		Ok(self
			.load_snapshot(session, generation)
			.await?
			.unwrap_or_default())
	}

	pub async fn apply(&self, event: ChangeEvent<Bookmark>) -> Applied {
		let kind = event.kind();
		let applied = self.replica.write().await.apply(event);

		trace!(kind, ?applied, "Applied bookmark change");
		self.bus.emit_applied(kind, applied);

		applied
	}

	/// Drops all bookmarks and invalidates any snapshot still in flight.
	pub async fn reset(&self) {
		let mut replica = self.replica.write().await;
		self.generation.fetch_add(1, Ordering::AcqRel);

		replica.reset();
		self.bus.emit(Notice::Reset);
	}

	pub async fn records(&self) -> Vec<Bookmark> {
		self.replica.read().await.records().to_vec()
	}

	pub async fn is_loading(&self) -> bool {
		self.replica.read().await.is_loading()
	}

	#[must_use]
	pub fn generation(&self) -> u64 {
		self.generation.load(Ordering::Acquire)
	}

	#[must_use]
	pub const fn bus(&self) -> &SyncBus {
		&self.bus
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use sb_cloud_api::{auth::User, BookmarkId, NewBookmark};

	use async_trait::async_trait;
	use chrono::Utc;
	use std::sync::Mutex;

	struct FixedStore(Mutex<Option<Result<Vec<Bookmark>, String>>>);

	#[async_trait]
	impl BookmarkStore for FixedStore {
		async fn list(&self, _: &Session) -> Result<Vec<Bookmark>, sb_cloud_api::Error> {
			self.0
				.lock()
				.unwrap()
				.take()
				.unwrap_or_else(|| Ok(Vec::new()))
				.map_err(sb_cloud_api::Error::new)
		}

		async fn create(&self, _: &Session, _: &NewBookmark) -> Result<(), sb_cloud_api::Error> {
			Ok(())
		}

		async fn delete(&self, _: &Session, _: &BookmarkId) -> Result<(), sb_cloud_api::Error> {
			Ok(())
		}
	}

	fn session(user_id: Uuid) -> Session {
		Session {
			access_token: "access".to_string(),
			token_type: "bearer".to_string(),
			refresh_token: "refresh".to_string(),
			expires_at: Utc::now().timestamp() + 3600,
			user: User {
				id: user_id,
				email: None,
			},
		}
	}

	fn bookmark(id: &str, user_id: Uuid) -> Bookmark {
		Bookmark {
			id: BookmarkId::new(id),
			user_id,
			title: format!("title {id}"),
			url: format!("https://example.com/{id}"),
			created_at: Utc::now(),
		}
	}

	fn sync_with(listed: Result<Vec<Bookmark>, String>) -> Synchronizer {
		Synchronizer::new(
			Arc::new(FixedStore(Mutex::new(Some(listed)))),
			SyncBus::new(),
		)
	}

	#[tokio::test]
	async fn snapshot_replays_buffered_events() {
		let owner = Uuid::new_v4();
		let sync = sync_with(Ok(vec![bookmark("1", owner)]));

		let generation = sync.begin(owner).await;
		assert!(sync.is_loading().await);

		assert_eq!(
			sync.apply(ChangeEvent::Insert(bookmark("2", owner))).await,
			Applied::Buffered
		);

		let loaded = sync
			.load_snapshot(&session(owner), generation)
			.await
			.unwrap()
			.unwrap();

		let ids = loaded.iter().map(|b| b.id.as_str()).collect::<Vec<_>>();
		assert_eq!(ids, ["2", "1"]);
		assert!(!sync.is_loading().await);
	}

	#[tokio::test]
	async fn failed_snapshot_leaves_nothing_behind() {
		let owner = Uuid::new_v4();
		let sync = sync_with(Err("boom".to_string()));
		let mut notices = sync.bus().subscribe();

		let generation = sync.begin(owner).await;
		sync.apply(ChangeEvent::Insert(bookmark("1", owner))).await;

		assert!(sync.load_snapshot(&session(owner), generation).await.is_err());
		assert!(sync.records().await.is_empty());

		assert_eq!(notices.recv().await.unwrap(), Notice::SnapshotLoading);
		assert!(matches!(
			notices.recv().await.unwrap(),
			Notice::SnapshotFailed { .. }
		));
	}

	#[tokio::test]
	async fn stale_snapshot_is_discarded() {
		let owner = Uuid::new_v4();
		let sync = sync_with(Ok(vec![bookmark("1", owner)]));

		let generation = sync.begin(owner).await;
		sync.reset().await;

		assert_eq!(
			sync.load_snapshot(&session(owner), generation).await.unwrap(),
			None
		);
		assert!(sync.records().await.is_empty());
		assert_eq!(sync.generation(), generation + 1);
	}
}
