#![allow(dead_code)]

use sb_cloud_api::{
	auth::{ImplicitGrant, Pkce, Session, User},
	Bookmark, BookmarkId, NewBookmark,
};
use sb_core::{
	bus::Notice,
	remote::{BookmarkStore, ChangeFeed, FeedHandle, FeedSubscription, Identity},
	FeedError,
};
use sb_replica::ChangeEvent;

use std::{
	sync::{
		atomic::{AtomicBool, AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::{
	sync::{broadcast, mpsc, Notify},
	time::{sleep, timeout},
};
use url::Url;
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn session_for(user_id: Uuid) -> Session {
	Session {
		access_token: format!("access-{user_id}"),
		token_type: "bearer".to_string(),
		refresh_token: format!("refresh-{user_id}"),
		expires_at: Utc::now().timestamp() + 3600,
		user: User {
			id: user_id,
			email: None,
		},
	}
}

pub fn expiring_in(mut session: Session, secs: i64) -> Session {
	session.expires_at = Utc::now().timestamp() + secs;
	session
}

pub fn expired(mut session: Session) -> Session {
	session.expires_at = Utc::now().timestamp() - 60;
	session
}

pub fn bookmark(id: &str, user_id: Uuid) -> Bookmark {
	Bookmark {
		id: BookmarkId::new(id),
		user_id,
		title: format!("Bookmark {id}"),
		url: format!("https://example.com/{id}"),
		created_at: Utc::now(),
	}
}

pub fn ids(records: &[Bookmark]) -> Vec<&str> {
	records.iter().map(|b| b.id.as_str()).collect()
}

/// Polls `check` until it holds, failing the test after [`WAIT`].
pub async fn eventually(check: impl Fn() -> bool) {
	timeout(WAIT, async {
		while !check() {
			sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("condition was not met in time");
}

/// Waits for the next notice announcing a visible replica change.
pub async fn next_change(notices: &mut broadcast::Receiver<Notice>) {
	timeout(WAIT, async {
		loop {
			if let Notice::Changed { .. } = notices.recv().await.expect("bus closed") {
				break;
			}
		}
	})
	.await
	.expect("no change was announced in time");
}

#[derive(Default)]
pub struct MemoryStore {
	pub rows: Mutex<Vec<Bookmark>>,
	pub created: Mutex<Vec<NewBookmark>>,
	pub deleted: Mutex<Vec<BookmarkId>>,
	pub list_calls: AtomicUsize,
	pub fail_next_list: AtomicBool,
	pub reject_writes: AtomicBool,
	pub hold_lists: AtomicBool,
	pub release_list: Notify,
}

impl MemoryStore {
	pub fn with_rows(rows: Vec<Bookmark>) -> Arc<Self> {
		let store = Self::default();
		*store.rows.lock().unwrap() = rows;
		Arc::new(store)
	}

	pub fn list_calls(&self) -> usize {
		self.list_calls.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl BookmarkStore for MemoryStore {
	async fn list(&self, session: &Session) -> Result<Vec<Bookmark>, sb_cloud_api::Error> {
		self.list_calls.fetch_add(1, Ordering::SeqCst);

		if self.hold_lists.load(Ordering::SeqCst) {
			self.release_list.notified().await;
		}

		if self.fail_next_list.swap(false, Ordering::SeqCst) {
			return Err(sb_cloud_api::Error::new("store unavailable"));
		}

		Ok(self
			.rows
			.lock()
			.unwrap()
			.iter()
			.filter(|b| b.user_id == session.user.id)
			.cloned()
			.collect())
	}

	async fn create(
		&self,
		_: &Session,
		bookmark: &NewBookmark,
	) -> Result<(), sb_cloud_api::Error> {
		if self.reject_writes.load(Ordering::SeqCst) {
			return Err(sb_cloud_api::Error::new("permission denied"));
		}

		self.created.lock().unwrap().push(bookmark.clone());
		Ok(())
	}

	async fn delete(&self, _: &Session, id: &BookmarkId) -> Result<(), sb_cloud_api::Error> {
		if self.reject_writes.load(Ordering::SeqCst) {
			return Err(sb_cloud_api::Error::new("permission denied"));
		}

		self.deleted.lock().unwrap().push(id.clone());
		Ok(())
	}
}

#[derive(Default)]
pub struct FeedCounters {
	pub opened: AtomicUsize,
	pub closed: AtomicUsize,
}

impl FeedCounters {
	pub fn opened(&self) -> usize {
		self.opened.load(Ordering::SeqCst)
	}

	pub fn closed(&self) -> usize {
		self.closed.load(Ordering::SeqCst)
	}

	pub fn open_now(&self) -> usize {
		self.opened() - self.closed()
	}
}

/// Feed whose events are pushed by the test through [`Self::sender`].
#[derive(Default)]
pub struct FakeFeed {
	pub counters: Arc<FeedCounters>,
	pub refuse: AtomicBool,
	senders: Mutex<Vec<mpsc::Sender<ChangeEvent<Bookmark>>>>,
}

impl FakeFeed {
	/// Sender of the most recently opened subscription.
	pub fn sender(&self) -> mpsc::Sender<ChangeEvent<Bookmark>> {
		self.senders
			.lock()
			.unwrap()
			.last()
			.cloned()
			.expect("no subscription was opened")
	}

	/// Ends the event stream of every subscription, as a dropped socket would.
	pub fn end(&self) {
		self.senders.lock().unwrap().clear();
	}
}

struct FakeHandle(Option<Arc<FeedCounters>>);

#[async_trait]
impl FeedHandle for FakeHandle {
	async fn close(&mut self) -> bool {
		let Some(counters) = self.0.take() else {
			return false;
		};

		counters.closed.fetch_add(1, Ordering::SeqCst);
		true
	}
}

#[async_trait]
impl ChangeFeed for FakeFeed {
	async fn subscribe(&self, _: &Session) -> Result<FeedSubscription, FeedError> {
		if self.refuse.load(Ordering::SeqCst) {
			return Err(sb_realtime::Error::Closed.into());
		}

		let (tx, rx) = mpsc::channel(16);
		self.senders.lock().unwrap().push(tx);
		self.counters.opened.fetch_add(1, Ordering::SeqCst);

		Ok(FeedSubscription {
			events: rx,
			handle: Box::new(FakeHandle(Some(Arc::clone(&self.counters)))),
		})
	}
}

pub struct FakeIdentity {
	pub user_id: Uuid,
	pub fail_refresh: AtomicBool,
	pub fail_sign_out: AtomicBool,
	pub exchanged: Mutex<Vec<(String, String)>>,
	pub refreshed: AtomicUsize,
}

impl FakeIdentity {
	pub fn new(user_id: Uuid) -> Arc<Self> {
		Arc::new(Self {
			user_id,
			fail_refresh: AtomicBool::new(false),
			fail_sign_out: AtomicBool::new(false),
			exchanged: Mutex::new(Vec::new()),
			refreshed: AtomicUsize::new(0),
		})
	}
}

#[async_trait]
impl Identity for FakeIdentity {
	fn authorize_url(&self, redirect_to: &str, pkce: &Pkce) -> Result<Url, sb_cloud_api::Error> {
		Url::parse_with_params(
			"https://identity.test/auth/v1/authorize",
			&[
				("redirect_to", redirect_to),
				("code_challenge", pkce.challenge.as_str()),
			],
		)
		.map_err(|e| sb_cloud_api::Error::new(e.to_string()))
	}

	async fn exchange_code(
		&self,
		auth_code: &str,
		code_verifier: &str,
	) -> Result<Session, sb_cloud_api::Error> {
		self.exchanged
			.lock()
			.unwrap()
			.push((auth_code.to_string(), code_verifier.to_string()));

		Ok(session_for(self.user_id))
	}

	async fn complete_implicit(
		&self,
		grant: ImplicitGrant,
	) -> Result<Session, sb_cloud_api::Error> {
		Ok(grant.into_session(User {
			id: self.user_id,
			email: None,
		}))
	}

	async fn refresh(&self, _: &str) -> Result<Session, sb_cloud_api::Error> {
		if self.fail_refresh.load(Ordering::SeqCst) {
			return Err(sb_cloud_api::Error::new("refresh token revoked"));
		}

		self.refreshed.fetch_add(1, Ordering::SeqCst);
		Ok(session_for(self.user_id))
	}

	async fn sign_out(&self, _: &Session) -> Result<(), sb_cloud_api::Error> {
		if self.fail_sign_out.load(Ordering::SeqCst) {
			return Err(sb_cloud_api::Error::new("service unavailable"));
		}

		Ok(())
	}
}
