use crate::{
	auth::{Auth, SessionStore},
	bookmarks::Bookmarks,
	bus::SyncBus,
	client::Client,
	remote::{BookmarkStore, ChangeFeed, Identity, RealtimeFeed},
	session::SessionLifecycle,
	sync::Synchronizer,
	ConfigError, Env,
};

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use directories::ProjectDirs;
use tokio::{spawn, sync::Mutex, task::JoinHandle};
use tracing::{error, info};

pub const APP_NAME: &str = "smart-bookmarks";

/// Where the session is persisted unless told otherwise.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
	ProjectDirs::from("", "", APP_NAME)
		.map(|dirs| dirs.data_dir().to_path_buf())
		.ok_or(ConfigError::NoDataDir)
}

/// Everything one running instance needs, wired together once.
pub struct Node {
	data_dir: PathBuf,
	auth: Arc<Auth>,
	bookmarks: Bookmarks,
	lifecycle: Arc<SessionLifecycle>,
	refresher: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
	pub fn new(env: Env, data_dir: impl AsRef<Path>) -> Self {
		let client = Arc::new(Client::new(env));
		let feed = Arc::new(RealtimeFeed::new(client.realtime()));

		Self::with_parts(data_dir, client.clone(), client, feed)
	}

	/// Builds a node on top of arbitrary platform implementations.
	pub fn with_parts(
		data_dir: impl AsRef<Path>,
		identity: Arc<dyn Identity>,
		store: Arc<dyn BookmarkStore>,
		feed: Arc<dyn ChangeFeed>,
	) -> Self {
		let data_dir = data_dir.as_ref().to_path_buf();

		let auth = Arc::new(Auth::new(identity, SessionStore::new(&data_dir)));
		let sync = Synchronizer::new(Arc::clone(&store), SyncBus::new());

		Self {
			bookmarks: Bookmarks::new(Arc::clone(&auth), store),
			lifecycle: Arc::new(SessionLifecycle::new(sync, feed)),
			refresher: Mutex::new(None),
			auth,
			data_dir,
		}
	}

	#[must_use]
	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}

	#[must_use]
	pub const fn auth(&self) -> &Arc<Auth> {
		&self.auth
	}

	#[must_use]
	pub const fn bookmarks(&self) -> &Bookmarks {
		&self.bookmarks
	}

	#[must_use]
	pub const fn lifecycle(&self) -> &Arc<SessionLifecycle> {
		&self.lifecycle
	}

	#[must_use]
	pub fn sync(&self) -> &Synchronizer {
		self.lifecycle.sync()
	}

	#[must_use]
	pub fn bus(&self) -> &SyncBus {
		self.lifecycle.sync().bus()
	}

	/// Restores the persisted session and keeps the replica following the
	/// authentication state from then on. The session is refreshed in the
	/// background until [`Self::shutdown`].
	pub async fn start(&self) -> JoinHandle<()> {
		// Subscribed before restoring so a sign-in racing the lookup is not missed.
		let changes = self.auth.subscribe();

		let initial = match self.auth.restore().await {
			Ok(initial) => initial,
			Err(e) => {
				error!(?e, "Failed to restore the persisted session");
				None
			}
		};

		if let Some(previous) = self
			.refresher
			.lock()
			.await
			.replace(spawn(Arc::clone(&self.auth).keep_refreshed()))
		{
			previous.abort();
		}

		spawn(Arc::clone(&self.lifecycle).run(initial, changes))
	}

	pub async fn shutdown(&self) {
		info!("Smart Bookmarks shutting down...");

		if let Some(refresher) = self.refresher.lock().await.take() {
			refresher.abort();
		}

		self.lifecycle.teardown().await;
		info!("Shutdown complete.");
	}
}
