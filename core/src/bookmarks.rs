use crate::{auth::Auth, remote::BookmarkStore, WriteError};

use sb_cloud_api::{auth::Session, BookmarkId, NewBookmark};

use std::sync::Arc;

use tracing::{info, instrument, warn};

/// Writes against the bookmarks table. Nothing here touches the replica, the
/// feed reports the outcome once the store has accepted it.
pub struct Bookmarks {
	auth: Arc<Auth>,
	store: Arc<dyn BookmarkStore>,
}

impl Bookmarks {
	pub fn new(auth: Arc<Auth>, store: Arc<dyn BookmarkStore>) -> Self {
		Self { auth, store }
	}

	#[instrument(skip(self), err)]
	pub async fn add(&self, url: &str, title: &str) -> Result<(), WriteError> {
		let url = url.trim();
		let title = title.trim();

		if url.is_empty() {
			return Err(WriteError::MissingField("url"));
		}
		if title.is_empty() {
			return Err(WriteError::MissingField("title"));
		}

		let session = self.session().await?;

		self.store
			.create(
				&session,
				&NewBookmark {
					url: url.to_string(),
					title: title.to_string(),
					user_id: session.user.id,
				},
			)
			.await?;

		info!("Bookmark added");

		Ok(())
	}

	#[instrument(skip(self, id), fields(id = %id), err)]
	pub async fn delete(&self, id: &BookmarkId) -> Result<(), WriteError> {
		let session = self.session().await?;

		self.store.delete(&session, id).await?;

		info!("Bookmark deleted");

		Ok(())
	}

	async fn session(&self) -> Result<Session, WriteError> {
		match self.auth.current().await {
			Ok(Some(session)) => Ok(session),
			Ok(None) => Err(WriteError::NotAuthenticated),
			Err(e) => {
				warn!(?e, "Could not read the current session");
				Err(WriteError::NotAuthenticated)
			}
		}
	}
}
