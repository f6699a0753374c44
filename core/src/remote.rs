//! Seams towards the hosted platform. Everything the rest of the crate needs
//! from the outside world goes through these traits, so tests can swap the
//! platform for in-memory fakes.

use crate::FeedError;

use sb_cloud_api::{
	auth::{ImplicitGrant, Pkce, Session},
	Bookmark, BookmarkId, NewBookmark, BOOKMARKS_TABLE,
};
use sb_realtime::{ChannelConfig, RealtimeClient, Subscription};
use sb_replica::ChangeEvent;

use async_trait::async_trait;
use tokio::{spawn, sync::mpsc};
use tracing::{debug, warn};
use url::Url;

pub const FEED_CHANNEL: &str = "bookmarks-realtime";
pub const FEED_SCHEMA: &str = "public";

const FEED_BUFFER: usize = 256;

/// Filtered select, insert and delete-by-identifier on the bookmarks table.
#[async_trait]
pub trait BookmarkStore: Send + Sync + 'static {
	/// Every bookmark of the session's user, newest first.
	async fn list(&self, session: &Session) -> Result<Vec<Bookmark>, sb_cloud_api::Error>;

	async fn create(
		&self,
		session: &Session,
		bookmark: &NewBookmark,
	) -> Result<(), sb_cloud_api::Error>;

	async fn delete(&self, session: &Session, id: &BookmarkId) -> Result<(), sb_cloud_api::Error>;
}

/// OAuth sign-in and session maintenance.
#[async_trait]
pub trait Identity: Send + Sync + 'static {
	fn authorize_url(&self, redirect_to: &str, pkce: &Pkce) -> Result<Url, sb_cloud_api::Error>;

	async fn exchange_code(
		&self,
		auth_code: &str,
		code_verifier: &str,
	) -> Result<Session, sb_cloud_api::Error>;

	async fn complete_implicit(&self, grant: ImplicitGrant)
		-> Result<Session, sb_cloud_api::Error>;

	async fn refresh(&self, refresh_token: &str) -> Result<Session, sb_cloud_api::Error>;

	async fn sign_out(&self, session: &Session) -> Result<(), sb_cloud_api::Error>;
}

/// Push channel of row changes for one session.
#[async_trait]
pub trait ChangeFeed: Send + Sync + 'static {
	async fn subscribe(&self, session: &Session) -> Result<FeedSubscription, FeedError>;
}

#[async_trait]
pub trait FeedHandle: Send + Sync {
	/// Releases the subscription. Returns `true` only for the call that
	/// actually released it.
	async fn close(&mut self) -> bool;
}

pub struct FeedSubscription {
	pub events: mpsc::Receiver<ChangeEvent<Bookmark>>,
	pub handle: Box<dyn FeedHandle>,
}

#[async_trait]
impl FeedHandle for Subscription {
	async fn close(&mut self) -> bool {
		Self::close(self).await
	}
}

/// [`ChangeFeed`] backed by the platform's realtime service.
pub struct RealtimeFeed {
	client: RealtimeClient,
}

impl RealtimeFeed {
	#[must_use]
	pub const fn new(client: RealtimeClient) -> Self {
		Self { client }
	}

	#[must_use]
	pub fn channel_for(session: &Session) -> ChannelConfig {
		ChannelConfig::new(FEED_CHANNEL, FEED_SCHEMA, BOOKMARKS_TABLE)
			.with_filter(format!("user_id=eq.{}", session.user.id))
	}
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
	async fn subscribe(&self, session: &Session) -> Result<FeedSubscription, FeedError> {
		let (subscription, mut changes) = self
			.client
			.subscribe(Self::channel_for(session), &session.access_token)
			.await?;

		let (events_tx, events_rx) = mpsc::channel(FEED_BUFFER);

		// Ends on its own once the subscription is closed and `changes` drains.
		spawn(async move {
			while let Some(change) = changes.recv().await {
				match change.decode::<Bookmark>() {
					Ok(event) => {
						if events_tx.send(event).await.is_err() {
							break;
						}
					}
					Err(e) => warn!(?e, "Dropping undecodable bookmark change"),
				}
			}

			debug!("Bookmark change decoder finished");
		});

		Ok(FeedSubscription {
			events: events_rx,
			handle: Box::new(subscription),
		})
	}
}
