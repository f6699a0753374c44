use crate::{remote::Identity, AuthError};

use sb_cloud_api::auth::{Callback, Pkce, Session, EXPIRY_MARGIN_SECS};

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::{
	select,
	sync::{broadcast, Mutex},
	time::sleep,
};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

mod store;

pub use store::SessionStore;

const CHANGES_CAPACITY: usize = 16;
const REFRESH_RETRY: Duration = Duration::from_secs(30);

/// Notification that the current session appeared, changed or went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChange {
	SignedIn(Session),
	TokenRefreshed(Session),
	SignedOut,
}

/// Owns the current session: signs in and out, keeps it persisted and
/// refreshed, and tells listeners whenever it changes.
pub struct Auth {
	identity: Arc<dyn Identity>,
	store: SessionStore,
	current: Mutex<Option<Session>>,
	pending: Mutex<Option<Pkce>>,
	changes: broadcast::Sender<AuthChange>,
}

impl Auth {
	pub fn new(identity: Arc<dyn Identity>, store: SessionStore) -> Self {
		let (changes, _) = broadcast::channel(CHANGES_CAPACITY);

		Self {
			identity,
			store,
			current: Mutex::new(None),
			pending: Mutex::new(None),
			changes,
		}
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
		self.changes.subscribe()
	}

	/// Starts an OAuth sign-in. The browser should be sent to the returned URL
	/// and will eventually land on `redirect_to`.
	pub async fn begin_sign_in(&self, redirect_to: &str) -> Result<Url, AuthError> {
		let pkce = Pkce::generate();
		let url = self.identity.authorize_url(redirect_to, &pkce)?;

		if self.pending.lock().await.replace(pkce).is_some() {
			debug!("Replaced a sign-in that was never completed");
		}

		Ok(url)
	}

	/// Finishes the sign-in from the URL the browser was redirected to.
	#[instrument(skip_all, err)]
	pub async fn complete_sign_in(&self, callback_url: &str) -> Result<Session, AuthError> {
		let session = match Callback::parse(callback_url)? {
			Callback::Code(code) => {
				let pkce = self
					.pending
					.lock()
					.await
					.take()
					.ok_or(AuthError::NoPendingSignIn)?;

				self.identity.exchange_code(&code, &pkce.verifier).await?
			}
			Callback::Implicit(grant) => self.identity.complete_implicit(grant).await?,
		};

		self.store.save(&session).await?;
		*self.current.lock().await = Some(session.clone());

		info!(user_id = %session.user.id, "Signed in");
		self.emit(AuthChange::SignedIn(session.clone()));

		Ok(session)
	}

	/// Picks up the session persisted by an earlier run, refreshing it if it
	/// has expired meanwhile.
	#[instrument(skip_all, err)]
	pub async fn restore(&self) -> Result<Option<Session>, AuthError> {
		let Some(mut session) = self.store.load().await? else {
			debug!("No persisted session");
			return Ok(None);
		};

		if session.is_expired() {
			let refresh_token = session.refresh_token.clone();

			match self.identity.refresh(&refresh_token).await {
				Ok(refreshed) => {
					self.store.save(&refreshed).await?;
					session = refreshed;
				}
				Err(e) => {
					warn!(?e, "Persisted session expired and could not be refreshed");
					self.store.clear().await?;
					return Ok(None);
				}
			}
		}

		*self.current.lock().await = Some(session.clone());

		Ok(Some(session))
	}

	/// The session requests should be made with, refreshed first if needed.
	/// A session that can no longer be refreshed counts as a sign-out.
	pub async fn current(&self) -> Result<Option<Session>, AuthError> {
		let mut current = self.current.lock().await;

		let Some(session) = current.as_ref() else {
			return Ok(None);
		};

		if !session.is_expired() {
			return Ok(Some(session.clone()));
		}

		let refresh_token = session.refresh_token.clone();

		match self.identity.refresh(&refresh_token).await {
			Ok(refreshed) => {
				self.store.save(&refreshed).await?;
				*current = Some(refreshed.clone());

				debug!(user_id = %refreshed.user.id, "Session refreshed");
				self.emit(AuthChange::TokenRefreshed(refreshed.clone()));

				Ok(Some(refreshed))
			}
			Err(e) => {
				warn!(?e, "Session expired and could not be refreshed");
				self.store.clear().await?;
				*current = None;

				self.emit(AuthChange::SignedOut);

				Ok(None)
			}
		}
	}

	/// Refreshes the current session shortly before it expires, for as long
	/// as the task runs. Re-arms whenever the session changes.
	pub async fn keep_refreshed(self: Arc<Self>) {
		let mut changes = self.subscribe();

		loop {
			let due = self.current.lock().await.as_ref().map(refresh_due_in);

			let Some(due) = due else {
				match changes.recv().await {
					Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
					Err(broadcast::error::RecvError::Closed) => break,
				}
			};

			select! {
				() = sleep(due) => {
					if let Err(e) = self.current().await {
						error!(?e, "Failed to refresh the session, will retry");
						sleep(REFRESH_RETRY).await;
					}
				}
				change = changes.recv() => {
					if let Err(broadcast::error::RecvError::Closed) = change {
						break;
					}
				}
			}
		}

		debug!("Stopped keeping the session refreshed");
	}

	/// Ends the session on the identity service and forgets it locally. If
	/// the service refuses, nothing changes.
	#[instrument(skip_all, err)]
	pub async fn sign_out(&self) -> Result<(), AuthError> {
		let mut current = self.current.lock().await;

		let session = current.as_ref().ok_or(AuthError::NotAuthenticated)?;

		self.identity.sign_out(session).await?;
		self.store.clear().await?;
		*current = None;

		info!("Signed out");
		self.emit(AuthChange::SignedOut);

		Ok(())
	}

	fn emit(&self, change: AuthChange) {
		if self.changes.send(change).is_err() {
			debug!("Auth change emitted but no subscribers");
		}
	}
}

/// Time left until `session` counts as expired and has to be refreshed.
fn refresh_due_in(session: &Session) -> Duration {
	let due_ms = (session.expires_at - EXPIRY_MARGIN_SECS) * 1000 - Utc::now().timestamp_millis();

	Duration::from_millis(u64::try_from(due_ms).unwrap_or(0))
}
