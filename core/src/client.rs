use crate::{
	remote::{BookmarkStore, Identity},
	Env,
};

use sb_cloud_api::{
	auth::{self, ImplicitGrant, OAuthToken, Pkce, Session},
	bookmarks, Bookmark, BookmarkId, NewBookmark, RequestConfig,
};
use sb_realtime::{RealtimeClient, RealtimeConfig};

use async_trait::async_trait;
use tracing::instrument;
use url::Url;

pub const OAUTH_PROVIDER: &str = "google";

/// Handle on the hosted platform: one HTTP connection pool plus the settings
/// every request needs. Constructed once by the composition root and passed
/// around explicitly.
#[derive(Debug, Clone)]
pub struct Client {
	env: Env,
	http: reqwest::Client,
}

impl Client {
	#[must_use]
	pub fn new(env: Env) -> Self {
		Self {
			env,
			http: reqwest::Client::new(),
		}
	}

	#[must_use]
	pub const fn env(&self) -> &Env {
		&self.env
	}

	#[must_use]
	pub fn request_config(&self, auth_token: Option<OAuthToken>) -> RequestConfig {
		RequestConfig {
			client: self.http.clone(),
			api_url: self.env.api_url.clone(),
			api_key: self.env.api_key.clone(),
			auth_token,
		}
	}

	#[must_use]
	pub fn realtime(&self) -> RealtimeClient {
		RealtimeClient::new(RealtimeConfig::new(
			self.env.api_url.clone(),
			self.env.api_key.clone(),
		))
	}
}

#[async_trait]
impl BookmarkStore for Client {
	#[instrument(skip_all, fields(user_id = %session.user.id), err)]
	async fn list(&self, session: &Session) -> Result<Vec<Bookmark>, sb_cloud_api::Error> {
		bookmarks::list(self.request_config(Some(session.token())), session.user.id).await
	}

	#[instrument(skip_all, fields(user_id = %session.user.id), err)]
	async fn create(
		&self,
		session: &Session,
		bookmark: &NewBookmark,
	) -> Result<(), sb_cloud_api::Error> {
		bookmarks::create(self.request_config(Some(session.token())), bookmark).await
	}

	#[instrument(skip(self, session), err)]
	async fn delete(&self, session: &Session, id: &BookmarkId) -> Result<(), sb_cloud_api::Error> {
		bookmarks::delete(self.request_config(Some(session.token())), id).await
	}
}

#[async_trait]
impl Identity for Client {
	fn authorize_url(&self, redirect_to: &str, pkce: &Pkce) -> Result<Url, sb_cloud_api::Error> {
		auth::authorize_url(&self.request_config(None), OAUTH_PROVIDER, redirect_to, pkce)
	}

	#[instrument(skip_all, err)]
	async fn exchange_code(
		&self,
		auth_code: &str,
		code_verifier: &str,
	) -> Result<Session, sb_cloud_api::Error> {
		auth::token::pkce(self.request_config(None), auth_code, code_verifier).await
	}

	#[instrument(skip_all, err)]
	async fn complete_implicit(
		&self,
		grant: ImplicitGrant,
	) -> Result<Session, sb_cloud_api::Error> {
		let user = auth::user(self.request_config(Some(grant.token()))).await?;

		Ok(grant.into_session(user))
	}

	#[instrument(skip_all, err)]
	async fn refresh(&self, refresh_token: &str) -> Result<Session, sb_cloud_api::Error> {
		auth::token::refresh(self.request_config(None), refresh_token).await
	}

	#[instrument(skip_all, fields(user_id = %session.user.id), err)]
	async fn sign_out(&self, session: &Session) -> Result<(), sb_cloud_api::Error> {
		auth::logout(self.request_config(Some(session.token()))).await
	}
}
