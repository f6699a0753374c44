//! Identity endpoints: OAuth sign-in through the platform (PKCE or implicit
//! grant), token refresh, user lookup and sign-out.

use super::{checked, Error, RequestConfig};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use rand::RngCore;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Seconds before the real expiry at which a session is already treated as
/// expired, so a token is never sent right as it lapses.
pub const EXPIRY_MARGIN_SECS: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
	pub access_token: String,
	pub token_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	pub id: Uuid,
	#[serde(default)]
	pub email: Option<String>,
}

/// An authenticated session as handed out by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
	pub access_token: String,
	pub token_type: String,
	pub refresh_token: String,
	/// Unix timestamp, in seconds.
	pub expires_at: i64,
	pub user: User,
}

impl Session {
	#[must_use]
	pub fn token(&self) -> OAuthToken {
		OAuthToken {
			access_token: self.access_token.clone(),
			token_type: self.token_type.clone(),
		}
	}

	#[must_use]
	pub fn is_expired(&self) -> bool {
		self.expires_at - EXPIRY_MARGIN_SECS <= Utc::now().timestamp()
	}
}

/// Body of every successful token grant.
#[derive(Debug, Deserialize)]
struct Grant {
	access_token: String,
	token_type: String,
	refresh_token: String,
	expires_in: i64,
	#[serde(default)]
	expires_at: Option<i64>,
	user: User,
}

impl From<Grant> for Session {
	fn from(grant: Grant) -> Self {
		Self {
			expires_at: grant
				.expires_at
				.unwrap_or_else(|| Utc::now().timestamp() + grant.expires_in),
			access_token: grant.access_token,
			token_type: grant.token_type,
			refresh_token: grant.refresh_token,
			user: grant.user,
		}
	}
}

/// Proof key for the authorization code exchange (RFC 7636, S256 only).
#[derive(Debug, Clone)]
pub struct Pkce {
	pub verifier: String,
	pub challenge: String,
}

impl Pkce {
	#[must_use]
	pub fn generate() -> Self {
		let mut bytes = [0_u8; 64];
		rand::thread_rng().fill_bytes(&mut bytes);

		Self::from_verifier(URL_SAFE_NO_PAD.encode(bytes))
	}

	#[must_use]
	pub fn from_verifier(verifier: String) -> Self {
		let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));

		Self {
			verifier,
			challenge,
		}
	}
}

/// Where the browser should be sent to sign in with `provider`.
pub fn authorize_url(
	config: &RequestConfig,
	provider: &str,
	redirect_to: &str,
	pkce: &Pkce,
) -> Result<Url, Error> {
	Url::parse_with_params(
		&format!("{}/auth/v1/authorize", config.api_url.trim_end_matches('/')),
		&[
			("provider", provider),
			("redirect_to", redirect_to),
			("code_challenge", &pkce.challenge),
			("code_challenge_method", "s256"),
		],
	)
	.map_err(|e| Error::new(format!("invalid api url: {e}")))
}

/// Tokens delivered straight in the redirect fragment (implicit grant).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImplicitGrant {
	pub access_token: String,
	pub token_type: String,
	pub refresh_token: String,
	pub expires_at: i64,
}

/// What the provider redirected back with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
	Code(String),
	Implicit(ImplicitGrant),
}

impl Callback {
	/// Reads the redirect URL the browser landed on after sign-in.
	pub fn parse(redirected_to: &str) -> Result<Self, Error> {
		let url = Url::parse(redirected_to.trim())
			.map_err(|e| Error::new(format!("invalid callback url: {e}")))?;

		let mut params = url.query_pairs().into_owned().collect::<Vec<_>>();
		if let Some(fragment) = url.fragment() {
			params.extend(url::form_urlencoded::parse(fragment.as_bytes()).into_owned());
		}

		let get = |key: &str| {
			params
				.iter()
				.find_map(|(k, v)| (k == key).then(|| v.clone()))
		};

		if let Some(error) = get("error") {
			return Err(Error::new(format!(
				"sign-in refused: {}",
				get("error_description").unwrap_or(error)
			)));
		}

		if let Some(code) = get("code") {
			return Ok(Self::Code(code));
		}

		let (Some(access_token), Some(refresh_token)) = (get("access_token"), get("refresh_token"))
		else {
			return Err(Error::new("callback url carries neither a code nor tokens"));
		};

		let expires_at = match (get("expires_at"), get("expires_in")) {
			(Some(at), _) => at.parse().ok(),
			(None, Some(within)) => within
				.parse::<i64>()
				.ok()
				.map(|secs| Utc::now().timestamp() + secs),
			(None, None) => None,
		}
		.ok_or_else(|| Error::new("callback url has no usable expiry"))?;

		Ok(Self::Implicit(ImplicitGrant {
			access_token,
			token_type: get("token_type").unwrap_or_else(|| "bearer".to_string()),
			refresh_token,
			expires_at,
		}))
	}
}

pub mod token {
	use super::*;

	pub use pkce::exec as pkce;
	pub mod pkce {
		use super::*;

		pub async fn exec(
			config: RequestConfig,
			auth_code: &str,
			code_verifier: &str,
		) -> Result<Session, Error> {
			let res = config
				.request(Method::POST, "/auth/v1/token")
				.query(&[("grant_type", "pkce")])
				.json(&json!({
					"auth_code": auth_code,
					"code_verifier": code_verifier,
				}))
				.send()
				.await?;

			checked(res)
				.await?
				.json::<Grant>()
				.await
				.map(Into::into)
				.map_err(Into::into)
		}
	}

	pub use refresh::exec as refresh;
	pub mod refresh {
		use super::*;

		pub async fn exec(config: RequestConfig, refresh_token: &str) -> Result<Session, Error> {
			let res = config
				.request(Method::POST, "/auth/v1/token")
				.query(&[("grant_type", "refresh_token")])
				.json(&json!({ "refresh_token": refresh_token }))
				.send()
				.await?;

			checked(res)
				.await?
				.json::<Grant>()
				.await
				.map(Into::into)
				.map_err(Into::into)
		}
	}
}

pub use user::exec as user;
pub mod user {
	use super::*;

	pub async fn exec(config: RequestConfig) -> Result<User, Error> {
		let res = config.authed(Method::GET, "/auth/v1/user")?.send().await?;

		checked(res).await?.json().await.map_err(Into::into)
	}
}

pub use logout::exec as logout;
pub mod logout {
	use super::*;

	/// Revokes the session's refresh tokens server side.
	pub async fn exec(config: RequestConfig) -> Result<(), Error> {
		let res = config
			.authed(Method::POST, "/auth/v1/logout")?
			.send()
			.await?;

		checked(res).await?;

		Ok(())
	}
}

impl ImplicitGrant {
	/// Completes the grant into a [`Session`] once the user is known.
	#[must_use]
	pub fn into_session(self, user: User) -> Session {
		Session {
			access_token: self.access_token,
			token_type: self.token_type,
			refresh_token: self.refresh_token,
			expires_at: self.expires_at,
			user,
		}
	}

	#[must_use]
	pub fn token(&self) -> OAuthToken {
		OAuthToken {
			access_token: self.access_token.clone(),
			token_type: self.token_type.clone(),
		}
	}
}
