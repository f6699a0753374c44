#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod auth;

use std::fmt;

use auth::OAuthToken;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use sb_replica::Record;
use serde::{de, Deserialize, Deserializer, Serialize};
use tracing::debug;
use uuid::Uuid;

pub const BOOKMARKS_TABLE: &str = "bookmarks";

pub struct RequestConfig {
	pub client: reqwest::Client,
	pub api_url: String,
	pub api_key: String,
	pub auth_token: Option<OAuthToken>,
}

#[derive(thiserror::Error, Debug)]
#[error("{0}")]
pub struct Error(String);

impl Error {
	pub fn new(message: impl Into<String>) -> Self {
		Self(message.into())
	}

	fn auth_required() -> Self {
		Self::new("Authentication required")
	}
}

impl From<reqwest::Error> for Error {
	fn from(e: reqwest::Error) -> Self {
		Self(e.to_string())
	}
}

/// Identifier of a bookmark row. The table may use text, uuid or integer
/// keys; all of them are carried as a string on our side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct BookmarkId(String);

impl BookmarkId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	#[must_use]
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for BookmarkId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl<'de> Deserialize<'de> for BookmarkId {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		struct IdVisitor;

		impl de::Visitor<'_> for IdVisitor {
			type Value = BookmarkId;

			fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str("a string or integer identifier")
			}

			fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
				Ok(BookmarkId::new(v))
			}

			fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
				Ok(BookmarkId(v))
			}

			fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
				Ok(BookmarkId(v.to_string()))
			}

			fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
				Ok(BookmarkId(v.to_string()))
			}
		}

		deserializer.deserialize_any(IdVisitor)
	}
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
	pub id: BookmarkId,
	pub user_id: Uuid,
	pub title: String,
	pub url: String,
	pub created_at: DateTime<Utc>,
}

impl Record for Bookmark {
	type Id = BookmarkId;
	type Owner = Uuid;

	fn id(&self) -> &BookmarkId {
		&self.id
	}

	fn owner(&self) -> &Uuid {
		&self.user_id
	}
}

/// Row as sent on insert, the store fills in `id` and `created_at`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct NewBookmark {
	pub url: String,
	pub title: String,
	pub user_id: Uuid,
}

trait WithAuth {
	fn with_auth(self, token: &OAuthToken) -> Self;
}

impl WithAuth for RequestBuilder {
	fn with_auth(self, token: &OAuthToken) -> Self {
		self.header(
			"authorization",
			format!("{} {}", token.token_type, token.access_token),
		)
	}
}

impl RequestConfig {
	/// Base request against the platform, carrying the public API key.
	fn request(&self, method: Method, path: &str) -> RequestBuilder {
		self.client
			.request(method, format!("{}{path}", self.api_url.trim_end_matches('/')))
			.header("apikey", &self.api_key)
	}

	/// Same as [`Self::request`] but refuses to go out without a user token.
	fn authed(&self, method: Method, path: &str) -> Result<RequestBuilder, Error> {
		let Some(auth_token) = &self.auth_token else {
			return Err(Error::auth_required());
		};

		Ok(self.request(method, path).with_auth(auth_token))
	}
}

/// Turns non-2xx answers into an [`Error`] carrying whatever message the
/// platform sent back.
async fn checked(res: Response) -> Result<Response, Error> {
	let status = res.status();
	if status.is_success() {
		return Ok(res);
	}

	#[derive(Deserialize)]
	struct ErrorBody {
		#[serde(alias = "error_description", alias = "msg")]
		message: Option<String>,
	}

	let body = res.text().await.unwrap_or_default();
	let message = serde_json::from_str::<ErrorBody>(&body)
		.ok()
		.and_then(|b| b.message)
		.unwrap_or(body);

	debug!(%status, %message, "Request rejected");

	Err(Error(format!("{status}: {message}")))
}

pub mod bookmarks {
	use super::*;

	pub use list::exec as list;
	pub mod list {
		use super::*;

		/// All bookmarks of `owner`, newest first.
		pub async fn exec(config: RequestConfig, owner: Uuid) -> Result<Response, Error> {
			let res = config
				.authed(Method::GET, &format!("/rest/v1/{BOOKMARKS_TABLE}"))?
				.query(&[
					("select", "*".to_string()),
					("user_id", format!("eq.{owner}")),
					("order", "created_at.desc".to_string()),
				])
				.send()
				.await?;

			checked(res).await?.json().await.map_err(Into::into)
		}

		pub type Response = Vec<Bookmark>;
	}

	pub use create::exec as create;
	pub mod create {
		use super::*;

		pub async fn exec(config: RequestConfig, bookmark: &NewBookmark) -> Result<(), Error> {
			let res = config
				.authed(Method::POST, &format!("/rest/v1/{BOOKMARKS_TABLE}"))?
				.header("prefer", "return=minimal")
				.json(bookmark)
				.send()
				.await?;

			checked(res).await?;

			Ok(())
		}
	}

	pub use delete::exec as delete;
	pub mod delete {
		use super::*;

		pub async fn exec(config: RequestConfig, id: &BookmarkId) -> Result<(), Error> {
			let res = config
				.authed(Method::DELETE, &format!("/rest/v1/{BOOKMARKS_TABLE}"))?
				.query(&[("id", format!("eq.{id}"))])
				.send()
				.await?;

			checked(res).await?;

			Ok(())
		}
	}
}
