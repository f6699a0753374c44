use std::{fmt, io, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("environment variable '{0}' is missing or empty")]
	Missing(&'static str),
	#[error("invalid service url '{url}': {reason}")]
	InvalidUrl { url: String, reason: String },
	#[error("could not determine a data directory, pass one explicitly")]
	NoDataDir,
}

/// Loading the snapshot failed. The replica is left empty.
#[derive(Debug, Error)]
pub enum FetchError {
	#[error("failed to load bookmarks: {0}")]
	Remote(#[from] sb_cloud_api::Error),
}

/// An insert or delete was not carried out.
#[derive(Debug, Error)]
pub enum WriteError {
	#[error("{0} must not be empty")]
	MissingField(&'static str),
	#[error("not signed in")]
	NotAuthenticated,
	#[error("write rejected: {0}")]
	Rejected(#[from] sb_cloud_api::Error),
}

/// A sign-in or sign-out request was refused.
#[derive(Debug, Error)]
pub enum AuthError {
	#[error("no sign-in in progress, start one first")]
	NoPendingSignIn,
	#[error("not signed in")]
	NotAuthenticated,
	#[error("identity service refused: {0}")]
	Remote(#[from] sb_cloud_api::Error),
	#[error(transparent)]
	FileIO(#[from] FileIOError),
	#[error("malformed session file: {0}")]
	Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FeedError {
	#[error(transparent)]
	Realtime(#[from] sb_realtime::Error),
}

#[derive(Debug, Error)]
pub struct FileIOError {
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
	pub maybe_context: Option<&'static str>,
}

impl fmt::Display for FileIOError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"file I/O error{}: {}; path: '{}'",
			self.maybe_context
				.map(|ctx| format!(" ({ctx})"))
				.unwrap_or_default(),
			self.source,
			self.path.display()
		)
	}
}

impl<P: AsRef<Path>> From<(P, io::Error)> for FileIOError {
	fn from((path, source): (P, io::Error)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: None,
		}
	}
}

impl<P: AsRef<Path>> From<(P, io::Error, &'static str)> for FileIOError {
	fn from((path, source, context): (P, io::Error, &'static str)) -> Self {
		Self {
			path: path.as_ref().into(),
			source,
			maybe_context: Some(context),
		}
	}
}
