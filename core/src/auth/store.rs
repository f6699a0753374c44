use crate::{AuthError, FileIOError};

use sb_cloud_api::auth::Session;

use std::{
	io,
	path::{Path, PathBuf},
};

use tokio::fs;
use tracing::{debug, warn};

const SESSION_FILE_NAME: &str = "session.json";

/// The persisted session, one JSON file in the data directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
	path: PathBuf,
}

impl SessionStore {
	pub fn new(data_dir: impl AsRef<Path>) -> Self {
		Self {
			path: data_dir.as_ref().join(SESSION_FILE_NAME),
		}
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// A missing file means no session. So does an unreadable one, which is
	/// removed on the way.
	pub async fn load(&self) -> Result<Option<Session>, AuthError> {
		let bytes = match fs::read(&self.path).await {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => {
				return Err(
					FileIOError::from((&self.path, e, "Failed to read session file")).into(),
				)
			}
		};

		match serde_json::from_slice::<Session>(&bytes) {
			Ok(session) => Ok(Some(session)),
			Err(e) => {
				warn!(?e, path = %self.path.display(), "Discarding corrupt session file");
				self.clear().await?;
				Ok(None)
			}
		}
	}

	pub async fn save(&self, session: &Session) -> Result<(), AuthError> {
		if let Some(dir) = self.path.parent() {
			fs::create_dir_all(dir)
				.await
				.map_err(|e| FileIOError::from((dir, e, "Failed to create data directory")))?;
		}

		let bytes = serde_json::to_vec_pretty(session)?;
		let tmp_path = self.path.with_extension("json.tmp");

		fs::write(&tmp_path, bytes)
			.await
			.map_err(|e| FileIOError::from((&tmp_path, e, "Failed to write session file")))?;

		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;

			fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
				.await
				.map_err(|e| FileIOError::from((&tmp_path, e)))?;
		}

		fs::rename(&tmp_path, &self.path)
			.await
			.map_err(|e| FileIOError::from((&self.path, e, "Failed to replace session file")))?;

		debug!(path = %self.path.display(), "Session persisted");

		Ok(())
	}

	pub async fn clear(&self) -> Result<(), AuthError> {
		match fs::remove_file(&self.path).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => {
				Err(FileIOError::from((&self.path, e, "Failed to remove session file")).into())
			}
		}
	}
}
