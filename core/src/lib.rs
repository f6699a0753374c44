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
#![allow(
	clippy::missing_errors_doc,
	clippy::module_name_repetitions,
	clippy::future_not_send
)]

//! Smart Bookmarks client core: authentication, the local replica of the
//! signed-in user's bookmarks and the lifecycle that keeps the two in step.

pub mod auth;
pub mod bookmarks;
pub mod bus;
pub mod client;
pub mod remote;
pub mod session;
pub mod sync;

mod env;
mod error;
mod node;

pub use env::{Env, KEY_VAR, URL_VAR};
pub use error::{AuthError, ConfigError, FeedError, FetchError, FileIOError, WriteError};
pub use node::{default_data_dir, Node, APP_NAME};

pub use sb_cloud_api::{
	auth::{Session, User},
	Bookmark, BookmarkId,
};
