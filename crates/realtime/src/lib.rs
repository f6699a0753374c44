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

//! Client for the platform's realtime service: a Phoenix channel over a
//! websocket that pushes row changes of a table as they are committed.

mod channel;
mod client;
mod error;
mod message;
mod subscription;

pub use channel::{ChannelConfig, RealtimeConfig};
pub use client::RealtimeClient;
pub use error::Error;
pub use message::{ChangeKind, Message, RowChange};
pub use subscription::Subscription;

pub(crate) use subscription::Stopper;
