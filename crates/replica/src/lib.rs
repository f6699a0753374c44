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

//! In-memory mirror of a remote, ordered record set.
//!
//! A [`Replica`] is seeded once per session from a snapshot and then kept in
//! step with the remote source by applying [`ChangeEvent`]s from a live feed.
//! It performs no I/O: fetching the snapshot and receiving events is the job
//! of whoever owns the replica.

mod event;
mod record;
mod replica;

pub use event::{Applied, ChangeEvent, IgnoredReason};
pub use record::Record;
pub use replica::Replica;
