use crate::Record;

use std::fmt;

/// A single notification from the live feed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<R: Record> {
	Insert(R),
	Update(R),
	/// Deletions only carry the identifier, the feed does not ship the old row.
	Delete(R::Id),
}

impl<R: Record> ChangeEvent<R> {
	pub fn id(&self) -> &R::Id {
		match self {
			Self::Insert(record) | Self::Update(record) => record.id(),
			Self::Delete(id) => id,
		}
	}

	pub const fn kind(&self) -> &'static str {
		match self {
			Self::Insert(_) => "insert",
			Self::Update(_) => "update",
			Self::Delete(_) => "delete",
		}
	}
}

/// What [`Replica::apply`](crate::Replica::apply) did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
	/// New record placed at the head of the sequence.
	Inserted,
	/// Insert for an identifier we already had; the entry was replaced in place.
	Replaced,
	/// Number of entries replaced by an update.
	Updated(usize),
	/// Number of entries removed by a delete.
	Removed(usize),
	/// Held back until the snapshot in flight resolves.
	Buffered,
	Ignored(IgnoredReason),
}

impl Applied {
	/// Whether the visible sequence changed.
	#[must_use]
	pub const fn changed(self) -> bool {
		matches!(
			self,
			Self::Inserted | Self::Replaced | Self::Updated(_) | Self::Removed(_)
		)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoredReason {
	/// Update or delete for an identifier that is not in the replica.
	NoMatch,
	/// The record belongs to someone other than the replica's owner.
	ForeignOwner,
	/// No snapshot was ever started, or the replica was reset.
	Idle,
}

impl fmt::Display for IgnoredReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::NoMatch => "no matching record",
			Self::ForeignOwner => "foreign owner",
			Self::Idle => "replica idle",
		})
	}
}
