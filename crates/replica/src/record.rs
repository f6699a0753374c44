use std::fmt;

/// A row that can live in a [`Replica`](crate::Replica).
///
/// Records are identified by [`Record::id`] and belong to exactly one owner.
/// They are never patched field by field: an update always carries the whole
/// new record.
pub trait Record: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
	type Id: Clone + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;
	type Owner: Clone + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;

	fn id(&self) -> &Self::Id;

	fn owner(&self) -> &Self::Owner;
}
