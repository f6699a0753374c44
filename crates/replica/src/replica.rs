use crate::{Applied, ChangeEvent, IgnoredReason, Record};

use std::mem;

use tracing::{debug, trace, warn};

#[derive(Debug)]
enum Phase<R: Record> {
	Idle,
	/// Snapshot in flight, events are held here and replayed on completion.
	Loading(Vec<ChangeEvent<R>>),
	Ready,
}

/// Ordered local copy of one owner's records.
///
/// The order is the snapshot's order with live inserts prepended; the replica
/// never re-sorts. At most one entry exists per identifier once an event has
/// been applied.
#[derive(Debug)]
pub struct Replica<R: Record> {
	owner: Option<R::Owner>,
	records: Vec<R>,
	phase: Phase<R>,
}

impl<R: Record> Default for Replica<R> {
	fn default() -> Self {
		Self::new()
	}
}

impl<R: Record> Replica<R> {
	#[must_use]
	pub const fn new() -> Self {
		Self {
			owner: None,
			records: Vec::new(),
			phase: Phase::Idle,
		}
	}

	/// Drops all local state and starts buffering events for `owner` until
	/// [`Self::complete_snapshot`] or [`Self::fail_snapshot`] is called.
	pub fn begin_snapshot(&mut self, owner: R::Owner) {
		if let Phase::Loading(pending) = &self.phase {
			if !pending.is_empty() {
				warn!(
					discarded = pending.len(),
					"Snapshot restarted with buffered events, discarding them"
				);
			}
		}

		debug!(%owner, "Beginning snapshot");

		self.owner = Some(owner);
		self.records.clear();
		self.phase = Phase::Loading(Vec::new());
	}

	/// Replaces the whole sequence with `records` and replays whatever arrived
	/// while the snapshot was loading.
	///
	/// Returns the number of replayed events, or `None` if no snapshot was in
	/// flight (the replica was reset meanwhile) in which case `records` are
	/// discarded.
	pub fn complete_snapshot(&mut self, records: Vec<R>) -> Option<usize> {
		let pending = match &mut self.phase {
			Phase::Loading(pending) => mem::take(pending),
			Phase::Idle => {
				debug!("Snapshot resolved on an idle replica, discarding it");
				return None;
			}
			Phase::Ready => {
				warn!("Snapshot resolved twice, discarding the late one");
				return None;
			}
		};

		self.phase = Phase::Ready;
		self.records = records;

		let replayed = pending.len();
		for event in pending {
			let applied = self.apply_now(event);
			trace!(?applied, "Replayed buffered event");
		}

		debug!(
			records = self.records.len(),
			replayed, "Snapshot applied"
		);

		Some(replayed)
	}

	/// Marks the snapshot in flight as failed. The replica is left empty and
	/// buffered events are dropped, nothing is partially applied.
	///
	/// Events arriving afterwards are applied on top of the empty sequence.
	pub fn fail_snapshot(&mut self) -> usize {
		let Phase::Loading(pending) = &mut self.phase else {
			return 0;
		};

		let pending = mem::take(pending);
		self.phase = Phase::Ready;
		self.records.clear();

		if !pending.is_empty() {
			debug!(
				discarded = pending.len(),
				"Snapshot failed, dropped buffered events"
			);
		}

		pending.len()
	}

	pub fn apply(&mut self, event: ChangeEvent<R>) -> Applied {
		if let Phase::Loading(pending) = &mut self.phase {
			pending.push(event);
			return Applied::Buffered;
		}

		if matches!(self.phase, Phase::Idle) {
			return Applied::Ignored(IgnoredReason::Idle);
		}

		self.apply_now(event)
	}

	/// Forgets everything, including the owner. Further events are ignored
	/// until the next [`Self::begin_snapshot`].
	pub fn reset(&mut self) {
		self.owner = None;
		self.records.clear();
		self.phase = Phase::Idle;
	}

	fn apply_now(&mut self, event: ChangeEvent<R>) -> Applied {
		match event {
			ChangeEvent::Insert(record) => {
				if !self.owns(&record) {
					return Applied::Ignored(IgnoredReason::ForeignOwner);
				}

				if let Some(pos) = self.position(record.id()) {
					self.records[pos] = record;
					Applied::Replaced
				} else {
					self.records.insert(0, record);
					Applied::Inserted
				}
			}

			ChangeEvent::Update(record) => {
				if !self.owns(&record) {
					return Applied::Ignored(IgnoredReason::ForeignOwner);
				}

				let mut replaced = 0;
				for existing in self.records.iter_mut().filter(|r| r.id() == record.id()) {
					existing.clone_from(&record);
					replaced += 1;
				}

				if replaced == 0 {
					Applied::Ignored(IgnoredReason::NoMatch)
				} else {
					Applied::Updated(replaced)
				}
			}

			ChangeEvent::Delete(id) => {
				let before = self.records.len();
				self.records.retain(|r| r.id() != &id);

				match before - self.records.len() {
					0 => Applied::Ignored(IgnoredReason::NoMatch),
					removed => Applied::Removed(removed),
				}
			}
		}
	}

	fn owns(&self, record: &R) -> bool {
		self.owner
			.as_ref()
			.map_or(true, |owner| owner == record.owner())
	}

	fn position(&self, id: &R::Id) -> Option<usize> {
		self.records.iter().position(|r| r.id() == id)
	}

	#[must_use]
	pub fn records(&self) -> &[R] {
		&self.records
	}

	#[must_use]
	pub fn get(&self, id: &R::Id) -> Option<&R> {
		self.records.iter().find(|r| r.id() == id)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.records.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}

	#[must_use]
	pub const fn is_loading(&self) -> bool {
		matches!(self.phase, Phase::Loading(_))
	}

	#[must_use]
	pub const fn owner(&self) -> Option<&R::Owner> {
		self.owner.as_ref()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use proptest::prelude::*;
	use tracing_test::traced_test;

	#[derive(Debug, Clone, PartialEq)]
	struct Row {
		id: String,
		owner: u8,
		title: String,
		created_at: u32,
	}

	impl Record for Row {
		type Id = String;
		type Owner = u8;

		fn id(&self) -> &String {
			&self.id
		}

		fn owner(&self) -> &u8 {
			&self.owner
		}
	}

	const OWNER: u8 = 1;

	fn row(id: &str, created_at: u32) -> Row {
		Row {
			id: id.to_string(),
			owner: OWNER,
			title: format!("title {id}"),
			created_at,
		}
	}

	fn ready(rows: Vec<Row>) -> Replica<Row> {
		let mut replica = Replica::new();
		replica.begin_snapshot(OWNER);
		assert_eq!(replica.complete_snapshot(rows), Some(0));
		replica
	}

	fn ids(replica: &Replica<Row>) -> Vec<&str> {
		replica.records().iter().map(|r| r.id.as_str()).collect()
	}

	#[test]
	fn insert_heads_the_list_regardless_of_timestamp() {
		let mut replica = ready(vec![row("1", 10)]);

		assert_eq!(replica.apply(ChangeEvent::Insert(row("2", 5))), Applied::Inserted);
		assert_eq!(ids(&replica), ["2", "1"]);
	}

	#[test]
	fn delete_removes_matching_entry() {
		let mut replica = ready(vec![row("1", 3), row("2", 2), row("3", 1)]);

		assert_eq!(
			replica.apply(ChangeEvent::Delete("2".to_string())),
			Applied::Removed(1)
		);
		assert_eq!(ids(&replica), ["1", "3"]);
	}

	#[test]
	fn second_delete_is_a_noop() {
		let mut replica = ready(vec![row("1", 2), row("2", 1)]);

		replica.apply(ChangeEvent::Delete("2".to_string()));
		assert_eq!(
			replica.apply(ChangeEvent::Delete("2".to_string())),
			Applied::Ignored(IgnoredReason::NoMatch)
		);
		assert_eq!(ids(&replica), ["1"]);
	}

	#[test]
	fn update_replaces_in_place() {
		let mut replica = ready(vec![row("1", 2), row("2", 1)]);

		let mut updated = row("2", 1);
		updated.title = "new".to_string();

		assert_eq!(
			replica.apply(ChangeEvent::Update(updated.clone())),
			Applied::Updated(1)
		);
		assert_eq!(ids(&replica), ["1", "2"]);
		assert_eq!(replica.records()[1], updated);
	}

	#[test]
	fn update_of_unknown_id_is_dropped() {
		let mut replica = ready(vec![row("1", 1)]);

		assert_eq!(
			replica.apply(ChangeEvent::Update(row("9", 1))),
			Applied::Ignored(IgnoredReason::NoMatch)
		);
		assert_eq!(replica.records(), [row("1", 1)]);
	}

	#[test]
	fn duplicate_insert_replaces_existing_entry() {
		let mut replica = ready(vec![row("1", 2), row("2", 1)]);

		let mut again = row("2", 1);
		again.title = "again".to_string();

		assert_eq!(replica.apply(ChangeEvent::Insert(again)), Applied::Replaced);
		assert_eq!(ids(&replica), ["1", "2"]);
		assert_eq!(replica.records()[1].title, "again");
	}

	#[test]
	fn foreign_owner_is_ignored() {
		let mut replica = ready(vec![row("1", 1)]);

		let mut foreign = row("2", 2);
		foreign.owner = OWNER + 1;

		assert_eq!(
			replica.apply(ChangeEvent::Insert(foreign)),
			Applied::Ignored(IgnoredReason::ForeignOwner)
		);
		assert_eq!(ids(&replica), ["1"]);
	}

	#[test]
	#[traced_test]
	fn events_during_load_are_replayed_after_snapshot() {
		let mut replica = Replica::new();
		replica.begin_snapshot(OWNER);

		assert_eq!(replica.apply(ChangeEvent::Insert(row("3", 30))), Applied::Buffered);
		assert_eq!(
			replica.apply(ChangeEvent::Delete("1".to_string())),
			Applied::Buffered
		);
		assert!(replica.is_loading());
		assert!(replica.is_empty());

		assert_eq!(
			replica.complete_snapshot(vec![row("2", 20), row("1", 10)]),
			Some(2)
		);
		assert!(!replica.is_loading());
		assert_eq!(ids(&replica), ["3", "2"]);
	}

	#[test]
	fn replaying_an_insert_already_in_the_snapshot_does_not_duplicate() {
		let mut replica = Replica::new();
		replica.begin_snapshot(OWNER);
		replica.apply(ChangeEvent::Insert(row("2", 20)));

		replica.complete_snapshot(vec![row("2", 20), row("1", 10)]);
		assert_eq!(ids(&replica), ["2", "1"]);
	}

	#[test]
	fn failed_snapshot_leaves_replica_empty() {
		let mut replica = ready(vec![row("1", 1)]);

		replica.begin_snapshot(OWNER);
		replica.apply(ChangeEvent::Insert(row("2", 2)));

		assert_eq!(replica.fail_snapshot(), 1);
		assert!(replica.is_empty());
		assert!(!replica.is_loading());

		// live events keep flowing after the failure
		assert_eq!(replica.apply(ChangeEvent::Insert(row("3", 3))), Applied::Inserted);
		assert_eq!(ids(&replica), ["3"]);
	}

	#[test]
	fn reset_discards_everything_and_ignores_late_events() {
		let mut replica = ready(vec![row("1", 1)]);

		replica.reset();
		assert!(replica.is_empty());
		assert!(replica.owner().is_none());
		assert_eq!(
			replica.apply(ChangeEvent::Insert(row("2", 2))),
			Applied::Ignored(IgnoredReason::Idle)
		);
		assert!(replica.is_empty());
	}

	#[test]
	fn snapshot_after_reset_is_discarded() {
		let mut replica = Replica::new();
		replica.begin_snapshot(OWNER);
		replica.reset();

		assert_eq!(replica.complete_snapshot(vec![row("1", 1)]), None);
		assert!(replica.is_empty());
	}

	#[test]
	fn snapshot_replaces_prior_state() {
		let mut replica = ready(vec![row("1", 1), row("2", 2)]);

		replica.begin_snapshot(OWNER);
		replica.complete_snapshot(vec![row("3", 3)]);
		assert_eq!(ids(&replica), ["3"]);
	}

	#[derive(Debug, Clone)]
	enum Op {
		Insert(u8),
		Update(u8),
		Delete(u8),
	}

	fn op() -> impl Strategy<Value = Op> {
		prop_oneof![
			(0..8_u8).prop_map(Op::Insert),
			(0..8_u8).prop_map(Op::Update),
			(0..8_u8).prop_map(Op::Delete),
		]
	}

	fn event(op: &Op, step: usize) -> ChangeEvent<Row> {
		match *op {
			Op::Insert(id) => ChangeEvent::Insert(Row {
				title: format!("insert {step}"),
				..row(&id.to_string(), u32::from(id))
			}),
			Op::Update(id) => ChangeEvent::Update(Row {
				title: format!("update {step}"),
				..row(&id.to_string(), u32::from(id))
			}),
			Op::Delete(id) => ChangeEvent::Delete(id.to_string()),
		}
	}

	proptest! {
		#[test]
		fn identifiers_stay_unique(ops in proptest::collection::vec(op(), 0..64)) {
			let mut replica = ready(vec![]);

			for (step, op) in ops.iter().enumerate() {
				replica.apply(event(op, step));

				let mut seen = replica.records().iter().map(|r| r.id.clone()).collect::<Vec<_>>();
				let total = seen.len();
				seen.sort();
				seen.dedup();
				prop_assert_eq!(seen.len(), total);
			}
		}

		#[test]
		fn delete_is_idempotent(ops in proptest::collection::vec(op(), 0..32), id in 0..8_u8) {
			let mut replica = ready(vec![]);
			for (step, op) in ops.iter().enumerate() {
				replica.apply(event(op, step));
			}

			replica.apply(ChangeEvent::Delete(id.to_string()));
			let after_first = replica.records().to_vec();

			prop_assert_eq!(
				replica.apply(ChangeEvent::Delete(id.to_string())),
				Applied::Ignored(IgnoredReason::NoMatch)
			);
			prop_assert_eq!(replica.records(), after_first.as_slice());
		}
	}
}
