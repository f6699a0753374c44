use crate::{ChannelConfig, Error};

use sb_replica::{ChangeEvent, Record};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};

pub const PHX_JOIN: &str = "phx_join";
pub const PHX_LEAVE: &str = "phx_leave";
pub const PHX_REPLY: &str = "phx_reply";
pub const PHX_ERROR: &str = "phx_error";
pub const PHX_CLOSE: &str = "phx_close";
pub const HEARTBEAT: &str = "heartbeat";
pub const POSTGRES_CHANGES: &str = "postgres_changes";
pub const SYSTEM: &str = "system";

pub const PHOENIX_TOPIC: &str = "phoenix";

/// A Phoenix channel frame (JSON serializer, protocol v1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
	pub topic: String,
	pub event: String,
	#[serde(default)]
	pub payload: Value,
	#[serde(rename = "ref", default)]
	pub msg_ref: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub join_ref: Option<String>,
}

impl Message {
	pub(crate) fn join(channel: &ChannelConfig, access_token: &str, join_ref: &str) -> Self {
		Self {
			topic: channel.topic.clone(),
			event: PHX_JOIN.to_string(),
			payload: channel.join_payload(access_token),
			msg_ref: Some(join_ref.to_string()),
			join_ref: Some(join_ref.to_string()),
		}
	}

	pub(crate) fn leave(topic: &str, join_ref: &str, msg_ref: String) -> Self {
		Self {
			topic: topic.to_string(),
			event: PHX_LEAVE.to_string(),
			payload: json!({}),
			msg_ref: Some(msg_ref),
			join_ref: Some(join_ref.to_string()),
		}
	}

	pub(crate) fn heartbeat(msg_ref: String) -> Self {
		Self {
			topic: PHOENIX_TOPIC.to_string(),
			event: HEARTBEAT.to_string(),
			payload: json!({}),
			msg_ref: Some(msg_ref),
			join_ref: None,
		}
	}

	/// Status and response of a `phx_reply`.
	pub(crate) fn reply(&self) -> Option<(&str, &Value)> {
		if self.event != PHX_REPLY {
			return None;
		}

		let status = self.payload.get("status")?.as_str()?;

		Some((status, self.payload.get("response").unwrap_or(&Value::Null)))
	}

	/// The row change carried by a `postgres_changes` push.
	pub(crate) fn row_change(&self) -> Result<Option<RowChange>, Error> {
		if self.event != POSTGRES_CHANGES {
			return Ok(None);
		}

		let Some(data) = self.payload.get("data") else {
			return Ok(None);
		};

		RowChange::deserialize(data).map(Some).map_err(Into::into)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
	Insert,
	Update,
	Delete,
}

/// A committed change to one row, as pushed by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
	#[serde(rename = "type")]
	pub kind: ChangeKind,
	pub schema: String,
	pub table: String,
	#[serde(default)]
	pub commit_timestamp: Option<String>,
	#[serde(default)]
	pub record: Value,
	#[serde(default)]
	pub old_record: Value,
}

impl RowChange {
	/// Decodes the row into a replica event. Deletions only need the `id`
	/// column of the old row.
	pub fn decode<R>(self) -> Result<ChangeEvent<R>, Error>
	where
		R: Record + DeserializeOwned,
		R::Id: DeserializeOwned,
	{
		#[derive(Deserialize)]
		struct Key<Id> {
			id: Id,
		}

		Ok(match self.kind {
			ChangeKind::Insert => ChangeEvent::Insert(serde_json::from_value(self.record)?),
			ChangeKind::Update => ChangeEvent::Update(serde_json::from_value(self.record)?),
			ChangeKind::Delete => {
				ChangeEvent::Delete(serde_json::from_value::<Key<R::Id>>(self.old_record)?.id)
			}
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Debug, Clone, PartialEq, Deserialize)]
	struct Row {
		id: String,
		user_id: String,
		title: String,
	}

	impl Record for Row {
		type Id = String;
		type Owner = String;

		fn id(&self) -> &String {
			&self.id
		}

		fn owner(&self) -> &String {
			&self.user_id
		}
	}

	fn push(data: &Value) -> Message {
		serde_json::from_value(json!({
			"topic": "realtime:bookmarks-realtime",
			"event": "postgres_changes",
			"payload": { "data": data, "ids": [1] },
			"ref": null,
		}))
		.unwrap()
	}

	#[test]
	fn insert_push_decodes_into_event() {
		let change = push(&json!({
			"type": "INSERT",
			"schema": "public",
			"table": "bookmarks",
			"commit_timestamp": "2024-05-01T12:30:00Z",
			"record": { "id": "1", "user_id": "u", "title": "Rust" },
			"old_record": null,
			"columns": [],
			"errors": null,
		}))
		.row_change()
		.unwrap()
		.unwrap();

		assert_eq!(change.kind, ChangeKind::Insert);
		assert_eq!(
			change.decode::<Row>().unwrap(),
			ChangeEvent::Insert(Row {
				id: "1".to_string(),
				user_id: "u".to_string(),
				title: "Rust".to_string(),
			})
		);
	}

	#[test]
	fn delete_push_only_needs_the_key() {
		let change = push(&json!({
			"type": "DELETE",
			"schema": "public",
			"table": "bookmarks",
			"old_record": { "id": "7" },
		}))
		.row_change()
		.unwrap()
		.unwrap();

		assert_eq!(
			change.decode::<Row>().unwrap(),
			ChangeEvent::Delete("7".to_string())
		);
	}

	#[test]
	fn update_with_missing_columns_fails_to_decode() {
		let change = push(&json!({
			"type": "UPDATE",
			"schema": "public",
			"table": "bookmarks",
			"record": { "id": "1" },
		}))
		.row_change()
		.unwrap()
		.unwrap();

		assert!(change.decode::<Row>().is_err());
	}

	#[test]
	fn other_events_are_not_changes() {
		let msg = Message::heartbeat("3".to_string());
		assert_eq!(msg.row_change().unwrap(), None);
		assert_eq!(msg.reply(), None);
	}

	#[test]
	fn reply_status() {
		let msg: Message = serde_json::from_value(json!({
			"topic": "realtime:bookmarks-realtime",
			"event": "phx_reply",
			"payload": { "status": "ok", "response": { "postgres_changes": [] } },
			"ref": "1",
		}))
		.unwrap();

		let (status, response) = msg.reply().unwrap();
		assert_eq!(status, "ok");
		assert_eq!(response["postgres_changes"], json!([]));
	}

	#[test]
	fn join_frame_shape() {
		let channel = ChannelConfig::new("bookmarks-realtime", "public", "bookmarks");
		let frame = serde_json::to_value(Message::join(&channel, "jwt", "1")).unwrap();

		assert_eq!(frame["topic"], "realtime:bookmarks-realtime");
		assert_eq!(frame["event"], "phx_join");
		assert_eq!(frame["ref"], "1");
		assert_eq!(frame["join_ref"], "1");
		assert_eq!(frame["payload"]["access_token"], "jwt");
	}
}
