use crate::Error;

use std::time::Duration;

use serde_json::{json, Value};
use url::Url;

/// Protocol version spoken with the realtime service.
pub const PROTOCOL_VSN: &str = "1.0.0";

const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(25);
const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
	/// Same base url used for the REST and identity endpoints.
	pub api_url: String,
	pub api_key: String,
	pub heartbeat_interval: Duration,
	pub join_timeout: Duration,
}

impl RealtimeConfig {
	pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
		Self {
			api_url: api_url.into(),
			api_key: api_key.into(),
			heartbeat_interval: DEFAULT_HEARTBEAT,
			join_timeout: DEFAULT_JOIN_TIMEOUT,
		}
	}

	/// `https://host` becomes `wss://host/realtime/v1/websocket?apikey=..&vsn=..`.
	pub fn websocket_url(&self) -> Result<Url, Error> {
		let mut url = Url::parse(&self.api_url).map_err(|e| Error::Url(e.to_string()))?;

		let scheme = match url.scheme() {
			"https" | "wss" => "wss",
			"http" | "ws" => "ws",
			other => return Err(Error::Url(format!("unsupported scheme '{other}'"))),
		};

		url.set_scheme(scheme)
			.map_err(|()| Error::Url(format!("cannot switch {} to {scheme}", self.api_url)))?;

		let path = format!("{}/realtime/v1/websocket", url.path().trim_end_matches('/'));
		url.set_path(&path);
		url.query_pairs_mut()
			.clear()
			.append_pair("apikey", &self.api_key)
			.append_pair("vsn", PROTOCOL_VSN);

		Ok(url)
	}
}

/// One channel listening to row changes of a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
	pub topic: String,
	pub schema: String,
	pub table: String,
	/// Row filter in the service's syntax, e.g. `user_id=eq.<uuid>`.
	pub filter: Option<String>,
}

impl ChannelConfig {
	pub fn new(name: &str, schema: impl Into<String>, table: impl Into<String>) -> Self {
		Self {
			topic: format!("realtime:{name}"),
			schema: schema.into(),
			table: table.into(),
			filter: None,
		}
	}

	#[must_use]
	pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
		self.filter = Some(filter.into());
		self
	}

	pub(crate) fn join_payload(&self, access_token: &str) -> Value {
		let mut changes = json!({
			"event": "*",
			"schema": self.schema,
			"table": self.table,
		});

		if let Some(filter) = &self.filter {
			changes["filter"] = json!(filter);
		}

		json!({
			"config": {
				"broadcast": { "ack": false, "self": false },
				"presence": { "key": "" },
				"postgres_changes": [changes],
				"private": false,
			},
			"access_token": access_token,
		})
	}
}
