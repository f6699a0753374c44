use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum Error {
	#[error("invalid realtime url: {0}")]
	Url(String),
	#[error("websocket error: {0}")]
	WebSocket(#[from] tungstenite::Error),
	#[error("channel join refused <topic='{topic}'>: {reason}")]
	Join { topic: String, reason: String },
	#[error("timed out joining channel <topic='{0}'>")]
	JoinTimeout(String),
	#[error("malformed realtime message: {0}")]
	Protocol(#[from] serde_json::Error),
	#[error("realtime connection closed")]
	Closed,
}
