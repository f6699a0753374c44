use crate::{
	message::{PHOENIX_TOPIC, PHX_CLOSE, PHX_ERROR, SYSTEM},
	ChannelConfig, Error, Message, RealtimeConfig, RowChange, Stopper, Subscription,
};

use std::{future::IntoFuture, time::Duration};

use async_channel as chan;
use futures::{SinkExt, StreamExt};
use tokio::{
	net::TcpStream,
	select, spawn,
	sync::mpsc,
	time::{interval, timeout, MissedTickBehavior},
};
use tokio_tungstenite::{
	connect_async, tungstenite::Message as Frame, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, instrument, trace, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENTS_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct RealtimeClient {
	config: RealtimeConfig,
}

impl RealtimeClient {
	#[must_use]
	pub const fn new(config: RealtimeConfig) -> Self {
		Self { config }
	}

	/// Opens a socket, joins `channel` and spawns the task that forwards row
	/// changes until the returned [`Subscription`] is closed.
	///
	/// The receiver ends when the feed task stops, for whatever reason.
	#[instrument(skip(self, channel, access_token), fields(topic = %channel.topic), err)]
	pub async fn subscribe(
		&self,
		channel: ChannelConfig,
		access_token: &str,
	) -> Result<(Subscription, mpsc::Receiver<RowChange>), Error> {
		let url = self.config.websocket_url()?;
		let (mut socket, _) = connect_async(url.as_str()).await?;

		let mut refs = Refs::default();
		let join_ref = refs.next_ref();

		send(&mut socket, &Message::join(&channel, access_token, &join_ref)).await?;

		timeout(
			self.config.join_timeout,
			await_join(&mut socket, &channel.topic, &join_ref),
		)
		.await
		.map_err(|_| Error::JoinTimeout(channel.topic.clone()))??;

		info!("Joined realtime channel");

		let (events_tx, events_rx) = mpsc::channel(EVENTS_BUFFER);
		let (stop_tx, stop_rx) = chan::bounded(1);

		let handle = spawn(run(
			Feed {
				socket,
				topic: channel.topic.clone(),
				join_ref,
				refs,
				events_tx,
			},
			self.config.heartbeat_interval,
			Stopper(stop_rx),
		));

		Ok((Subscription::new(channel.topic, stop_tx, handle), events_rx))
	}
}

#[derive(Default)]
struct Refs(u64);

impl Refs {
	fn next_ref(&mut self) -> String {
		self.0 += 1;
		self.0.to_string()
	}
}

async fn send(socket: &mut Socket, message: &Message) -> Result<(), Error> {
	let text = serde_json::to_string(message)?;
	trace!(%text, "Sending realtime frame");
	socket.send(Frame::Text(text)).await.map_err(Into::into)
}

async fn await_join(socket: &mut Socket, topic: &str, join_ref: &str) -> Result<(), Error> {
	while let Some(frame) = socket.next().await {
		let Frame::Text(text) = frame? else {
			continue;
		};

		let message = serde_json::from_str::<Message>(&text)?;
		if message.topic != topic || message.msg_ref.as_deref() != Some(join_ref) {
			continue;
		}

		if let Some((status, response)) = message.reply() {
			return if status == "ok" {
				Ok(())
			} else {
				Err(Error::Join {
					topic: topic.to_string(),
					reason: response.to_string(),
				})
			};
		}
	}

	Err(Error::Closed)
}

struct Feed {
	socket: Socket,
	topic: String,
	join_ref: String,
	refs: Refs,
	events_tx: mpsc::Sender<RowChange>,
}

enum Step {
	Continue,
	Forward(RowChange),
	Stop,
}

impl Feed {
	fn on_text(&self, text: &str) -> Step {
		let message = match serde_json::from_str::<Message>(text) {
			Ok(message) => message,
			Err(e) => {
				warn!(?e, "Skipping malformed realtime frame");
				return Step::Continue;
			}
		};

		if message.topic == PHOENIX_TOPIC {
			if let Some((status, _)) = message.reply() {
				trace!(%status, "Heartbeat acknowledged");
			}
			return Step::Continue;
		}

		if message.topic != self.topic {
			return Step::Continue;
		}

		match message.event.as_str() {
			PHX_ERROR => {
				error!(payload = %message.payload, "Realtime channel errored");
				Step::Stop
			}
			PHX_CLOSE => {
				info!("Realtime channel closed by server");
				Step::Stop
			}
			SYSTEM => {
				debug!(payload = %message.payload, "Realtime system message");
				Step::Continue
			}
			_ => match message.row_change() {
				Ok(Some(change)) => Step::Forward(change),
				Ok(None) => {
					if let Some((status, response)) = message.reply() {
						if status != "ok" {
							warn!(%status, %response, "Realtime request refused");
						}
					}
					Step::Continue
				}
				Err(e) => {
					warn!(?e, "Skipping undecodable row change");
					Step::Continue
				}
			},
		}
	}

	async fn leave(&mut self) {
		let leave = Message::leave(&self.topic, &self.join_ref, self.refs.next_ref());
		if let Err(e) = send(&mut self.socket, &leave).await {
			debug!(?e, "Failed to send leave, closing anyway");
		}

		if let Err(e) = self.socket.close(None).await {
			debug!(?e, "Failed to close realtime socket cleanly");
		}
	}
}

#[instrument(skip_all, fields(topic = %feed.topic))]
async fn run(mut feed: Feed, heartbeat: Duration, stop: Stopper) {
	let mut ticker = interval(heartbeat);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
	// first tick completes immediately, we just joined
	ticker.tick().await;

	loop {
		select! {
			() = (&stop).into_future() => {
				debug!("Leaving realtime channel");
				feed.leave().await;
				break;
			}

			_ = ticker.tick() => {
				let beat = Message::heartbeat(feed.refs.next_ref());
				if let Err(e) = send(&mut feed.socket, &beat).await {
					error!(?e, "Failed to send heartbeat");
					break;
				}
			}

			frame = feed.socket.next() => match frame {
				Some(Ok(Frame::Text(text))) => match feed.on_text(&text) {
					Step::Continue => {}
					Step::Forward(change) => {
						if feed.events_tx.send(change).await.is_err() {
							debug!("Change receiver dropped, leaving channel");
							feed.leave().await;
							break;
						}
					}
					Step::Stop => break,
				},
				Some(Ok(Frame::Close(frame))) => {
					warn!(?frame, "Realtime socket closed by server");
					break;
				}
				Some(Ok(_)) => {}
				Some(Err(e)) => {
					error!(?e, "Realtime socket failed");
					break;
				}
				None => {
					warn!("Realtime socket ended");
					break;
				}
			}
		}
	}
}
