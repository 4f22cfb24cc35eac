use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use mew_gateway::config::GatewayConfig;
use mew_gateway::envelope::Envelope;
use mew_gateway::http::{self, AppState};
use mew_gateway::registry::TopicRegistry;
use tokio_tungstenite::tungstenite::Message;

/// A gateway bound to `127.0.0.1:0`, running on a background task for the
/// lifetime of the test.
pub struct TestGateway {
	addr: std::net::SocketAddr,
	_task: tokio::task::JoinHandle<()>,
}

impl TestGateway {
	pub async fn start(config_yaml: &str) -> Self {
		let config = GatewayConfig::from_yaml_str(config_yaml).expect("valid test config yaml");
		let registry = Arc::new(TopicRegistry::new(config));
		let app = http::router(AppState { registry });

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
		let addr = listener.local_addr().expect("listener has a local addr");
		let task = tokio::spawn(async move {
			let _ = axum::serve(listener, app).await;
		});
		Self { addr, _task: task }
	}

	pub fn ws_url(&self, topic: &str, token: &str) -> String {
		format!("ws://{}/ws?space={topic}&token={token}", self.addr)
	}

	pub fn http_base(&self) -> String {
		format!("http://{}", self.addr)
	}

	pub async fn connect(&self, topic: &str, token: &str) -> TestSession {
		let (ws, _resp) = tokio_tungstenite::connect_async(self.ws_url(topic, token)).await.expect("websocket handshake succeeds");
		let mut session = TestSession { ws };
		let welcome = session.recv().await.expect("every successful join gets a system/welcome");
		assert_eq!(welcome.kind, "system/welcome", "first frame after connect must be the welcome envelope");
		session
	}
}

/// One connected WebSocket test client, with helpers for sending/receiving
/// envelopes as whole JSON values rather than raw frames.
pub struct TestSession {
	ws: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

impl TestSession {
	pub async fn send(&mut self, envelope: serde_json::Value) {
		self.ws.send(Message::Text(envelope.to_string().into())).await.expect("send succeeds");
	}

	pub async fn send_binary(&mut self, frame: Vec<u8>) {
		self.ws.send(Message::Binary(frame.into())).await.expect("binary send succeeds");
	}

	/// Reads the next binary frame, skipping any text/control frames ahead
	/// of it.
	pub async fn recv_binary(&mut self) -> Option<Vec<u8>> {
		loop {
			match self.ws.next().await? {
				Ok(Message::Binary(bytes)) => return Some(bytes.into()),
				Ok(Message::Text(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
				Ok(Message::Close(_)) | Err(_) => return None,
				_ => continue,
			}
		}
	}

	/// Reads the next text frame and parses it as an envelope, skipping
	/// ping/pong control frames. Every envelope the gateway sends is
	/// already fully stamped, so this deserializes straight into
	/// [`Envelope`] rather than the wire-intake [`envelope::EnvelopeIn`].
	pub async fn recv(&mut self) -> Option<Envelope> {
		loop {
			match self.ws.next().await? {
				Ok(Message::Text(text)) => {
					return Some(serde_json::from_str(&text).expect("gateway only ever sends well-formed envelopes"));
				},
				Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
				Ok(Message::Close(_)) | Err(_) => return None,
				_ => continue,
			}
		}
	}

	pub async fn recv_kind(&mut self, kind: &str) -> Envelope {
		loop {
			let e = self.recv().await.unwrap_or_else(|| panic!("connection closed while waiting for `{kind}`"));
			if e.kind == kind {
				return e;
			}
		}
	}
}
