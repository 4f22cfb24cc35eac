//! spec.md §4.7 — stream request/open/close plus correlated binary
//! frames multiplexed on the same transport.

use mew_gateway::streams;
use serde_json::json;

use crate::common::gateway::TestGateway;

fn config() -> &'static str {
	r#"
topics:
  lobby:
    participants:
      - id: uploader
        tokens: ["tok-uploader"]
        capabilities:
          - kind: stream/request
          - kind: stream/open
          - kind: stream/close
      - id: downloader
        tokens: ["tok-downloader"]
        capabilities:
          - kind: stream/open
          - kind: stream/close
"#
}

#[tokio::test]
async fn request_open_data_close_round_trips_between_peers() {
	let gw = TestGateway::start(config()).await;
	let mut uploader = gw.connect("lobby", "tok-uploader").await;
	let mut downloader = gw.connect("lobby", "tok-downloader").await;
	let _ = uploader.recv_kind("presence").await;

	uploader
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "stream/request",
			"to": ["downloader"],
			"payload": {"direction": "upload", "description": "file transfer"}
		}))
		.await;
	// the gateway mints the stream id and stamps it into the forwarded
	// request's payload (spec.md §4.7 step 1-2).
	let request = downloader.recv_kind("stream/request").await;
	let stream_id = request.payload["stream_id"].as_str().expect("gateway stamps the minted stream_id").to_string();

	downloader
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "stream/open",
			"to": ["uploader"],
			"correlation_id": [request.id],
			"payload": {"stream_id": stream_id, "direction": "upload"}
		}))
		.await;
	let opened = uploader.recv_kind("stream/open").await;
	assert_eq!(opened.from, "downloader");
	assert_eq!(opened.payload["stream_id"], stream_id);

	let frame = streams::encode_frame(&stream_id, b"chunk-of-bytes");
	uploader.send_binary(frame).await;

	let received = downloader.recv_binary().await.expect("downloader receives the forwarded frame");
	let (id, payload) = streams::decode_frame(&received).expect("frame decodes");
	assert_eq!(id, stream_id);
	assert_eq!(payload, b"chunk-of-bytes");

	uploader
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "stream/close",
			"payload": {"stream_id": stream_id}
		}))
		.await;
	let closed = downloader.recv_kind("stream/close").await;
	assert_eq!(closed.payload["stream_id"], stream_id);
}

#[tokio::test]
async fn unknown_stream_id_frame_is_dropped_silently() {
	let gw = TestGateway::start(config()).await;
	let mut uploader = gw.connect("lobby", "tok-uploader").await;
	let mut downloader = gw.connect("lobby", "tok-downloader").await;
	let _ = uploader.recv_kind("presence").await;

	let frame = streams::encode_frame("nonexistent-stream", b"ghost bytes");
	uploader.send_binary(frame).await;

	let nothing = tokio::time::timeout(std::time::Duration::from_millis(200), downloader.recv_binary()).await;
	assert!(nothing.is_err(), "frames for unknown streams must be dropped, not forwarded");
}
