//! spec.md §8 S1 — two participants in one topic, broadcast chat.

use serde_json::json;

use crate::common::gateway::TestGateway;

fn config() -> &'static str {
	r#"
topics:
  lobby:
    participants:
      - id: alice
        tokens: ["tok-alice"]
        capabilities:
          - kind: chat
      - id: bob
        tokens: ["tok-bob"]
        capabilities:
          - kind: chat
"#
}

#[tokio::test]
async fn broadcast_chat_reaches_every_other_online_participant() {
	let gw = TestGateway::start(config()).await;
	let mut alice = gw.connect("lobby", "tok-alice").await;
	let mut bob = gw.connect("lobby", "tok-bob").await;

	// bob's join produced a presence/join broadcast to alice; drain it.
	let _ = alice.recv_kind("presence").await;

	alice.send(json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "hi"}})).await;

	let received = bob.recv_kind("chat").await;
	assert_eq!(received.from, "alice");
	assert_eq!(received.payload["text"], "hi");
	assert!(received.to.is_empty(), "broadcast envelopes carry no `to`");
}

#[tokio::test]
async fn sender_never_receives_its_own_broadcast() {
	let gw = TestGateway::start(config()).await;
	let mut alice = gw.connect("lobby", "tok-alice").await;
	let mut bob = gw.connect("lobby", "tok-bob").await;
	let _ = alice.recv_kind("presence").await;

	alice.send(json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "echo-check"}})).await;
	let _ = bob.recv_kind("chat").await;

	let nothing = tokio::time::timeout(std::time::Duration::from_millis(200), alice.recv()).await;
	assert!(nothing.is_err(), "alice's own broadcast must never come back to her");
}
