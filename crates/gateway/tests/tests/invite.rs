//! spec.md §8 S5 — invite secrecy: the token only ever reaches the
//! inviter, the broadcast `presence` "invited" event never carries one,
//! and a duplicate invite is rejected rather than re-minting.

use serde_json::json;

use crate::common::gateway::TestGateway;

fn config() -> &'static str {
	r#"
topics:
  lobby:
    participants:
      - id: admin
        tokens: ["tok-admin"]
        capabilities:
          - kind: space/invite
      - id: onlooker
        tokens: ["tok-onlooker"]
        capabilities:
          - kind: chat
"#
}

#[tokio::test]
async fn invite_ack_goes_only_to_inviter_and_presence_carries_no_token() {
	let gw = TestGateway::start(config()).await;
	let mut admin = gw.connect("lobby", "tok-admin").await;
	let mut onlooker = gw.connect("lobby", "tok-onlooker").await;
	let _ = admin.recv_kind("presence").await;

	admin
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "space/invite",
			"payload": {"participantId": "new-agent", "name": "New Agent", "initialCapabilities": [{"kind": "chat"}]}
		}))
		.await;

	let ack = admin.recv_kind("space/invite-ack").await;
	assert_eq!(ack.to, vec!["admin".to_string()]);
	assert_eq!(ack.payload["participant_id"], "new-agent");
	let token = ack.payload["token"].as_str().expect("invite-ack carries a token").to_string();
	assert!(!token.is_empty());

	let presence = onlooker.recv_kind("presence").await;
	assert_eq!(presence.payload["event"], "invited");
	assert_eq!(presence.payload["participant_id"], "new-agent");
	assert!(presence.payload.get("token").is_none(), "invited presence must never carry the token");

	// the minted token actually authenticates a join.
	let mut new_agent = gw.connect("lobby", &token).await;
	new_agent
		.send(json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "hello"}}))
		.await;
	let heard = onlooker.recv_kind("chat").await;
	assert_eq!(heard.from, "new-agent");
}

#[tokio::test]
async fn duplicate_invite_is_rejected_and_does_not_remint() {
	let gw = TestGateway::start(config()).await;
	let mut admin = gw.connect("lobby", "tok-admin").await;

	admin
		.send(json!({"protocol": "mew/v0.4", "kind": "space/invite", "payload": {"participantId": "new-agent", "initialCapabilities": []}}))
		.await;
	let _first_ack = admin.recv_kind("space/invite-ack").await;

	admin
		.send(json!({"protocol": "mew/v0.4", "kind": "space/invite", "payload": {"participantId": "new-agent", "initialCapabilities": []}}))
		.await;
	let rejection = admin.recv_kind("system/error").await;
	assert_eq!(rejection.payload["error"], "already_exists");
}
