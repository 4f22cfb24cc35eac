//! spec.md §8 S4 — grant/ack/use/revoke.

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
          - kind: capability/grant
          - kind: capability/revoke
          - kind: capability/grant-ack
      - id: agent-x
        tokens: ["tok-agent-x"]
        capabilities:
          - kind: capability/grant-ack
"#
}

#[tokio::test]
async fn grant_then_ack_admits_matching_requests_and_rejects_others() {
	let gw = TestGateway::start(config()).await;
	let mut admin = gw.connect("lobby", "tok-admin").await;
	let mut agent = gw.connect("lobby", "tok-agent-x").await;
	let _ = admin.recv_kind("presence").await;

	admin
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/grant",
			"to": ["agent-x"],
			"payload": {
				"capabilities": [{"kind": "mcp/request", "to": ["file-server"], "payload": {"method": "tools/call", "params": {"name": "write_file"}}}]
			}
		}))
		.await;

	let grant = agent.recv_kind("capability/grant").await;
	assert_eq!(grant.to, vec!["agent-x".to_string()]);

	agent
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/grant-ack",
			"correlation_id": [grant.id],
			"payload": {"grantId": grant.id}
		}))
		.await;

	// file-server never actually connects in this test, so a successful
	// admission produces no delivery at all (non-existent `to` ids are
	// silently dropped) — the absence of a system/error is the assertion
	// that the grant actually took effect.
	agent
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "mcp/request",
			"to": ["file-server"],
			"payload": {"method": "tools/call", "params": {"name": "write_file"}}
		}))
		.await;
	let nothing_rejected = tokio::time::timeout(std::time::Duration::from_millis(200), agent.recv());
	assert!(nothing_rejected.await.is_err(), "write_file request should be admitted, not rejected");

	agent
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "mcp/request",
			"to": ["file-server"],
			"payload": {"method": "tools/call", "params": {"name": "delete_file"}}
		}))
		.await;
	let rejection = agent.recv_kind("system/error").await;
	assert_eq!(rejection.payload["error"], "capability_violation", "delete_file was never granted");
}

#[tokio::test]
async fn grant_ack_from_wrong_sender_is_rejected_and_grant_stays_pending() {
	let gw = TestGateway::start(config()).await;
	let mut admin = gw.connect("lobby", "tok-admin").await;
	let mut agent = gw.connect("lobby", "tok-agent-x").await;
	let _ = admin.recv_kind("presence").await;

	admin
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/grant",
			"to": ["agent-x"],
			"payload": {"capabilities": [{"kind": "chat"}]}
		}))
		.await;
	let grant = agent.recv_kind("capability/grant").await;

	// admin (not the recipient) tries to ack its own grant on agent-x's behalf.
	admin
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/grant-ack",
			"correlation_id": [grant.id],
			"payload": {"grantId": grant.id}
		}))
		.await;

	let rejection = admin.recv_kind("system/error").await;
	assert_eq!(rejection.payload["error"], "capability_violation");
}

/// spec.md §4.6's wire contract: `capability/grant` carries `{recipient,
/// capabilities[], reason?, expires_at?}` in its *payload* — a sender
/// that addresses the grant this way (rather than via the envelope's
/// `to`) must still have it applied, with `expires_at` honored as the
/// absolute expiry instant.
#[tokio::test]
async fn grant_addressed_via_payload_recipient_is_applied() {
	let gw = TestGateway::start(config()).await;
	let mut admin = gw.connect("lobby", "tok-admin").await;
	let mut agent = gw.connect("lobby", "tok-agent-x").await;
	let _ = admin.recv_kind("presence").await;

	admin
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/grant",
			"payload": {
				"recipient": "agent-x",
				"capabilities": [{"kind": "chat"}],
				"expires_at": "2999-01-01T00:00:00Z"
			}
		}))
		.await;

	let grant = agent.recv_kind("capability/grant").await;
	agent
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/grant-ack",
			"correlation_id": [grant.id],
			"payload": {"grantId": grant.id}
		}))
		.await;

	agent
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "chat",
			"payload": {"text": "hi"}
		}))
		.await;
	let nothing_rejected = tokio::time::timeout(std::time::Duration::from_millis(200), agent.recv());
	assert!(nothing_rejected.await.is_err(), "chat should be admitted under the payload-addressed grant");
}

/// Same payload-addressing contract for `capability/revoke` (spec.md
/// §4.6: `{recipient, capabilities[]}`).
#[tokio::test]
async fn revoke_addressed_via_payload_recipient_takes_effect() {
	let gw = TestGateway::start(config()).await;
	let mut admin = gw.connect("lobby", "tok-admin").await;
	let mut agent = gw.connect("lobby", "tok-agent-x").await;
	let _ = admin.recv_kind("presence").await;

	admin
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/grant",
			"payload": {"recipient": "agent-x", "capabilities": [{"kind": "chat"}]}
		}))
		.await;
	let grant = agent.recv_kind("capability/grant").await;
	agent
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/grant-ack",
			"correlation_id": [grant.id],
			"payload": {"grantId": grant.id}
		}))
		.await;

	admin
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "capability/revoke",
			"payload": {"recipient": "agent-x", "capabilities": [{"kind": "chat"}]}
		}))
		.await;

	agent
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "chat",
			"payload": {"text": "hi"}
		}))
		.await;
	let rejection = agent.recv_kind("system/error").await;
	assert_eq!(rejection.payload["error"], "capability_violation", "chat was revoked via payload.recipient");
}
