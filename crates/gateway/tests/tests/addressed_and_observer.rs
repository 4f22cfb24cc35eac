//! spec.md §8 S2 — addressed MCP request/response, with an observer
//! holding a broader visibility capability.

use serde_json::json;

use crate::common::gateway::TestGateway;

fn config() -> &'static str {
	r#"
topics:
  lobby:
    participants:
      - id: research-agent
        tokens: ["tok-research"]
        capabilities:
          - kind: mcp/request
      - id: calculator-agent
        tokens: ["tok-calc"]
        capabilities:
          - kind: mcp/response
      - id: watcher
        tokens: ["tok-watcher"]
        capabilities:
          - kind: mcp/**
      - id: bystander
        tokens: ["tok-bystander"]
        capabilities:
          - kind: chat
"#
}

#[tokio::test]
async fn addressed_request_response_reaches_recipient_and_observer_only() {
	let gw = TestGateway::start(config()).await;
	let mut research = gw.connect("lobby", "tok-research").await;
	let mut calc = gw.connect("lobby", "tok-calc").await;
	let mut watcher = gw.connect("lobby", "tok-watcher").await;
	let mut bystander = gw.connect("lobby", "tok-bystander").await;

	// drain join-presence noise.
	for _ in 0..3 {
		let _ = research.recv_kind("presence").await;
	}

	research
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "mcp/request",
			"to": ["calculator-agent"],
			"payload": {"jsonrpc": "2.0", "id": 42, "method": "tools/call", "params": {"name": "multiply", "arguments": {"a": 5, "b": 12}}}
		}))
		.await;

	let req_at_calc = calc.recv_kind("mcp/request").await;
	assert_eq!(req_at_calc.from, "research-agent");
	let req_at_watcher = watcher.recv_kind("mcp/request").await;
	assert_eq!(req_at_watcher.payload["id"], 42);

	let nothing = tokio::time::timeout(std::time::Duration::from_millis(200), bystander.recv()).await;
	assert!(nothing.is_err(), "bystander holds no mcp/* visibility and must not observe the request");

	calc
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "mcp/response",
			"to": ["research-agent"],
			"correlation_id": [req_at_calc.id],
			"payload": {"jsonrpc": "2.0", "id": 42, "result": {"content": [{"type": "text", "text": "60"}]}}
		}))
		.await;

	let resp_at_research = research.recv_kind("mcp/response").await;
	assert_eq!(resp_at_research.correlation_id, vec![req_at_calc.id.clone()]);
	let resp_at_watcher = watcher.recv_kind("mcp/response").await;
	assert_eq!(resp_at_watcher.payload["result"]["content"][0]["text"], "60");
}

#[tokio::test]
async fn self_addressed_envelope_is_not_delivered_back_to_sender() {
	// spec.md §8 invariant 4: "p never receives an envelope with
	// from == p" — stated unconditionally, not just for broadcast.
	let gw = TestGateway::start(config()).await;
	let mut bystander = gw.connect("lobby", "tok-bystander").await;

	bystander
		.send(json!({
			"protocol": "mew/v0.4",
			"kind": "chat",
			"to": ["bystander"],
			"payload": {"text": "talking to myself"}
		}))
		.await;

	let nothing = tokio::time::timeout(std::time::Duration::from_millis(200), bystander.recv()).await;
	assert!(nothing.is_err(), "a participant addressing themself must not receive their own envelope");
}

#[tokio::test]
async fn proposer_without_mcp_request_capability_is_rejected() {
	let gw = TestGateway::start(config()).await;
	let mut bystander = gw.connect("lobby", "tok-bystander").await;

	bystander
		.send(json!({"protocol": "mew/v0.4", "kind": "mcp/request", "to": ["calculator-agent"], "payload": {}}))
		.await;

	let rejection = bystander.recv_kind("system/error").await;
	assert_eq!(rejection.payload["error"], "capability_violation");
}
