//! spec.md §8 S6 — reasoning context.
//!
//! `reasoning/*` envelopes share a `context` id rather than a strict
//! reply chain; an observer can reconstruct the whole thought sequence
//! by filtering history on that id, and the final `chat` reply still
//! correlates back to the originating request by `correlation_id`.

use serde_json::json;

use crate::common::gateway::TestGateway;

fn config() -> &'static str {
	r#"
topics:
  lobby:
    participants:
      - id: agent
        tokens: ["tok-agent"]
        capabilities:
          - kind: reasoning/*
          - kind: chat
      - id: human
        tokens: ["tok-human"]
        capabilities:
          - kind: chat
"#
}

#[tokio::test]
async fn context_chain_is_recorded_and_history_filterable_by_context() {
	let gw = TestGateway::start(config()).await;
	let mut agent = gw.connect("lobby", "tok-agent").await;
	let mut human = gw.connect("lobby", "tok-human").await;
	let _ = agent.recv_kind("presence").await;

	human
		.send(json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "what's 2+2?"}}))
		.await;
	let c1 = agent.recv_kind("chat").await;

	agent
		.send(json!({"protocol": "mew/v0.4", "kind": "reasoning/start", "correlation_id": [c1.id], "payload": {}}))
		.await;
	let r1_start = human.recv_kind("reasoning/start").await;

	agent
		.send(json!({"protocol": "mew/v0.4", "kind": "reasoning/thought", "context": r1_start.id, "payload": {"text": "adding 2 and 2"}}))
		.await;
	let thought = human.recv_kind("reasoning/thought").await;
	assert_eq!(thought.context.as_deref(), Some(r1_start.id.as_str()));

	agent
		.send(json!({"protocol": "mew/v0.4", "kind": "reasoning/conclusion", "context": r1_start.id, "payload": {"text": "4"}}))
		.await;
	let conclusion = human.recv_kind("reasoning/conclusion").await;
	assert_eq!(conclusion.context.as_deref(), Some(r1_start.id.as_str()));

	agent
		.send(json!({"protocol": "mew/v0.4", "kind": "chat", "correlation_id": [c1.id], "payload": {"text": "4"}}))
		.await;
	let reply = human.recv_kind("chat").await;
	assert_eq!(reply.correlation_id, vec![c1.id.clone()]);
	assert_eq!(reply.payload["text"], "4");

	let client = reqwest::Client::new();
	let history = client
		.get(format!("{}/v0/topics/lobby/history?limit=100", gw.http_base()))
		.bearer_auth("tok-human")
		.send()
		.await
		.expect("history request succeeds")
		.json::<serde_json::Value>()
		.await
		.expect("history response is json");
	let entries = history["history"].as_array().expect("history is a json array");
	let context_chain: Vec<&str> = entries
		.iter()
		.filter(|e| e["context"].as_str() == Some(r1_start.id.as_str()))
		.map(|e| e["kind"].as_str().unwrap_or_default())
		.collect();
	assert_eq!(context_chain, vec!["reasoning/thought", "reasoning/conclusion"]);
}
