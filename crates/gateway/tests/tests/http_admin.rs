//! spec.md §4.8 — the HTTP admin surface, driven the same way a REST
//! client would, not through the WebSocket session layer.

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
"#
}

#[tokio::test]
async fn health_needs_no_auth_and_reports_ok() {
	let gw = TestGateway::start(config()).await;
	let client = reqwest::Client::new();
	let resp = client.get(format!("{}/health", gw.http_base())).send().await.unwrap();
	assert_eq!(resp.status(), 200);
	let body: serde_json::Value = resp.json().await.unwrap();
	assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn participants_endpoint_requires_bearer_auth() {
	let gw = TestGateway::start(config()).await;
	// touch the topic so it exists before the admin call.
	let _alice = gw.connect("lobby", "tok-alice").await;

	let client = reqwest::Client::new();
	let unauthenticated = client.get(format!("{}/v0/topics/lobby/participants", gw.http_base())).send().await.unwrap();
	assert_eq!(unauthenticated.status(), 401);

	let authenticated = client
		.get(format!("{}/v0/topics/lobby/participants", gw.http_base()))
		.bearer_auth("tok-alice")
		.send()
		.await
		.unwrap();
	assert_eq!(authenticated.status(), 200);
	let body: serde_json::Value = authenticated.json().await.unwrap();
	assert_eq!(body["participants"][0]["id"], "alice");
}

#[tokio::test]
async fn injecting_a_message_is_equivalent_to_sending_it_over_the_socket() {
	let gw = TestGateway::start(config()).await;
	let mut alice_ws = gw.connect("lobby", "tok-alice").await;

	let client = reqwest::Client::new();
	let resp = client
		.post(format!("{}/participants/alice/messages?space=lobby", gw.http_base()))
		.bearer_auth("tok-alice")
		.json(&json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "from rest"}}))
		.send()
		.await
		.unwrap();
	assert_eq!(resp.status(), 200);
	let body: serde_json::Value = resp.json().await.unwrap();
	assert_eq!(body["status"], "accepted");

	// alice is the only participant, so her own broadcast never comes back
	// to her, but the history endpoint should show it landed.
	let history = client
		.get(format!("{}/v0/topics/lobby/history", gw.http_base()))
		.bearer_auth("tok-alice")
		.send()
		.await
		.unwrap()
		.json::<serde_json::Value>()
		.await
		.unwrap();
	let entries = history["history"].as_array().unwrap();
	assert!(entries.iter().any(|e| e["payload"]["text"] == "from rest"));

	alice_ws.send(json!({"protocol": "mew/v0.4", "kind": "chat", "payload": {"text": "sanity"}})).await;
}

#[tokio::test]
async fn dev_token_mint_endpoint_is_disabled_in_production_mode() {
	let gw = TestGateway::start(
		r#"
productionMode: true
topics:
  lobby: {}
"#,
	)
	.await;
	let client = reqwest::Client::new();
	let resp = client
		.post(format!("{}/v0/auth/token", gw.http_base()))
		.json(&json!({"topic": "lobby", "participant_id": "dev-user"}))
		.send()
		.await
		.unwrap();
	assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn dev_token_mint_endpoint_requires_admin_bearer_auth() {
	let gw = TestGateway::start(
		r#"
adminToken: "tok-admin"
topics:
  lobby: {}
"#,
	)
	.await;
	let client = reqwest::Client::new();

	let unauthenticated = client
		.post(format!("{}/v0/auth/token", gw.http_base()))
		.json(&json!({"topic": "lobby", "participant_id": "dev-user"}))
		.send()
		.await
		.unwrap();
	assert_eq!(unauthenticated.status(), 401);

	let wrong_token = client
		.post(format!("{}/v0/auth/token", gw.http_base()))
		.bearer_auth("not-the-admin-token")
		.json(&json!({"topic": "lobby", "participant_id": "dev-user"}))
		.send()
		.await
		.unwrap();
	assert_eq!(wrong_token.status(), 401);

	let authenticated = client
		.post(format!("{}/v0/auth/token", gw.http_base()))
		.bearer_auth("tok-admin")
		.json(&json!({"topic": "lobby", "participant_id": "dev-user"}))
		.send()
		.await
		.unwrap();
	assert_eq!(authenticated.status(), 200);
	let body: serde_json::Value = authenticated.json().await.unwrap();
	assert_eq!(body["status"], "created");
}

#[tokio::test]
async fn dev_token_mint_endpoint_is_unreachable_without_a_configured_admin_token() {
	// No adminToken set at all: even a well-formed bearer header can never
	// authenticate, since there is nothing configured to compare it to.
	let gw = TestGateway::start("topics:\n  lobby: {}\n").await;
	let client = reqwest::Client::new();
	let resp = client
		.post(format!("{}/v0/auth/token", gw.http_base()))
		.bearer_auth("anything")
		.json(&json!({"topic": "lobby", "participant_id": "dev-user"}))
		.send()
		.await
		.unwrap();
	assert_eq!(resp.status(), 401);
}
