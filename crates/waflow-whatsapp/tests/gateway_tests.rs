// SPDX-FileCopyrightText: 2026 Waflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use waflow_config::model::WhatsAppConfig;
use waflow_core::{MessageGateway, WaflowError};
use waflow_whatsapp::WhatsAppGateway;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer) -> WhatsAppGateway {
    WhatsAppGateway::from_config(&WhatsAppConfig {
        api_key: Some("test-key".into()),
        base_url: server.uri(),
        timeout_secs: 1,
    })
    .unwrap()
}

#[tokio::test]
async fn sends_digits_only_and_returns_message_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("D360-API-KEY", "test-key"))
        .and(body_json(serde_json::json!({
            "messaging_product": "whatsapp",
            "to": "491701234567",
            "type": "text",
            "text": { "body": "Hi Ana" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "messaging_product": "whatsapp",
            "contacts": [{ "input": "491701234567", "wa_id": "491701234567" }],
            "messages": [{ "id": "wamid.HBgL" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let id = gateway(&server)
        .send_text("+491701234567", "Hi Ana")
        .await
        .unwrap();
    assert_eq!(id, "wamid.HBgL");
}

#[tokio::test]
async fn server_errors_and_rate_limits_are_transient() {
    for status in [429u16, 500, 503] {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("busy"))
            .mount(&server)
            .await;
        let err = gateway(&server).send_text("+15550001", "x").await.unwrap_err();
        assert!(
            matches!(err, WaflowError::TransientHandler { .. }),
            "{status}: {err}"
        );
    }
}

#[tokio::test]
async fn client_errors_are_permanent_with_provider_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "code": 131026, "message": "Receiver is incapable of receiving this message" }
        })))
        .mount(&server)
        .await;

    let err = gateway(&server).send_text("+15550001", "x").await.unwrap_err();
    assert!(matches!(err, WaflowError::PermanentHandler { .. }));
    assert!(err.to_string().contains("131026"));
}

#[tokio::test]
async fn slow_gateway_times_out_transiently() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "messages": [{ "id": "late" }] }))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let err = gateway(&server).send_text("+15550001", "x").await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn success_without_message_id_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "messages": [] })))
        .mount(&server)
        .await;

    let err = gateway(&server).send_text("+15550001", "x").await.unwrap_err();
    assert!(matches!(err, WaflowError::PermanentHandler { .. }));
}
