mod common;

use common::*;
use serde_json::json;
use whatsapp_webhooks::{
    client::{Client, SendNotification},
    error::ServiceErrorKind,
    Error,
};
use wiremock::{
    matchers::{bearer_token, body_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer) -> Client {
    Client::builder()
        .api_version("23.0")
        .base_url(server.uri())
        .build(ACCESS_TOKEN, PHONE_ID)
        .unwrap()
}

#[tokio::test]
async fn send_text_reply() {
    let mock_server = MockServer::start().await;
    let message_id = "wamid.your_message_id";

    let request_body = json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": RECIPIENT_ID,
        "type": "text",
        "text": { "body": "Thanks for your message!" }
    });

    let response_body = json!({
        "messaging_product": "whatsapp",
        "contacts": [{ "input": RECIPIENT_ID, "wa_id": RECIPIENT_ID }],
        "messages": [{ "id": message_id }]
    });

    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{PHONE_ID}/messages")))
        .and(bearer_token(ACCESS_TOKEN))
        .and(body_json(&request_body))
        .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let sent = client(&mock_server)
        .send(
            RECIPIENT_ID,
            &json!({ "type": "text", "text": { "body": "Thanks for your message!" } }),
        )
        .await
        .unwrap();

    assert_eq!(sent.messaging_product, "whatsapp");
    assert_eq!(sent.contacts[0].wa_id, RECIPIENT_ID);
    assert_eq!(sent.messages[0].id, message_id);
}

#[tokio::test]
async fn api_errors_are_structured() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{PHONE_ID}/messages")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "message": "(#131030) Recipient phone number not in allowed list",
                "type": "OAuthException",
                "code": 131030,
                "error_data": {
                    "messaging_product": "whatsapp",
                    "details": "Recipient phone number not in allowed list"
                },
                "fbtrace_id": "AbCdEf"
            }
        })))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .send(RECIPIENT_ID, &json!({ "type": "text", "text": { "body": "hi" } }))
        .await
        .unwrap_err();

    let service = match err {
        Error::Service(service) => service,
        other => panic!("expected a service error, got {other:?}"),
    };
    assert_eq!(service.status().as_u16(), 400);
    match service.kind() {
        ServiceErrorKind::Api(api) => {
            assert_eq!(api.code, 131030);
            assert_eq!(api.details(), Some("Recipient phone number not in allowed list"));
            assert_eq!(api.fbtrace_id.as_deref(), Some("AbCdEf"));
        }
        other => panic!("expected an API error, got {other:?}"),
    }
}

#[tokio::test]
async fn unparseable_responses_keep_the_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/v23.0/{PHONE_ID}/messages")))
        .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .send(RECIPIENT_ID, &json!({ "type": "text", "text": { "body": "hi" } }))
        .await
        .unwrap_err();

    let service = match err {
        Error::Service(service) => service,
        other => panic!("expected a service error, got {other:?}"),
    };
    assert!(matches!(
        service.kind(),
        ServiceErrorKind::Parse { body, .. } if body == "Bad Gateway"
    ));
}

#[tokio::test]
async fn non_object_payloads_are_rejected_before_sending() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server)
        .send(RECIPIENT_ID, &["not", "an", "object"])
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Internal(_)));
}
