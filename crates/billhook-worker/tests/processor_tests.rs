//! Integration tests for the estimate→invoice pipeline against a fake
//! CRM API.

use std::sync::Arc;
use std::time::Duration;

use billhook_client::{CrmClient, OAuthConfig, RetryPolicy, TokenManager};
use billhook_core::event::InboundEvent;
use billhook_worker::{EventProcessor, Outcome, ProcessError, SkipReason, TriggerConfig};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn processor_for(server: &MockServer) -> EventProcessor {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok", "expires_in": 3600})),
        )
        .mount(server)
        .await;

    let config = OAuthConfig {
        token_url: format!("{}/oauth/token", server.uri()),
        client_id: "client-1".into(),
        client_secret: "secret-1".into(),
    };
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let auth = TokenManager::new(config, http);
    let client = CrmClient::new(
        server.uri(),
        auth,
        RetryPolicy::new(0, Duration::ZERO),
        Duration::from_secs(5),
    )
    .unwrap();

    EventProcessor::new(Arc::new(client), TriggerConfig::default())
}

fn event(event_type: &str, related_type: &str, id: &str) -> InboundEvent {
    serde_json::from_value(json!({
        "event": event_type,
        "relatedtype": related_type,
        "relatedobject": { "id": id }
    }))
    .unwrap()
}

fn won_estimate() -> serde_json::Value {
    json!({
        "id": "est_1",
        "status": "won",
        "subject": "Website rebuild",
        "rows": [
            {"description": "design", "quantity": 3.0, "unit_amount": "450.00", "tax_id": "tax_20"},
            {"description": "hosting", "quantity": 12.0, "product_id": "prod_7"}
        ],
        "related": [{"id": "corp_5", "type": "corp"}]
    })
}

/// A relevant event for an accepted estimate yields exactly one invoice
/// creation whose rows equal the mapped source rows.
#[tokio::test]
async fn test_accepted_estimate_creates_one_invoice() {
    let server = MockServer::start().await;
    let processor = processor_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/estimates/est_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(won_estimate()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "inv_1"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/estimates/est_1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = processor
        .handle_event(&event("docslog", "estimate", "est_1"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Created {
            invoice_id: "inv_1".into()
        }
    );

    let requests = server.received_requests().await.unwrap();
    let create = requests
        .iter()
        .find(|r| r.url.path() == "/invoices")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&create.body).unwrap();

    assert_eq!(body["rows"][0]["description"], "design");
    assert_eq!(body["rows"][0]["unit_amount"], "450.00");
    assert_eq!(body["rows"][1]["product_id"], "prod_7");
    // Absent in the source row, so it must be absent here too.
    assert!(body["rows"][1].get("unit_amount").is_none());
    assert_eq!(body["related"][0]["id"], "corp_5");
    assert_eq!(body["parent"], json!({"type": "estimate", "id": "est_1"}));
}

/// A draft estimate produces zero outbound create calls.
#[tokio::test]
async fn test_draft_estimate_is_skipped() {
    let server = MockServer::start().await;
    let processor = processor_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/estimates/est_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "est_1",
            "status": "draft",
            "related": [{"id": "corp_5", "type": "corp"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = processor
        .handle_event(&event("docslog", "estimate", "est_1"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Skipped(SkipReason::NotAccepted {
            status: "draft".into()
        })
    );
}

/// Events outside the trigger pair are consumed without any API call.
#[tokio::test]
async fn test_irrelevant_event_makes_no_api_calls() {
    let server = MockServer::start().await;
    let processor = processor_for(&server).await;

    let outcome = processor
        .handle_event(&event("docslog", "invoice", "inv_3"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped(SkipReason::IrrelevantEvent));

    let outcome = processor
        .handle_event(&event("created", "estimate", "est_1"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Skipped(SkipReason::IrrelevantEvent));

    // Not even a token exchange happened.
    assert!(server.received_requests().await.unwrap().is_empty());
}

/// An accepted estimate without a resolvable customer fails hard,
/// before any create call.
#[tokio::test]
async fn test_missing_customer_fails_without_create() {
    let server = MockServer::start().await;
    let processor = processor_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/estimates/est_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "est_1",
            "status": "won",
            "rows": [{"description": "design"}],
            "related": [{"id": "contact_9", "type": "contact"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let err = processor
        .handle_event(&event("docslog", "estimate", "est_1"))
        .await
        .unwrap_err();

    assert!(matches!(err, ProcessError::MissingReference(_)));
    assert!(!err.is_retryable());
}

/// Redelivery of an already-invoiced estimate is consumed without a
/// second create.
#[tokio::test]
async fn test_already_invoiced_estimate_is_not_recreated() {
    let server = MockServer::start().await;
    let processor = processor_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/estimates/est_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "est_1",
            "status": "won",
            "related": [{"id": "corp_5", "type": "corp"}],
            "linked_invoice_id": "inv_1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = processor
        .handle_event(&event("docslog", "estimate", "est_1"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Skipped(SkipReason::AlreadyInvoiced {
            invoice_id: "inv_1".into()
        })
    );
}

/// A failed back-link is logged and swallowed; the job still succeeds.
#[tokio::test]
async fn test_backlink_failure_does_not_fail_job() {
    let server = MockServer::start().await;
    let processor = processor_for(&server).await;

    Mock::given(method("GET"))
        .and(path("/estimates/est_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(won_estimate()))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoices"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "inv_1"})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/estimates/est_1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("links are read-only"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = processor
        .handle_event(&event("docslog", "estimate", "est_1"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        Outcome::Created {
            invoice_id: "inv_1".into()
        }
    );
}
