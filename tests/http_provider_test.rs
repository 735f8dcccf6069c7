use payment_dispatch::domain::account::Amount;
use payment_dispatch::domain::payment::{PaymentId, TransactionId};
use payment_dispatch::domain::ports::{PaymentProvider, ProviderCall};
use payment_dispatch::error::ProviderError;
use payment_dispatch::infrastructure::http::HttpPaymentProvider;
use rust_decimal_macros::dec;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn call() -> ProviderCall {
    ProviderCall {
        service_name: "onlineStore".to_string(),
        account_name: "acc-3".to_string(),
        transaction_id: TransactionId::new(),
        payment_id: PaymentId::new(),
        amount: Amount::new(dec!(100)).unwrap(),
    }
}

async fn respond_with(server: &MockServer, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/external/process"))
        .respond_with(response)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_sends_call_parameters_in_query() {
    let server = MockServer::start().await;
    let call = call();
    Mock::given(method("POST"))
        .and(path("/external/process"))
        .and(query_param("serviceName", "onlineStore"))
        .and(query_param("accountName", "acc-3"))
        .and(query_param("transactionId", call.transaction_id.to_string()))
        .and(query_param("paymentId", call.payment_id.to_string()))
        .and(query_param("amount", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "transactionId": call.transaction_id.to_string(),
            "paymentId": call.payment_id.to_string(),
            "result": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = HttpPaymentProvider::new(&server.uri()).unwrap();
    let reply = provider.process(&call, Duration::from_secs(5)).await.unwrap();

    assert_eq!(reply.status, 200);
    assert!(reply.body.result);
    assert_eq!(reply.body.message, None);
}

#[tokio::test]
async fn test_rejection_keeps_status_and_message() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(500).set_body_json(json!({
            "transactionId": "t",
            "paymentId": "p",
            "result": false,
            "message": "temporary error"
        })),
    )
    .await;

    let provider = HttpPaymentProvider::new(&server.uri()).unwrap();
    let reply = provider.process(&call(), Duration::from_secs(5)).await.unwrap();

    assert_eq!(reply.status, 500);
    assert!(!reply.body.result);
    assert_eq!(reply.body.message.as_deref(), Some("temporary error"));
}

#[tokio::test]
async fn test_undecodable_body_is_malformed() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"),
    )
    .await;

    let provider = HttpPaymentProvider::new(&server.uri()).unwrap();
    let error = provider
        .process(&call(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::Malformed { status: 502, .. }));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;
    respond_with(
        &server,
        ResponseTemplate::new(200)
            .set_body_json(json!({"transactionId": "t", "paymentId": "p", "result": true}))
            .set_delay(Duration::from_secs(2)),
    )
    .await;

    let provider = HttpPaymentProvider::new(&server.uri()).unwrap();
    let timeout = Duration::from_millis(100);
    let error = provider.process(&call(), timeout).await.unwrap_err();

    assert_eq!(error, ProviderError::Timeout(timeout));
}

#[tokio::test]
async fn test_unreachable_provider_is_transport_error() {
    // Bind then release a port so nothing listens on it.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    drop(listener);

    let provider = HttpPaymentProvider::new(&format!("http://{address}")).unwrap();
    let error = provider
        .process(&call(), Duration::from_secs(5))
        .await
        .unwrap_err();

    assert!(matches!(error, ProviderError::Transport(_)));
}
