//! REST pipeline tests against a stub exchange.

use mbx::binance::endpoints::HttpMethod;
use mbx::core::kernel::signer;
use mbx::{BinanceClient, ClientConfig, ClientError, Params, Product};
use serde_json::json;
use std::sync::Arc;
use tokio_test::assert_ok;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> BinanceClient {
    let config = ClientConfig::read_only().rest_host(Product::Spot, server.uri());
    BinanceClient::new(config).expect("client")
}

fn signed_client_for(server: &MockServer, clock_millis: i64) -> BinanceClient {
    let config = ClientConfig::new("test-api-key".to_string(), "test-api-secret".to_string())
        .rest_host(Product::Spot, server.uri())
        .clock(Arc::new(move || clock_millis));
    BinanceClient::new(config).expect("client")
}

#[tokio::test]
async fn book_normalizes_ladder_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/depth"))
        .and(query_param("symbol", "ETHBTC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lastUpdateId": 1,
            "asks": [["1", "2"]],
            "bids": [["3", "4"]]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let book = assert_ok!(client.book(Params::new().with("symbol", "ETHBTC")).await);

    assert_eq!(book.last_update_id, 1);
    assert_eq!(book.asks.len(), 1);
    assert_eq!(book.asks[0].price, "1");
    assert_eq!(book.asks[0].quantity, "2");
    assert_eq!(book.bids[0].price, "3");
    assert_eq!(book.bids[0].quantity, "4");
}

#[tokio::test]
async fn order_without_credentials_rejects_before_any_request() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    let err = client
        .order(Params::new().with("symbol", "ETHBTC"))
        .await
        .expect_err("must reject");

    assert_eq!(
        err.to_string(),
        "You need to pass an API key and secret to make authenticated calls."
    );
    let requests = server.received_requests().await.expect("recording on");
    assert!(requests.is_empty(), "no HTTP call may be made");
}

#[tokio::test]
async fn missing_required_parameter_rejects_before_any_request() {
    let server = MockServer::start().await;
    let client = client_for(&server);

    let err = client.candles(Params::new()).await.expect_err("must reject");
    assert_eq!(err.to_string(), "Method candles requires symbol parameter.");

    let requests = server.received_requests().await.expect("recording on");
    assert!(requests.is_empty(), "no HTTP call may be made");
}

#[tokio::test]
async fn exchange_error_carries_code_and_message_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/depth"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": -1100,
            "msg": "Illegal characters found in parameter"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .book(Params::new().with("symbol", "ETH!BTC"))
        .await
        .expect_err("must reject");

    assert_eq!(err.code(), Some(-1100));
    assert_eq!(err.to_string(), "Illegal characters found in parameter");
}

#[tokio::test]
async fn non_json_failure_surfaces_as_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/depth"))
        .respond_with(
            ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .book(Params::new().with("symbol", "ETHBTC"))
        .await
        .expect_err("must reject");

    match err {
        ClientError::Transport {
            status,
            status_text,
            body,
        } => {
            assert_eq!(status, 502);
            assert_eq!(status_text, "Bad Gateway");
            assert!(body.contains("Bad Gateway"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn signed_call_appends_timestamp_signature_and_key_header() {
    let server = MockServer::start().await;
    let clock_millis = 1_499_827_319_559_i64;
    let expected_signature =
        signer::generate_signature("test-api-secret", &format!("timestamp={clock_millis}"));

    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .and(header("X-MBX-APIKEY", "test-api-key"))
        .and(query_param("timestamp", clock_millis.to_string()))
        .and(query_param("signature", expected_signature))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "makerCommission": 15, "takerCommission": 15,
            "buyerCommission": 0, "sellerCommission": 0,
            "canTrade": true, "canWithdraw": true, "canDeposit": true,
            "updateTime": 123456789,
            "balances": [{"asset": "BTC", "free": "4723846.89208129", "locked": "0.00000000"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = signed_client_for(&server, clock_millis);
    let account = client.account_info(Params::new()).await.expect("account");
    assert_eq!(account.balances[0].asset, "BTC");
}

#[tokio::test]
async fn use_server_time_is_resolved_and_never_transmitted() {
    let server = MockServer::start().await;
    let server_time = 1_508_558_157_118_i64;

    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "serverTime": server_time })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/account"))
        .and(query_param("timestamp", server_time.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "makerCommission": 0, "takerCommission": 0,
            "buyerCommission": 0, "sellerCommission": 0,
            "canTrade": true, "canWithdraw": true, "canDeposit": true,
            "updateTime": 1,
            "balances": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Local clock deliberately different from server time.
    let client = signed_client_for(&server, 42);
    client
        .account_info(Params::new().with("useServerTime", "true"))
        .await
        .expect("account");

    let requests = server.received_requests().await.expect("recording on");
    let account_request = requests
        .iter()
        .find(|r| r.url.path() == "/api/v3/account")
        .expect("account request sent");
    let query = account_request.url.query().unwrap_or_default();
    assert!(
        !query.contains("useServerTime"),
        "useServerTime must never reach the wire, got: {query}"
    );
    assert!(query.contains(&format!("timestamp={server_time}")));
}

#[tokio::test]
async fn rate_limit_headers_are_cached_per_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/depth"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-mbx-used-weight", "13")
                .insert_header("x-mbx-used-weight-1m", "13")
                .set_body_json(json!({"lastUpdateId": 1, "bids": [], "asks": []})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .book(Params::new().with("symbol", "ETHBTC"))
        .await
        .expect("book");

    let info = client
        .rate_limits()
        .for_host("127.0.0.1")
        .expect("rate limit info recorded");
    assert_eq!(info.used_weight.as_deref(), Some("13"));
    assert_eq!(info.used_weight_1m.as_deref(), Some("13"));
}

#[tokio::test]
async fn candles_default_interval_and_transform() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "ETHBTC"))
        .and(query_param("interval", "5m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([[
            1508403120000_i64, "0.05158100", "0.05158100", "0.05138100",
            "0.05138100", "234.17900000", 1508403179999_i64, "12.02366342",
            107, "82.28900000", "4.22640582", "0"
        ]])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let candles = client.candles(Params::new().with("symbol", "ETHBTC")).await?;

    assert_eq!(candles.len(), 1);
    assert_eq!(candles[0].open_time, 1_508_403_120_000);
    assert_eq!(candles[0].close, "0.05138100");
    assert_eq!(candles[0].trades, 107);
    Ok(())
}

#[tokio::test]
async fn escape_hatch_reaches_uncovered_endpoints() -> anyhow::Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/uiKlines"))
        .and(query_param("symbol", "ETHBTC"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let value = client
        .public_request(
            HttpMethod::Get,
            "/api/v3/uiKlines",
            Params::new().with("symbol", "ETHBTC"),
        )
        .await?;
    assert!(value.as_array().is_some());
    Ok(())
}
