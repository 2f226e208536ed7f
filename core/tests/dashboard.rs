//! Dashboard coordination and throttling end-to-end over reqwest.
//!
//! Each test starts its own mock server with scripted latencies, so the
//! assertions use generous wall-clock bounds.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use ecomarket_core::{
    standard_descriptors, ApiError, ClientConfig, Coordinator, EcoMarketApi, NewProduct, Panel,
    TaskStatus, ThrottledClient,
};
use mock_server::{Behavior, Route};

async fn start_server(behavior: Behavior) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(mock_server::run_with(listener, behavior));
    addr
}

fn config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        base_url: format!("http://{addr}"),
        ..Default::default()
    }
}

fn latencies(products: u64, categories: u64, profile: u64, notifications: u64) -> Behavior {
    Behavior::default()
        .with_latency(Route::Products, Duration::from_millis(products))
        .with_latency(Route::Categories, Duration::from_millis(categories))
        .with_latency(Route::Profile, Duration::from_millis(profile))
        .with_latency(Route::Notifications, Duration::from_millis(notifications))
}

#[tokio::test(flavor = "multi_thread")]
async fn dashboard_loads_in_parallel() {
    let addr = start_server(latencies(400, 300, 200, 500)).await;
    let api = EcoMarketApi::from_config(&config(addr)).unwrap();

    let start = Instant::now();
    let result = Coordinator::new()
        .wait_all(standard_descriptors(&api))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.data.len(), 4);
    // Slowest is 500 ms; sequential would be 1.4 s.
    assert!(elapsed >= Duration::from_millis(500), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(1_200), "{elapsed:?}");
    let products = result.get("productos").and_then(Panel::as_products).unwrap();
    assert_eq!(products.len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn expired_token_cancels_the_dashboard() {
    let addr = start_server(latencies(1_500, 1_500, 100, 1_500).with_token("secreto")).await;
    let api = EcoMarketApi::from_config(&ClientConfig {
        auth_token: Some("caducado".to_string()),
        ..config(addr)
    })
    .unwrap();

    let start = Instant::now();
    let result = Coordinator::new()
        .cancel_on_unauthorized(standard_descriptors(&api))
        .await
        .unwrap();

    assert!(start.elapsed() < Duration::from_millis(1_000), "{:?}", start.elapsed());
    assert!(result.cancelled_by_auth);
    assert_eq!(result.status("perfil"), Some(TaskStatus::Failed));
    for name in ["productos", "categorias", "notificaciones"] {
        assert_eq!(result.status(name), Some(TaskStatus::Cancelled), "{name}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn critical_panels_are_released_early() {
    let addr = start_server(latencies(200, 50, 100, 1_200)).await;
    let api = EcoMarketApi::from_config(&config(addr)).unwrap();

    let start = Instant::now();
    let partial = Coordinator::new()
        .prioritized(standard_descriptors(&api))
        .await
        .unwrap();
    assert!(start.elapsed() < Duration::from_millis(1_000), "{:?}", start.elapsed());

    let now = partial.current();
    assert!(now.critical_complete);
    assert!(now.get("productos").is_some());
    assert!(now.get("perfil").is_some());
    assert_eq!(now.status("notificaciones"), Some(TaskStatus::Pending));

    let done = partial.finish().await.unwrap();
    assert!(done.get("notificaciones").is_some());
    assert!(done.is_settled());
}

#[tokio::test(flavor = "multi_thread")]
async fn per_call_timeout_over_real_http() {
    let addr = start_server(latencies(1_000, 0, 0, 0)).await;
    let api = EcoMarketApi::from_config(&config(addr)).unwrap();

    let err = api
        .get_product(1, Some(Duration::from_millis(200)))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Timeout { .. }), "{err:?}");

    // The server is still healthy for calls within their deadline.
    assert!(api.list_categories(None).await.is_ok());
}

#[tokio::test(flavor = "multi_thread")]
async fn throttled_bulk_create() {
    let behavior = Behavior::default().with_latency(Route::Products, Duration::from_millis(50));
    let addr = start_server(behavior).await;
    let client = ThrottledClient::from_config(&ClientConfig {
        max_concurrent: 3,
        max_per_second: 20.0,
        ..config(addr)
    })
    .unwrap();

    let products: Vec<NewProduct> = (0..12)
        .map(|i| NewProduct {
            nombre: format!("Conserva {i}"),
            precio: 12.0 + i as f64,
            categoria: "conservas".to_string(),
            descripcion: None,
            disponible: Some(true),
            stock: Some(5),
        })
        .collect();
    let outcome = client.create_many(&products).await;

    assert_eq!(outcome.created.len(), 12, "{:?}", outcome.failures);
    assert!(outcome.metrics.peak_in_flight <= 3);
    assert_eq!(outcome.metrics.in_flight, 0);
    assert_eq!(outcome.metrics.successful, 12);
    assert!(outcome.throughput() > 0.0);

    // A duplicate name is reported, not retried.
    let again = client.create_many(&products[..1]).await;
    assert!(matches!(again.failures[..], [(0, ApiError::HttpError { status: 409, .. })]));
}
