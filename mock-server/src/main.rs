use std::time::Duration;

use mock_server::{Behavior, Route};
use tokio::net::TcpListener;
use tracing::warn;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mock_server=info"));

    if json_format {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// `MOCK_TOKEN` protects `/perfil`; `MOCK_LATENCY_MS` delays every data route.
fn behavior_from_env() -> Behavior {
    let mut behavior = Behavior::default();
    if let Ok(token) = std::env::var("MOCK_TOKEN") {
        behavior = behavior.with_token(token);
    }
    if let Ok(raw) = std::env::var("MOCK_LATENCY_MS") {
        match raw.parse::<u64>() {
            Ok(ms) => {
                let latency = Duration::from_millis(ms);
                for route in [Route::Products, Route::Categories, Route::Profile, Route::Notifications] {
                    behavior = behavior.with_latency(route, latency);
                }
            }
            Err(_) => warn!(value = %raw, "ignoring unparseable MOCK_LATENCY_MS"),
        }
    }
    behavior
}

#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    init_tracing();
    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    mock_server::run_with(listener, behavior_from_env()).await
}
