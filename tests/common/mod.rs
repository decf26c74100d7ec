#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde_json::Value;
use tokio::net::TcpListener;

use timeclock_api::config::SecurityConfig;
use timeclock_api::database;
use timeclock_api::middleware::AuthGate;
use timeclock_api::server;
use timeclock_api::store::{MemoryStore, SharedStore};
use timeclock_api::AppState;

pub const TOKEN: &str = "test-kiosk-token";

pub struct Options {
    pub api_token: Option<&'static str>,
    pub seed_samples: bool,
    pub sync_max_batch: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            api_token: Some(TOKEN),
            seed_samples: true,
            sync_max_batch: 500,
        }
    }
}

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    pub client: reqwest::Client,
}

/// Seeded in-memory server guarded by [`TOKEN`].
pub async fn spawn() -> Result<TestServer> {
    spawn_with(Options::default()).await
}

/// In-memory server with the given options.
pub async fn spawn_with(options: Options) -> Result<TestServer> {
    spawn_on(Arc::new(MemoryStore::new()), options).await
}

/// Starts the router in-process on a free port over `store`. The server
/// lives until the test's runtime shuts down.
pub async fn spawn_on(store: SharedStore, options: Options) -> Result<TestServer> {
    database::bootstrap(store.as_ref(), options.seed_samples).await?;

    let state = AppState::new(store, AuthGate::new(options.api_token), options.sync_max_batch);
    let security = SecurityConfig {
        api_token: options.api_token.map(str::to_string),
        cors_origins: Vec::new(),
    };
    let app = server::router(state, &security);

    // Pick an unused port for isolation
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .with_context(|| format!("failed to bind test port {port}"))?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(TestServer {
        port,
        base_url: format!("http://127.0.0.1:{}", port),
        client: reqwest::Client::new(),
    })
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(TOKEN)
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(TOKEN)
    }

    pub fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path)).bearer_auth(TOKEN)
    }

    pub fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path)).bearer_auth(TOKEN)
    }
}

/// Asserts the status and returns the JSON body.
pub async fn expect_json(res: Response, status: StatusCode) -> Result<Value> {
    let actual = res.status();
    let body = res.json::<Value>().await.context("response body is not JSON")?;
    assert_eq!(actual, status, "unexpected status, body: {}", body);
    Ok(body)
}

/// Asserts an error response and returns its `code`.
pub async fn expect_error(res: Response, status: StatusCode) -> Result<String> {
    let body = expect_json(res, status).await?;
    assert_eq!(body["error"], true, "not an error body: {}", body);
    Ok(body["code"].as_str().unwrap_or_default().to_string())
}
