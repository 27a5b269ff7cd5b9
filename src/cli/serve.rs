//! Serve command implementation

use crate::cli::ServeArgs;
use crate::config::{ConfigError, RelayConfig};
use crate::login::login;
use crate::middleware::{metrics, MetricsLayer};
use axum::http::{header, request, HeaderMap};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

/// Load configuration with CLI overrides
pub fn load_config_with_overrides(
    args: &ServeArgs,
) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let mut config = if args.config.exists() {
        RelayConfig::load(Some(&args.config))?
    } else {
        tracing::debug!("Config file not found, using defaults");
        RelayConfig::default()
    };

    config = config.with_env_overrides();

    // CLI flags win over env and file
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref host) = args.host {
        config.server.host = host.clone();
    }
    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }
    if let Some(ref key) = args.api_key {
        config.api_key = Some(key.clone());
    }

    Ok(config)
}

fn header_value(req: &request::Parts, name: &str) -> Option<String> {
    req.headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn index() -> Json<Value> {
    Json(json!({ "service": "har-relay", "status": "ok" }))
}

async fn echo(headers: HeaderMap, body: String) -> ([(header::HeaderName, String); 1], String) {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("text/plain")
        .to_string();
    ([(header::CONTENT_TYPE, content_type)], body)
}

/// Build the demo router and the metrics layer wrapped around it.
///
/// Requests are grouped by the `x-user` header; requests without one are
/// not reported. `GET /docs` redirects through the login flow using the same
/// header as the signed-in user.
pub fn build_app(config: &RelayConfig) -> Result<(Router, MetricsLayer), ConfigError> {
    let api_key = config.api_key.clone().unwrap_or_default();

    let layer = metrics(api_key.clone())
        .group_by(|req| header_value(req, "x-user"))
        .telemetry(config.telemetry.clone())
        .build()?;

    let docs = login(api_key)
        .resolve_user(|req| header_value(req, "x-user").map(|name| json!({ "name": name })))
        .companion(config.companion.clone())
        .build()?;

    let app = Router::new()
        .route("/", get(index))
        .route("/echo", post(echo))
        .route("/docs", docs.into_route())
        .layer(layer.clone())
        .layer(TraceLayer::new_for_http());

    Ok((app, layer))
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        }
    }
}

/// Main serve command handler
pub async fn run_serve(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load and merge configuration
    let config = load_config_with_overrides(&args)?;
    config.validate()?;

    // 2. Initialize tracing
    crate::logging::init_tracing(&config.logging)?;

    tracing::info!("Starting har-relay demo server");
    tracing::debug!(?config, "Loaded configuration");

    // 3. Build app
    let (app, layer) = build_app(&config)?;

    // 4. Bind and serve
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        buffer_length = layer.buffer_length(),
        "har-relay listening"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // 5. Send what is still buffered
    match layer.shutdown().await {
        Ok(0) => {}
        Ok(n) => tracing::info!(records = n, "Flushed buffered records"),
        Err(e) => tracing::warn!(error = %e, "Failed to flush buffered records"),
    }

    tracing::info!("har-relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::extract::Request;
    use axum::http::StatusCode;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;
    use tower::Service;

    fn args(config: PathBuf) -> ServeArgs {
        ServeArgs {
            config,
            port: None,
            host: None,
            log_level: None,
            api_key: None,
        }
    }

    fn config_with_key() -> RelayConfig {
        RelayConfig {
            api_key: Some("demo-key".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_serve_config_loading() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[telemetry]\ntimeout_seconds = 3").unwrap();

        let config = load_config_with_overrides(&args(temp.path().to_path_buf())).unwrap();
        assert_eq!(config.telemetry.timeout_seconds, 3);
    }

    #[test]
    fn test_serve_cli_overrides_config() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[server]\nport = 8080").unwrap();

        let mut args = args(temp.path().to_path_buf());
        args.port = Some(9000);
        args.api_key = Some("cli-key".to_string());

        let config = load_config_with_overrides(&args).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.api_key.as_deref(), Some("cli-key"));
    }

    #[test]
    fn test_serve_works_without_config_file() {
        let config = load_config_with_overrides(&args(PathBuf::from("nonexistent.toml"))).unwrap();
        assert_eq!(config.telemetry.timeout_seconds, 10);
    }

    #[test]
    fn test_build_app_requires_api_key() {
        let err = build_app(&RelayConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_echo_returns_body() {
        let (mut app, layer) = build_app(&config_with_key()).unwrap();

        let response = app
            .call(
                Request::post("/echo")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"a":1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), br#"{"a":1}"#);

        // No x-user header, so nothing is buffered.
        assert_eq!(layer.buffered(), 0);
    }

    #[tokio::test]
    async fn test_docs_without_user_redirects_to_login() {
        let (mut app, _layer) = build_app(&config_with_key()).unwrap();

        let response = app
            .call(Request::get("/docs").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login?redirect=%2Fdocs");
    }
}
