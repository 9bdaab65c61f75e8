// SPDX-License-Identifier: PMPL-1.0-or-later
//! Mock coordinator binary.
//!
//! Serves the in-memory ArangoDB stand-in on a fixed port for driving the
//! driver by hand.

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port = std::env::var("MOCK_ARANGO_PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8529);

    tracing::info!("Starting mock coordinator on 127.0.0.1:{port}");

    mock_arango::serve(port).await?;

    Ok(())
}
