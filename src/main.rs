use std::net::Ipv4Addr;
use std::ops::RangeInclusive;
use std::sync::Arc;

use studyguide::{api, config, logging, processing::StudyGuideService};
use tokio::net::TcpListener;

const FALLBACK_PORTS: RangeInclusive<u16> = 4100..=4199;

#[tokio::main]
async fn main() {
    logging::init_tracing();
    config::init_config();
    let config = config::get_config();

    let service =
        StudyGuideService::from_config(config).expect("Failed to initialize study guide service");
    let app = api::create_router(Arc::new(service), config.max_upload_bytes);

    let (listener, port) = bind_listener(config.server_port)
        .await
        .expect("Failed to bind listener");
    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        reduce_model = %config.reduce_model,
        "Listening on http://0.0.0.0:{}",
        port
    );
    axum::serve(listener, app).await.expect("HTTP server failed");
}

/// Bind the configured port, or the first free port in [`FALLBACK_PORTS`].
async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    if let Some(port) = port {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
        return Ok((listener, port));
    }

    for port in FALLBACK_PORTS {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => return Ok((listener, port)),
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        format!(
            "No available port found in range {}-{}",
            FALLBACK_PORTS.start(),
            FALLBACK_PORTS.end()
        ),
    ))
}
