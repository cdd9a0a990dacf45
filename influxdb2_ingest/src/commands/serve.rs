//! Entrypoint for the write ingestion server

use std::{convert::Infallible, str::FromStr, sync::Arc, time::Duration};

use hyper::{
    server::conn::AddrStream,
    service::{make_service_fn, service_fn},
};
use influxdb2_tenant::{TenantResolver, mem::MemDirectory};
use influxdb2_write::{WriteService, http::HttpDelegate, storage::BlockStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{logging::LoggingConfig, socket_addr::SocketAddr};

/// The default bind address for the HTTP API.
pub(crate) const DEFAULT_HTTP_BIND_ADDR: &str = "127.0.0.1:8086";

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("Failed to bind address: {0}")]
    BindAddress(#[source] hyper::Error),

    #[error("Server error: {0}")]
    Server(#[source] hyper::Error),
}

pub(crate) type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub(crate) enum DbrpParseError {
    #[error("expected <database>/<retention policy>, got {0:?}")]
    Format(String),

    #[error("database name must not be empty")]
    EmptyDatabase,
}

/// A legacy `<database>/<retention policy>` pair mapped onto the configured
/// bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DbrpSpec {
    pub(crate) database: String,
    pub(crate) retention_policy: String,
}

impl FromStr for DbrpSpec {
    type Err = DbrpParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (database, retention_policy) = s
            .split_once('/')
            .ok_or_else(|| DbrpParseError::Format(s.to_string()))?;
        if database.is_empty() {
            return Err(DbrpParseError::EmptyDatabase);
        }
        Ok(Self {
            database: database.to_string(),
            retention_policy: retention_policy.to_string(),
        })
    }
}

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    /// logging options
    #[clap(flatten)]
    pub(crate) logging_config: LoggingConfig,

    /// The address on which to serve HTTP API requests
    #[clap(
        long = "http-bind",
        env = "INFLUXDB2_INGEST_HTTP_BIND_ADDR",
        default_value = DEFAULT_HTTP_BIND_ADDR,
        action,
    )]
    pub(crate) http_bind_address: SocketAddr,

    /// Maximum size of HTTP requests, before and after decompression.
    #[clap(
        long = "max-http-request-size",
        env = "INFLUXDB2_INGEST_MAX_HTTP_REQUEST_SIZE",
        default_value = "10485760", // 10 MiB
        action,
    )]
    pub(crate) max_http_request_size: usize,

    /// Deadline for a single write, covering tenant lookups and storage.
    #[clap(
        long = "write-timeout",
        env = "INFLUXDB2_INGEST_WRITE_TIMEOUT",
        default_value = "10s",
        value_parser = humantime::parse_duration,
    )]
    pub(crate) write_timeout: Duration,

    /// Name of the organization created at startup.
    #[clap(long = "org", env = "INFLUXDB2_INGEST_ORG", default_value = "default", action)]
    pub(crate) org: String,

    /// Name of the bucket created at startup within `--org`.
    #[clap(
        long = "bucket",
        env = "INFLUXDB2_INGEST_BUCKET",
        default_value = "default",
        action
    )]
    pub(crate) bucket: String,

    /// Legacy `<database>/<retention policy>` pairs mapped onto `--bucket`.
    ///
    /// May be repeated, or given as a comma separated list.
    #[clap(
        long = "dbrp",
        env = "INFLUXDB2_INGEST_DBRP",
        value_delimiter = ',',
        action = clap::ArgAction::Append,
    )]
    pub(crate) dbrps: Vec<DbrpSpec>,
}

pub(crate) async fn command(config: Config) -> Result<()> {
    let directory = Arc::new(MemDirectory::default());
    let org = directory.create_organization(&config.org);
    let bucket = directory.create_bucket(org.id, &config.bucket);
    for dbrp in &config.dbrps {
        directory.create_dbrp_mapping(
            &dbrp.database,
            &dbrp.retention_policy,
            org.id,
            bucket.id,
        );
    }
    info!(
        org = %org.name,
        org_id = %org.id,
        bucket = %bucket.name,
        bucket_id = %bucket.id,
        dbrp_mappings = config.dbrps.len(),
        "seeded tenant directory"
    );

    let resolver = TenantResolver::new(
        Arc::clone(&directory) as _,
        Arc::clone(&directory) as _,
        directory as _,
    );
    let service = WriteService::new(
        resolver,
        Arc::new(BlockStore::new()),
        config.max_http_request_size,
    );

    let shutdown = CancellationToken::new();
    let delegate = Arc::new(
        HttpDelegate::new(config.max_http_request_size, config.write_timeout, service)
            .with_shutdown(shutdown.child_token()),
    );

    let server = hyper::Server::try_bind(&config.http_bind_address)
        .map_err(Error::BindAddress)?
        .serve(make_service_fn(|_conn: &AddrStream| {
            let delegate = Arc::clone(&delegate);
            let service = service_fn(move |req| {
                let delegate = Arc::clone(&delegate);
                async move { Ok::<_, Infallible>(delegate.handle(req).await) }
            });
            futures::future::ready(Ok::<_, Infallible>(service))
        }));
    info!(address = %server.local_addr(), "serving write API");

    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        signal_shutdown.cancel();
    });

    server
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(Error::Server)?;

    info!("server shutdown complete");
    Ok(())
}

/// Wait for a `SIGTERM` or `SIGINT` to stop the process on UNIX systems
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut term, mut int) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "failed to register signal handler, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = int.recv() => info!("Received SIGINT"),
    }
}

/// Wait for a `ctrl+c` to stop the process on Windows systems
#[cfg(windows)]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received SIGINT");
}
