//! # Gifting Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the store adapter
//! - Create the gateway client, notifier and settlement service
//! - Start the HTTP server, or issue an API key

mod config;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace as sdktrace,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gifting_hex::outbound::{
    HttpPaymentGateway, LogNotifier, NotificationDispatcher, wait_for_drain,
};
use gifting_hex::{GiftingService, inbound::HttpServer};
use gifting_repo::{MEMORY_URL_SCHEME, build_repo};
use gifting_types::{LedgerStore, NotificationDispatch, OwnerId};

const SERVICE_NAME: &str = "gifting-service";
const NOTIFY_QUEUE_CAPACITY: usize = 1024;
const NOTIFY_DRAIN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "gifting-server")]
#[command(version, about = "Credit ledger and settlement server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Issue an API key for an owner and print it once
    IssueKey {
        /// Owner to issue the key for; a new owner id when omitted
        #[arg(long)]
        owner: Option<OwnerId>,
    },
}

/// Exporters that must be flushed on exit.
struct Telemetry {
    tracer_provider: Option<sdktrace::SdkTracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
}

impl Telemetry {
    fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Failed to flush traces");
            }
        }
        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Failed to flush metrics");
            }
        }
    }
}

/// Installs the subscriber. OTLP export is only wired when an endpoint is set.
fn init_telemetry() -> anyhow::Result<Telemetry> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .ok()
        .filter(|e| !e.is_empty());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let mut telemetry = Telemetry {
        tracer_provider: None,
        meter_provider: None,
    };

    let otel_layer = match &endpoint {
        Some(endpoint) => {
            global::set_text_map_propagator(TraceContextPropagator::new());

            // gRPC exporters with batch/periodic export (non-blocking)
            let span_exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()?;
            let tracer_provider = sdktrace::SdkTracerProvider::builder()
                .with_batch_exporter(span_exporter)
                .build();
            global::set_tracer_provider(tracer_provider.clone());

            let metric_exporter = opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()?;
            let meter_provider = SdkMeterProvider::builder()
                .with_reader(PeriodicReader::builder(metric_exporter).build())
                .build();
            global::set_meter_provider(meter_provider.clone());

            use opentelemetry::trace::TracerProvider as _;
            let tracer = tracer_provider.tracer(SERVICE_NAME);
            telemetry.tracer_provider = Some(tracer_provider);
            telemetry.meter_provider = Some(meter_provider);

            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gifting_app=debug,gifting_hex=debug".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .with(otel_layer)
        .init();

    if let Some(endpoint) = endpoint {
        tracing::info!(%endpoint, "Exporting traces and metrics over OTLP");
    }

    Ok(telemetry)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let telemetry = init_telemetry()?;

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::IssueKey { owner } => issue_key(owner).await,
    };

    telemetry.shutdown();
    result
}

async fn serve() -> anyhow::Result<()> {
    let config = config::Config::from_env()?;

    tracing::info!("Starting gifting server on port {}", config.port);

    // Build store (handles connection and migration)
    let repo = build_repo(&config.database_url).await?;

    if config.database_url.starts_with(MEMORY_URL_SCHEME) {
        let owner = OwnerId::new();
        let key = repo.create_api_key(owner).await?;
        tracing::warn!(owner_id = %owner, api_key = %key, "Issued development API key");
    }

    let gateway = Arc::new(HttpPaymentGateway::new(config.gateway.clone())?);

    let (notifier, notify_worker): (Arc<dyn NotificationDispatch>, _) = match config.notify {
        Some(notify) => {
            tracing::info!(url = %notify.url, "Delivering notifications over HTTP");
            let (dispatcher, worker) =
                NotificationDispatcher::spawn(NOTIFY_QUEUE_CAPACITY, notify.url, notify.secret);
            (Arc::new(dispatcher), Some(worker))
        }
        None => {
            tracing::info!("NOTIFY_URL unset; notifications are logged only");
            (Arc::new(LogNotifier), None)
        }
    };

    let service = GiftingService::new(repo, gateway, notifier, config.service);

    let server = HttpServer::with_rate_limit(service, config.rate_limit_per_minute);
    let addr = format!("0.0.0.0:{}", config.port);

    // The server owns the last dispatcher; once it returns the queue closes.
    let result = server.run(&addr).await;

    if let Some(worker) = notify_worker {
        wait_for_drain(worker, NOTIFY_DRAIN_GRACE).await;
    }

    result
}

async fn issue_key(owner: Option<OwnerId>) -> anyhow::Result<()> {
    let database_url = config::Config::database_url_from_env()?;
    if database_url.starts_with(MEMORY_URL_SCHEME) {
        anyhow::bail!("issuing a key against the in-memory store has no lasting effect");
    }

    let repo = build_repo(&database_url).await?;
    let owner = owner.unwrap_or_default();
    let key = repo.create_api_key(owner).await?;

    tracing::info!(owner_id = %owner, "Issued API key");
    println!("owner_id: {owner}");
    println!("api_key:  {key}");
    println!("Store the key now; only its hash is kept.");

    Ok(())
}
