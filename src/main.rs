use callbridge::application::{CallOrchestrator, OrchestratorConfig, ToolDispatcher};
use callbridge::config::{Settings, StoreBackend};
use callbridge::domain::call::CallRecordStore;
use callbridge::infrastructure::carrier::{RestCarrierClient, SignatureValidator};
use callbridge::infrastructure::operations::HttpBusinessOperations;
use callbridge::infrastructure::persistence::InMemoryCallRecordStore;
use callbridge::infrastructure::realtime::{RealtimeSessionClient, WsConnector};
use callbridge::interface::api::{build_router, init_metrics, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(feature = "postgres")]
use callbridge::infrastructure::persistence::{create_pool, run_migrations, PgCallRecordStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting callbridge");

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Configuration loaded (public base URL {}, store {:?})",
        settings.server.public_base_url, settings.persistence.backend
    );

    let store = open_store(&settings).await?;

    let connector = WsConnector::new(
        &settings.realtime.endpoint,
        &settings.realtime.model,
        settings.realtime.api_key.clone(),
    )?;
    info!("Realtime endpoint {}", connector.url());
    let sessions = RealtimeSessionClient::new(
        Arc::new(connector),
        settings.realtime_settings(),
        settings.retry_policy(),
    );

    let carrier = RestCarrierClient::new(
        settings.carrier.api_base.clone(),
        settings.carrier.account_id.clone(),
        settings.carrier.auth_token.clone(),
        Duration::from_millis(settings.carrier.request_timeout_ms),
    )?;

    let operations = HttpBusinessOperations::new(
        settings.tools.operations_base_url.clone(),
        settings.tools.operations_api_key.clone(),
        settings.tool_timeout(),
    )?;
    let dispatcher = ToolDispatcher::new(
        Arc::new(operations),
        settings.tool_timeout(),
        settings.retry_policy(),
    );

    let orchestrator = CallOrchestrator::new(
        store.clone(),
        Arc::new(sessions),
        Arc::new(carrier),
        settings.agent_directory(),
        Arc::new(dispatcher),
        OrchestratorConfig {
            media_relay_url: settings.carrier.media_relay_url.clone(),
            caller_id: settings.carrier.caller_id.clone(),
            status_callback_url: settings.status_callback_url(),
            keep_open_seconds: settings.carrier.keep_open_seconds,
            persistence_timeout: settings.persistence_write_timeout(),
            stream_start_timeout: settings.stream_start_timeout(),
        },
    );

    let signature = if settings.carrier.verify_signatures {
        Some(Arc::new(SignatureValidator::new(
            settings.carrier.auth_token.clone(),
            settings.server.public_base_url.clone(),
        )))
    } else {
        warn!("Webhook signature verification is disabled");
        None
    };

    // Initialize metrics exporter
    info!("Initializing Prometheus metrics exporter");
    let prometheus_handle = init_metrics()?;

    let app = build_router(
        AppState {
            orchestrator: Arc::new(orchestrator),
            store,
            signature,
        },
        prometheus_handle,
    );

    let listener = tokio::net::TcpListener::bind(settings.bind_address()).await?;
    info!("API server listening on {}", settings.bind_address());

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    Ok(())
}

async fn open_store(settings: &Settings) -> anyhow::Result<Arc<dyn CallRecordStore>> {
    match settings.persistence.backend {
        #[cfg(feature = "postgres")]
        StoreBackend::Postgres => {
            info!("Initializing database connection...");
            let pool = create_pool(&settings.database).await?;
            run_migrations(&pool).await?;
            info!("Call record store: PostgreSQL");
            Ok(Arc::new(PgCallRecordStore::new(pool)))
        }
        #[cfg(not(feature = "postgres"))]
        StoreBackend::Postgres => {
            anyhow::bail!("built without the postgres feature; set persistence.backend = \"memory\"")
        }
        StoreBackend::Memory => {
            warn!("Call record store: in-memory, records are lost on restart");
            Ok(Arc::new(InMemoryCallRecordStore::new()))
        }
    }
}
