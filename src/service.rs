use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use ledgermirror::api::{self, AppState};
use ledgermirror::chain::RpcLedgerClient;
use ledgermirror::config::Config;
use ledgermirror::mirror::{FjallMirror, MirrorStore};
use ledgermirror::model::Address;
use ledgermirror::observability::{Metrics, StatusPublisher};
use ledgermirror::reconcile::{EventReconciler, Supervisor};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Wire the mirror, the ledger client, the supervisor, and the read API, then
/// run until a shutdown signal arrives.
pub async fn run(config: Config) -> Result<(), AnyError> {
    let store = Arc::new(open_store(&config)?);
    let metrics = Arc::new(Metrics::new());
    let reconciler = build_reconciler(&config, store.clone(), metrics.clone())?;

    let (publisher, status) = StatusPublisher::channel();
    let supervisor = Supervisor::new(
        reconciler,
        config.supervisor_settings(),
        publisher,
        metrics.clone(),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let api_task = if config.server.enabled {
        let listener = api::bind(config.server.bind_addr).await.map_err(|e| {
            format!("Failed to bind read API on {}: {}", config.server.bind_addr, e)
        })?;
        let state = AppState::new(store.clone(), status, metrics.clone());
        let api_cancel = cancel.clone();
        Some(tokio::spawn(async move {
            let result = api::serve(listener, state, api_cancel.clone()).await;
            if let Err(e) = &result {
                // A dead read API takes the supervisor down with it
                error!(error = %e, "Read API failed, shutting down");
                api_cancel.cancel();
            }
            result
        }))
    } else {
        info!("Read API disabled");
        None
    };

    let result = supervisor.run(cancel.clone()).await;
    // A fatal supervisor error also takes the API down
    cancel.cancel();

    if let Some(task) = api_task {
        task.await??;
    }
    store.persist()?;

    let reconciler = result?;
    info!(cursor = ?reconciler.cursor(), metrics = ?metrics.snapshot(), "Shutdown complete");
    Ok(())
}

/// Full rebuild: clear the mirror and replay history up to the current head
pub async fn rebuild(config: Config) -> Result<(), AnyError> {
    let store = Arc::new(open_store(&config)?);
    let metrics = Arc::new(Metrics::new());
    let mut reconciler = build_reconciler(&config, store.clone(), metrics.clone())?;

    let report = reconciler.bootstrap(true).await?;
    store.persist()?;

    let summary = json!({
        "from_block": report.from_block,
        "to_block": report.to_block,
        "fetched": report.fetched,
        "applied": report.applied,
        "skipped": report.skipped,
        "cursor": reconciler.cursor(),
        "metrics": metrics.snapshot(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn status(config: Config, list_owners: bool) -> Result<(), AnyError> {
    let store = open_store(&config)?;
    let checkpoint = store.load_checkpoint()?;
    let stats = store.stats()?;

    let mut summary = json!({
        "contract": config.ledger.contract_address,
        "checkpoint": checkpoint,
        "stats": stats,
    });
    if list_owners {
        summary["owners"] = json!(store.owners()?);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn project(config: Config, owner: &str) -> Result<(), AnyError> {
    let owner: Address = owner.parse()?;
    let store = open_store(&config)?;

    match store.get_project(&owner)? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        None => Err(format!("No project mirrored for {owner}").into()),
    }
}

fn open_store(config: &Config) -> Result<FjallMirror, AnyError> {
    info!(path = %config.mirror.path.display(), "Opening mirror store");
    FjallMirror::open(&config.mirror.path)
        .map_err(|e| format!("Failed to open mirror store: {}", e).into())
}

fn build_reconciler(
    config: &Config,
    store: Arc<FjallMirror>,
    metrics: Arc<Metrics>,
) -> Result<EventReconciler, AnyError> {
    let rpc = config.rpc_settings()?;
    info!(url = %rpc.url, contract = %rpc.contract, "Connecting ledger client");
    let client = RpcLedgerClient::new(rpc)?;

    Ok(EventReconciler::new(
        Arc::new(client),
        store,
        config.reconciler_settings()?,
        metrics,
    ))
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => return,
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
