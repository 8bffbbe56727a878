use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use edgepurge::{
    application::error::AppError,
    config::{self, PurgeCommand},
    domain::entities::DocumentId,
    infra::{
        error::InfraError,
        http::{self, AppState},
        snapshot::SnapshotContentModel,
        telemetry,
    },
    purge::{ChangeEvent, CycleReport, PurgeConfig, PurgeEngine, PurgeTrigger},
};
use futures::channel::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use url::Url;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(config::ServeArgs::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;
    for warning in &settings.warnings {
        warn!(warning = %warning, "configuration warning");
    }

    let trigger = build_trigger(&settings)?;

    match command {
        config::Command::Serve(_) => run_serve(&settings, trigger).await,
        config::Command::Purge(args) => run_purge(trigger, args.command).await,
        config::Command::FlushObjectCache(_) => {
            let report = trigger.trigger_object_cache_flush().await?;
            print_report(&report)
        }
    }
}

fn build_trigger(settings: &config::Settings) -> Result<PurgeTrigger, AppError> {
    let content = match (&settings.content.snapshot, &settings.purge.home_url) {
        (Some(path), _) => SnapshotContentModel::load(path)?,
        (None, Some(home_url)) => SnapshotContentModel::home_only(home_url.clone()),
        (None, None) => {
            return Err(AppError::validation(
                "either content.snapshot or purge.home_url must be configured",
            ));
        }
    };

    let purge_config = Arc::new(PurgeConfig::from(&settings.purge));
    info!(
        cache_hosts = ?purge_config.cache_hosts,
        scheme = %purge_config.scheme(),
        max_urls_before_all = purge_config.max_urls_before_all,
        mirror_domains = purge_config.mirror_domains.len(),
        "Purge engine configured"
    );

    let engine = PurgeEngine::new(purge_config, Arc::new(content))?;
    Ok(PurgeTrigger::new(Arc::new(engine)))
}

async fn run_purge(trigger: PurgeTrigger, command: PurgeCommand) -> Result<(), AppError> {
    let report = match command {
        PurgeCommand::All(_) => trigger.trigger_full_purge().await?,
        PurgeCommand::Url(args) => {
            let url = args.url.trim();
            let parsed = Url::parse(url)
                .map_err(|err| AppError::validation(format!("invalid url `{url}`: {err}")))?;
            if parsed.host_str().is_none_or(str::is_empty) {
                return Err(AppError::validation(format!("url `{url}` has no host")));
            }
            trigger.trigger_url_purge(url).await?
        }
        PurgeCommand::Documents(args) => {
            let events = args
                .ids
                .iter()
                .map(|id| ChangeEvent::for_document(args.event, DocumentId(*id)))
                .collect();
            trigger.events(events).await?
        }
    };

    print_report(&report)
}

fn print_report(report: &CycleReport) -> Result<(), AppError> {
    let summary = serde_json::to_string_pretty(&report.summary())
        .map_err(|err| AppError::unexpected(format!("failed to encode summary: {err}")))?;
    println!("{summary}");

    let failed = report.failed();
    if failed > 0 {
        return Err(AppError::unexpected(format!(
            "{failed} of {} purge requests failed",
            report.records.len()
        )));
    }
    Ok(())
}

async fn run_serve(settings: &config::Settings, trigger: PurgeTrigger) -> Result<(), AppError> {
    let router = http::build_router(AppState { trigger });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| InfraError::bind(settings.server.addr, err))?;
    info!(addr = %settings.server.addr, "Trigger service listening");

    let (signal_tx, signal_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
        let _ = signal_tx.send(());
    };

    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .into_future();
    let deadline = shutdown_deadline(signal_rx, settings.server.graceful_shutdown);

    tokio::select! {
        result = server => {
            result.map_err(InfraError::Serve)?;
        }
        () = deadline => {
            warn!("Graceful shutdown timed out; dropping open connections");
        }
    }

    Ok(())
}

async fn shutdown_deadline(signal: oneshot::Receiver<()>, grace: Duration) {
    match signal.await {
        Ok(()) => tokio::time::sleep(grace).await,
        Err(_) => std::future::pending::<()>().await,
    }
}
