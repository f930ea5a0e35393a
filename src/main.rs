use std::{process, sync::Arc, time::Instant};

use pagegate::{
    application::{
        error::AppError,
        render::MarkdownPipeline,
        warm::{WarmOptions, discover_documents, warm_cache},
    },
    cache::{CacheGate, PageCacheConfig, ensure_writable},
    config,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Warm(args) => run_warm(settings, args).await,
    }
}

/// Validate the cache root and build the gate and pipeline shared by every command.
fn build_site(settings: &config::Settings) -> Result<(CacheGate, MarkdownPipeline), AppError> {
    if !settings.site.content_dir.is_dir() {
        return Err(AppError::from(InfraError::configuration(format!(
            "content directory `{}` does not exist",
            settings.site.content_dir.display()
        ))));
    }

    let cache_config = PageCacheConfig::from(settings);
    if let Some(cache_dir) = cache_config.cache_dir.as_ref() {
        ensure_writable(cache_dir)?;
    }
    let gate = CacheGate::new(&cache_config)?;

    info!(
        target = "pagegate::startup",
        content_dir = %settings.site.content_dir.display(),
        cache_dir = ?cache_config.cache_dir,
        cache_expire_secs = cache_config.expire.as_secs(),
        cache_enabled = gate.is_enabled(),
        "Site configured"
    );

    let pipeline = MarkdownPipeline::new(
        &settings.site.content_dir,
        &settings.site.content_ext,
        &settings.site.title,
    );
    Ok((gate, pipeline))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let (gate, pipeline) = build_site(&settings)?;
    let router = http::build_router(HttpState::new(gate, pipeline));

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "pagegate::startup",
        addr = %settings.server.addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::select! {
        joined = &mut server => return server_result(joined),
        () = shutdown_signal() => {}
    }

    info!(
        target = "pagegate::shutdown",
        grace_secs = settings.server.graceful_shutdown.as_secs(),
        "Shutdown requested; draining connections"
    );
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            warn!(
                target = "pagegate::shutdown",
                "Graceful shutdown timed out; aborting open connections"
            );
            server.abort();
            Ok(())
        }
    }
}

fn server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::from(InfraError::from(err))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(
            target = "pagegate::shutdown",
            error = %err,
            "Failed to listen for ctrl-c; waiting indefinitely"
        );
        std::future::pending::<()>().await;
    }
}

async fn run_warm(settings: config::Settings, args: config::WarmArgs) -> Result<(), AppError> {
    let (gate, pipeline) = build_site(&settings)?;
    if !gate.is_enabled() {
        return Err(AppError::validation(
            "warm requires `cache.cache_dir` (or --cache-dir) to be set",
        ));
    }

    let documents = discover_documents(&settings.site.content_dir, &settings.site.content_ext)?;
    let started = Instant::now();
    let report = warm_cache(
        Arc::new(gate),
        Arc::new(pipeline),
        documents,
        WarmOptions {
            concurrency: args.concurrency,
            force: args.force,
        },
    )
    .await?;

    info!(
        target = "pagegate::warm",
        rendered = report.rendered,
        fresh = report.fresh,
        failed = report.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Warm complete"
    );

    if report.failed > 0 {
        return Err(AppError::unexpected(format!(
            "{} document(s) could not be rendered into the cache",
            report.failed
        )));
    }
    Ok(())
}
