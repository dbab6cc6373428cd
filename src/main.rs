use std::{net::SocketAddr, process, str::FromStr, sync::Arc, time::Duration};

use folio::{
    application::error::AppError,
    application::repos::{ContentRepo, ContentWriteRepo},
    cache::{CacheConfig, MutationKind},
    config,
    domain::types::Resource,
    infra::{
        cache::CacheServices,
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AppState},
        memory::MemoryRepositories,
        telemetry,
    },
};
use tokio::{sync::watch, try_join};
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
        config::Command::Migrate(_) => run_migrate(settings).await,
        config::Command::Invalidate(args) => run_invalidate(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache = CacheServices::from_config(CacheConfig::from(&settings.cache))
        .await
        .map_err(AppError::from)?;

    let state = match settings.database.url.as_deref() {
        Some(url) => {
            let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
                .await
                .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
            PostgresRepositories::run_migrations(&pool)
                .await
                .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
            let repos = Arc::new(PostgresRepositories::new(pool));
            AppState::new(
                repos.clone() as Arc<dyn ContentRepo>,
                repos.clone() as Arc<dyn ContentWriteRepo>,
                cache,
                settings.site.clone(),
                Some(repos),
            )
        }
        None => {
            warn!("database url is not configured; content is kept in memory");
            let repos = Arc::new(MemoryRepositories::new());
            AppState::new(
                repos.clone() as Arc<dyn ContentRepo>,
                repos as Arc<dyn ContentWriteRepo>,
                cache,
                settings.site.clone(),
                None,
            )
        }
    };

    serve_http(&settings, state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    info!(target = "folio::migrate", "Migrations applied");
    Ok(())
}

async fn run_invalidate(
    settings: config::Settings,
    args: config::InvalidateArgs,
) -> Result<(), AppError> {
    let resource = Resource::from_str(&args.resource)?;
    let config = CacheConfig::from(&settings.cache);
    if config.redis_url.is_none() {
        warn!(
            target = "folio::invalidate",
            "no redis url configured; only this process would observe the bump"
        );
    }

    let cache = CacheServices::from_config(config)
        .await
        .map_err(AppError::from)?;
    let applied = cache
        .trigger
        .resource_changed(resource, MutationKind::Manual)
        .await;

    if applied.is_empty() {
        warn!(
            target = "folio::invalidate",
            resource = resource.as_str(),
            "no version was bumped"
        );
    }
    for (bumped, version) in applied {
        info!(
            target = "folio::invalidate",
            resource = bumped.as_str(),
            version,
            "Version bumped"
        );
    }
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let public_router = http::build_router(state.clone());
    let admin_router = http::build_admin_router(state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let public_server = axum::serve(
        public_listener,
        public_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));
    let admin_server = axum::serve(
        admin_listener,
        admin_router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

    let servers = async {
        try_join!(public_server, admin_server)
            .map(|_| ())
            .map_err(|err| AppError::unexpected(format!("server error: {err}")))
    };

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = servers => result,
        () = drain_deadline(shutdown_tx, grace) => {
            warn!(grace_secs = grace.as_secs(), "Graceful shutdown timed out");
            Ok(())
        }
    }
}

/// Resolves once a shutdown signal arrived and the grace period elapsed.
async fn drain_deadline(shutdown_tx: watch::Sender<bool>, grace: Duration) {
    shutdown_signal().await;
    info!("Shutdown signal received; draining connections");
    let _ = shutdown_tx.send(true);
    tokio::time::sleep(grace).await;
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
