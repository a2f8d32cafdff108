use std::{process, sync::Arc, time::Duration};

use mindprint::{
    application::{
        entitlements::EntitlementResolver,
        error::AppError,
        export::ExportService,
        gate::RenderGateService,
        repos::{AccountsRepo, DocumentsRepo},
        ticket::TicketCodec,
        usage::UsageMeter,
    },
    config,
    infra::{
        db::PostgresRepositories,
        engine::ChromiumEngine,
        error::InfraError,
        http::{self, RouterState},
        identity::HttpIdentityVerifier,
        telemetry,
    },
};
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
    let (_cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let repositories = init_repositories(&settings).await?;
    let state = build_router_state(repositories, &settings);

    serve_http(&settings, state).await
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_router_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> RouterState {
    let accounts: Arc<dyn AccountsRepo> = repositories.clone();
    let documents: Arc<dyn DocumentsRepo> = repositories;

    let codec = TicketCodec::new(settings.signing.secret.clone());
    let entitlements = EntitlementResolver::new(settings.export.admin_emails.clone());
    let usage = UsageMeter::new(accounts.clone(), settings.export.timezone);
    let identity = Arc::new(HttpIdentityVerifier::new(
        settings.identity.verify_url.clone(),
    ));
    let engine = Arc::new(ChromiumEngine::new(&settings.engine));

    let export = Arc::new(ExportService::new(
        identity,
        accounts,
        documents.clone(),
        entitlements,
        usage,
        codec.clone(),
        engine,
        settings.server.public_base_url.clone(),
    ));
    let gate = Arc::new(RenderGateService::new(codec, documents));

    RouterState {
        export,
        gate,
        watermark_text: settings.export.watermark_text.clone(),
    }
}

async fn serve_http(settings: &config::Settings, state: RouterState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "mindprint::server",
        addr = %settings.server.addr,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal(settings.server.graceful_shutdown))
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal(grace: Duration) {
    if tokio::signal::ctrl_c().await.is_err() {
        return;
    }
    info!(
        target = "mindprint::server",
        grace_seconds = grace.as_secs(),
        "Shutdown signal received, draining connections"
    );

    // In-flight renders get the grace period to finish; after that the
    // process exits regardless.
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        warn!(
            target = "mindprint::server",
            "Graceful shutdown period elapsed, exiting"
        );
        process::exit(1);
    });
}
