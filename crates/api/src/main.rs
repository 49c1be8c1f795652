use coffer_api::{routes, AppState, Settings};
use coffer_infra::workers::{EmailWorker, StreamWorker};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    coffer_observability::init();

    let settings = Settings::from_env();
    let listen_addr = settings.listen_addr.clone();

    let state = AppState::initialize(settings).await?;

    // Background work shares nothing with the request path except the
    // database and Redis.
    tokio::spawn(
        EmailWorker::new(
            state.automated_emails(),
            state.mailer.clone(),
            state.templates.clone(),
        )
        .run(),
    );
    tokio::spawn(
        StreamWorker::new(state.redis.clone(), state.transactions(), state.db.clone()).run(),
    );

    let app = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
