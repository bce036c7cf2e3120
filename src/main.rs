use anyhow::Result;
use futures::StreamExt;
use research_mailer::{server, Config, Pipeline, ProgressEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("research_mailer=debug,graph_flow=info")),
        )
        .init();

    let config = Config::from_env()?;
    for warning in config.warnings() {
        warn!("{}", warning);
    }
    let pipeline = Pipeline::from_config(&config);

    // `research-mailer <query...>` runs once and prints progress; no
    // arguments starts the HTTP server.
    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if !query.trim().is_empty() {
        return run_once(&pipeline, &query).await;
    }

    let app = server::router(pipeline);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    info!("Research server running on http://{}", config.bind_addr());

    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_once(pipeline: &Pipeline, query: &str) -> Result<()> {
    let mut events = pipeline.run(query);
    let mut failure = None;
    while let Some(event) = events.next().await {
        println!("{}", event);
        if let ProgressEvent::Failed { stage, message } = event {
            failure = Some(anyhow::anyhow!("{} stage failed: {}", stage, message));
        }
    }
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
