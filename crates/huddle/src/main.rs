use huddle::{HuddleError, HuddleServer, ServerConfig, init_tracing};

#[tokio::main]
async fn main() -> Result<(), HuddleError> {
    let config = ServerConfig::load()?;
    init_tracing(&config);

    let server = HuddleServer::builder().config(config).build().await?;
    server
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
            }
        })
        .await
}
