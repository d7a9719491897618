use rand::Rng;
use rand::distr::Alphanumeric;
use roulette::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), RouletteError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let token = match config.admin_token.clone() {
        Some(token) => token,
        None => {
            let token = generate_token();
            tracing::info!(%token, "no ROULETTE_ADMIN_TOKEN set, generated one");
            token
        }
    };

    let server = RouletteServerBuilder::new()
        .config(config)
        .build(StaticTokenAuth::new(token))
        .await?;
    server.run().await
}

fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}
