pub mod api;
pub mod article;
pub mod config;
pub mod error;
pub mod listing;
pub mod page;
pub mod prismic;
pub mod richtext;
pub mod state;

use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

use config::Config;
use prismic::PrismicClient;
use state::AppState;

pub async fn run() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_env_filter(EnvFilter::from_env("SPACETRAVELLING_LOG"))
        .init();

    let config = Config::from_env().expect("Failed to load config");
    let client = PrismicClient::new(&config.prismic).expect("Failed to build content service client");
    let app = AppState::new(client, config).expect("Failed to build app state");

    api::run_server(app).await
}
