use gridgate::error::AppError;
use gridgate::launcher::{self, CONFIG_ENV, DEFAULT_CONFIG};
use std::env;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config_path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    launcher::launch(&config_path, None).await
}
