mod cli;
mod commands;
mod exporter;
mod infra;
mod render;

use fair_price::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
