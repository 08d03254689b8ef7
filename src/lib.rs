pub mod api;
pub mod chat;
pub mod cli;
pub mod console;
pub mod feed;
pub mod models;
pub mod selection;

use cli::Args;
use log::info;
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("API Base: {}", args.api_base);
    info!("WS Base: {}", args.ws_base.as_deref().unwrap_or("(derived from API base)"));
    info!("Mode: {}", args.mode);
    info!("Selection Path: {}", args.selection_path);
    info!("Failure Policy: {}", args.failure_policy);
    info!("-------------------------");

    console::run(args).await
}
