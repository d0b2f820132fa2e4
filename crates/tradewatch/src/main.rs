//! Tradewatch entry point.

mod cli;

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; environment variables win.
    let _ = dotenvy::dotenv();
    cli::run().await
}
