use ingest::runtime::{boot, pump};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    boot::init_logging();
    let (aggregator, config) = boot::boot().await?;
    pump::run(aggregator, config).await
}
