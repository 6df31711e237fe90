use ilk_accrual::datasource::EthRpcSource;
use ilk_accrual::{config::Config, db::init_db, AppError, ChainSource, Pipeline, Repository};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::from_env()?;
    let pool = init_db(&config.database_path).await?;
    let repo = Arc::new(Repository::new(pool));

    let mut pipeline = Pipeline::new(repo, config.clone());
    if let Some(url) = &config.eth_rpc_url {
        let source: Arc<dyn ChainSource> = Arc::new(EthRpcSource::new(
            url.clone(),
            config.jug_address.clone(),
            config.vat_address.clone(),
            config.rpc_block_span,
        ));
        pipeline = pipeline.with_source(source);
    } else {
        tracing::info!("ETH_RPC_URL not set; skipping ingestion");
    }

    let report = pipeline.run().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
