use log::error;
use std::process;

use eqtble_metrics::{
    config::{Config, PostgresConfig},
    data_store::postgres::PostgresDataStore,
    Workflow,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = Config::new().map_err(|e| {
        error!("Failed to initialize config: {}", e);
        e
    })?;

    let postgres_config = PostgresConfig::new().map_err(|e| {
        error!("Failed to initialize Postgres config: {}", e);
        e
    })?;

    let measures = config.measures_input().map_err(|e| {
        error!("Failed to read measures file: {}", e);
        e
    })?;

    let data_store = PostgresDataStore::new(postgres_config);
    let workflow = Workflow::from_config(data_store, &config);

    match workflow.run(&config, measures.as_deref()).await {
        Ok((_, report)) => println!("{}", report.render()?),
        Err(e) => {
            error!("Conversion failed: {}", e);
            process::exit(1);
        }
    }

    Ok(())
}
