use clap::Parser;
use report_harvest::utils::{logger, validation::Validate};
use report_harvest::{BackoffTransport, CliConfig, HarvestEngine, LocalStorage};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    logger::init_cli_logger(config.verbose);

    tracing::info!("Starting report-harvest");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        eprintln!("❌ {}", e);
        std::process::exit(2);
    }

    let token = match report_harvest::config::check_env() {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::error!("❌ {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(2);
        }
    };

    let storage = LocalStorage::new(config.out.clone());
    let transport = BackoffTransport::new(token);
    let engine = HarvestEngine::new(transport, storage, config);

    match engine.run().await {
        Ok(summary) => {
            tracing::info!(
                "✅ harvest complete: {} window(s), {} item(s)",
                summary.windows,
                summary.grand_total
            );
            println!("Outputs:");
            println!("  JSONL : {}", summary.jsonl_path);
            println!("  JSON  : {}", summary.json_path);
            match &summary.csv_path {
                Some(path) => println!("  CSV   : {}", path),
                None => println!("  CSV   : (skipped)"),
            }
            println!("📊 Grand total items: {}", summary.grand_total);
        }
        Err(e) => {
            tracing::error!("❌ harvest failed: {}", e);
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
