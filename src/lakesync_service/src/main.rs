use clap::Parser;
use lakesync_service::{run_transfer, Error, Result, TransferConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "lakesync-service")]
#[command(about = "Relational-to-Iceberg data transfer service")]
struct Cli {
    /// Path to the transfer configuration (JSON)
    config_path: String,

    /// Check the configuration and exit without running the transfer
    #[arg(long)]
    validate_only: bool,
}

#[tokio::main]
pub async fn main() -> Result<()> {
    lakesync_service::init_logging();
    let cli = Cli::parse();

    let config = TransferConfig::load(&cli.config_path).await?;
    let errors = config.validate();
    if !errors.is_empty() {
        for error in &errors {
            eprintln!("config error: {error}");
        }
        return Err(Error::Config(errors));
    }
    if cli.validate_only {
        println!("configuration OK");
        return Ok(());
    }

    let report = run_transfer(&config).await?;
    info!(
        transfer_type = report.transfer_type.as_str(),
        rows = report.rows,
        snapshot = ?report.new_snapshot_id,
        "done"
    );
    Ok(())
}
