use colored::Colorize;
use log::error;
use remote_inference::{cli, config, logging};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let config = match config::initialize_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            std::process::exit(1);
        }
    };
    logging::init_logging(&config.log_level);

    if let Err(e) = cli::run().await {
        error!("{}", e);
        eprintln!("{}", e.to_string().red());
        std::process::exit(1);
    }
}
