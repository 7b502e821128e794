use clap::Parser;
use colored::Colorize;

use deeplinker::cli::{Cli, Commands};
use deeplinker::config::{get_config, init_config_from};
use deeplinker::system::logging::init_logging;
use deeplinker::system::modes;

#[actix_web::main]
async fn main() -> std::process::ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_config_from(&cli.config);
    let config = get_config();

    // guard 必须存活到进程结束，否则文件日志会丢
    let _log_guard = match init_logging(&config.logging) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("[WARN] Failed to initialize logging: {:#}", e);
            None
        }
    };

    match cli.command {
        None | Some(Commands::Serve) => {
            if let Err(e) = modes::run_server(&config).await {
                eprintln!("{} {:#}", "[ERROR]".red().bold(), e);
                return std::process::ExitCode::FAILURE;
            }
        }
        Some(command) => {
            if let Err(e) = modes::run_cli(command).await {
                eprintln!("{}", e.format_colored());
                return std::process::ExitCode::FAILURE;
            }
        }
    }

    std::process::ExitCode::SUCCESS
}
