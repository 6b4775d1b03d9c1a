use clap::Parser;
use kvmdeck_lib::cli::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    kvmdeck_lib::logging::init(&cli.log_level);
    kvmdeck_lib::run(cli).await
}
