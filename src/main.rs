use keeper::cli::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    keeper::logging::init();
    Cli::run().await
}
