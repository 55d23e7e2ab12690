use mq_cli::{run_cli, CliError};

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        eprintln!("error: {e}");

        let exit_code = match e {
            CliError::Configuration(_) => 1,
            CliError::Queue(_) => 2,
        };
        std::process::exit(exit_code);
    }
}
