use anyhow::Result;
use clap::Parser;
use httpsniff::RawInput;

#[derive(Parser, Debug)]
#[command(name = "httpsniff", version, about = "httpsniff – raw socket HTTP traffic capture")]
struct Cli {
    /// Address to capture on, host:port (port 0 or empty captures every port)
    address: String,

    /// Use JSON logs
    #[arg(long, default_value_t = false)]
    log_json: bool,

    /// Suppress payload output; message summaries still go to the log
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    httpsniff::observability::init_tracing(cli.log_json);

    let mut input = RawInput::listen(&cli.address)?;
    tracing::info!(input = %input, "capture started");

    while let Some(payload) = input.recv().await {
        if !cli.quiet {
            println!("{}", String::from_utf8_lossy(&payload));
        }
    }

    Ok(())
}
