use anyhow::Result;
use netvitals::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    netvitals::init_tracing(cli.verbose);
    netvitals::run(cli).await
}
