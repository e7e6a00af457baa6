#[tokio::main]
async fn main() -> anyhow::Result<()> {
    holocache::run_cli().await
}
