#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ingestflow_server::start().await
}
