#[tokio::main]
async fn main() -> anyhow::Result<()> {
    closer_server::run().await
}
