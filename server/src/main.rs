mod app;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    app::run().await
}
