use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    docqa_cli::main_entry().await
}
