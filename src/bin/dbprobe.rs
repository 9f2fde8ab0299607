use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dbprobe::cli::start().await
}
