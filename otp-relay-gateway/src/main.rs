use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    otp_relay_gateway::run().await?;
    Ok(())
}
