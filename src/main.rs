use grant_portal::PortalConfig;
use grant_portal::app;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = PortalConfig::from_env()?;

    // Start the web application
    app::run(config).await?;

    Ok(())
}
