use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::Context as _;
use mail_relay::journal::Journal;
use mail_relay::{Context, EmailConfig, EnvConfig, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let server = ServerConfig::from_env().context("reading MCP_* settings")?;
    let email = EmailConfig::from_env().context("reading SMTP_* settings")?;

    let journal = Journal::new(&server.log_file);
    let ctx = Context::smtp(email, journal);

    mail_relay::serve(
        (Ipv4Addr::UNSPECIFIED, server.port),
        ctx,
        Duration::from_secs(server.shutdown_grace_secs),
    )
    .await
    .context("serving HTTP")?;
    Ok(())
}
