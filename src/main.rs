use anyhow::{bail, Context, Result};
use auction_mailer::{MailConfig, Mailer};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: auction-mailer <confirmation|password-reset|bid-alert> <to> <name|password> <url>";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [kind, to, value, url] = args.as_slice() else {
        bail!(USAGE);
    };

    let config = MailConfig::from_env().context("failed to load mail configuration")?;
    let mailer = Mailer::new(config);

    match kind.as_str() {
        "confirmation" => mailer.send_confirmation(to, value, url).await,
        "password-reset" => mailer.send_password_reset(to, value, url).await,
        "bid-alert" => mailer.send_bid_alert(to, value, url).await,
        other => bail!("unknown mail kind {:?}\n{}", other, USAGE),
    }
    .with_context(|| format!("failed to send {} mail to {}", kind, to))?;

    tracing::info!("Sent {} mail to {}", kind, to);
    Ok(())
}
