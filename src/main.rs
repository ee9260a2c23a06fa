use spiralx::core::types::{ChannelKind, SymbolParams};
use spiralx::{build_client, ClientConfig, ExchangeError};
use tracing::{info, warn};

const SYMBOL: &str = "ETHUSDT";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    // Reads SPIRAL_API_KEY / SPIRAL_API_SECRET, optionally from a .env file
    #[cfg(feature = "env-file")]
    spiralx::core::config::load_env_file(".env")?;
    let config = ClientConfig::from_env("SPIRAL")?;

    let mut client = build_client(config)?;
    client.start()?;

    match client.rest().get_wallet_balances(&[("currency", "USDT")]).await {
        Ok(balances) => info!(status = balances.status, body = %balances.body, "wallet balances"),
        Err(e) => warn!(error = %e, "failed to fetch wallet balances"),
    }

    let result = run(&mut client).await;

    client.stop().await?;
    result
}

async fn run(client: &mut spiralx::SpiralClient<spiralx::core::kernel::ReqwestRest>) -> anyhow::Result<()> {
    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("exiting...");
                return Ok(());
            }
            event = client.next_event() => event,
        };

        let envelope = match event {
            Ok(envelope) => envelope,
            Err(ExchangeError::StreamClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        info!(event = %envelope.event, data = %envelope.data, "got data");

        let subscribed = match (envelope.event.as_str(), envelope.channel()) {
            ("connected", Some(ChannelKind::Public)) => {
                client
                    .hub()
                    .subscribe_orderbook(SymbolParams::new([SYMBOL]))
                    .await
            }
            ("authenticated", Some(ChannelKind::Private)) => {
                client
                    .hub()
                    .subscribe_order(SymbolParams::new([SYMBOL]))
                    .await
            }
            _ => Ok(()),
        };

        if let Err(e) = subscribed {
            warn!(error = %e, "subscription failed");
        }
    }
}
