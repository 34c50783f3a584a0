use anyhow::{Result, bail};
use clap::Parser;
use lib_realtime::loggers::setup_logging;
use lib_realtime::{ConnectionEvent, RealtimeClient, SubscriptionKey};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

mod watch_logic;
use watch_logic::{config, printer};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = config::resolve(config::Args::parse())?;
    let log_path = setup_logging(&settings.log_dir, &settings.log_level, "rt-watch")?;
    log::info!("Logging to {}", log_path.display());

    let client = RealtimeClient::new(settings.realtime.clone())?;
    let mut events = client.events();

    // Subscriptions need an acknowledged connection. If the first attempt
    // fails, they are registered on the first Connected event instead.
    let mut subscribed = false;
    match client.connect().await {
        Ok(client_id) => {
            log::info!("Connected as {}", client_id);
            subscribe_all(&client, &settings.keys, settings.raw).await;
            subscribed = true;
        }
        Err(e) => log::warn!("Initial connection failed: {}. Retrying in the background.", e),
    }

    let outcome = loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Ctrl-C received, shutting down.");
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(ConnectionEvent::Connected { client_id }) => {
                    log::info!("Connection acknowledged as {}", client_id);
                    if !subscribed {
                        subscribe_all(&client, &settings.keys, settings.raw).await;
                        subscribed = true;
                    }
                }
                Ok(ConnectionEvent::ReconnectExhausted { attempts }) => {
                    break Err(attempts);
                }
                Ok(other) => log::debug!("{:?}", other),
                Err(RecvError::Lagged(skipped)) => log::warn!("Missed {} connection event(s)", skipped),
                Err(RecvError::Closed) => break Ok(()),
            }
        }
    };

    client.disconnect().await?;
    match outcome {
        Ok(()) => {
            log::info!("Shutdown complete.");
            Ok(())
        }
        Err(attempts) => bail!("gave up after {} reconnection attempt(s)", attempts),
    }
}

async fn subscribe_all(client: &RealtimeClient, keys: &[SubscriptionKey], raw: bool) {
    for key in keys {
        let result = client
            .subscribe(key.collection.as_str(), key.entity_id.as_str(), move |event| {
                println!("{}", printer::render(event, raw));
            })
            .await;
        match result {
            Ok(_) => log::info!("Subscribed to {}", key),
            Err(e) => log::warn!("Subscription to {} failed: {}", key, e),
        }
    }
}
