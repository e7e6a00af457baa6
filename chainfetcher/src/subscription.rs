//! Event subscriptions built on `holo_pollEvents`.
//!
//! Each subscription owns a background task that polls the gateway from a
//! cursor and forwards decoded events into a bounded channel. The task
//! reconnects with exponential backoff and ends once the receiver is gone.

use std::time::Duration;

use holostore::fetch::EventStream;
use holostore::models::{ChainEvent, ChainId, RegistryKind};
use serde_json::json;
use tokio::sync::mpsc;

use crate::client::RegistryGatewayClient;
use crate::rpc::{EventPage, METHOD_POLL_EVENTS};

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Returns the delay to wait now and doubles the next one, capped at `max`.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.base;
    }
}

pub(crate) fn spawn_poller(
    client: RegistryGatewayClient,
    chain: ChainId,
    registry: RegistryKind,
) -> EventStream {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(poll_loop(client, chain, registry, tx));
    rx
}

async fn poll_loop(
    client: RegistryGatewayClient,
    chain: ChainId,
    registry: RegistryKind,
    tx: mpsc::Sender<ChainEvent>,
) {
    let poll_interval = client.options().poll_interval;
    let mut backoff = Backoff::new(poll_interval, client.options().max_backoff);
    // `None` asks the gateway to start from its current head.
    let mut cursor: Option<u64> = None;

    log::debug!("subscribed to {} {}", chain, registry);
    loop {
        let delay = match client
            .call::<EventPage>(&chain, METHOD_POLL_EVENTS, json!([registry, cursor]))
            .await
        {
            Ok(page) => {
                backoff.reset();
                cursor = Some(page.cursor);
                for raw in page.events {
                    match serde_json::from_value::<ChainEvent>(raw) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                log::debug!("subscription {} {} dropped", chain, registry);
                                return;
                            }
                        }
                        Err(err) => {
                            log::warn!("skipping undecodable event on {} {}: {}", chain, registry, err);
                        }
                    }
                }
                poll_interval
            }
            Err(err) => {
                let delay = backoff.next_delay();
                log::warn!(
                    "polling {} {} failed: {}; retrying in {:?}",
                    chain,
                    registry,
                    err,
                    delay
                );
                delay
            }
        };

        tokio::select! {
            _ = tx.closed() => {
                log::debug!("subscription {} {} dropped", chain, registry);
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(2), Duration::from_secs(60));
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn reset_returns_to_base() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }
}
