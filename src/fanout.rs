/// Fanout Bus
///
/// Publishes every persisted event as one JSON-serialised message on a global
/// `events` channel and, when the wallet belongs to a group, on that group's
/// `events:group:{id}` channel.
///
/// Delivery is at-most-once per connected consumer: a lagged or reconnecting
/// receiver misses messages and recovers through the persistence layer's
/// `recent_events` bulk reload. Publish order per process equals database
/// commit order because the dispatcher only publishes after a successful
/// commit.
use crate::classifier::ClassifiedEvent;
use crate::database::WalletRecord;
use crate::logger::{self, LogTag};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Buffered messages per channel before slow consumers start lagging
const CHANNEL_CAPACITY: usize = 1000;

/// Wire payload published to consumers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub signature: String,
    #[serde(rename = "walletAddress")]
    pub wallet_address: String,
    #[serde(rename = "walletName", skip_serializing_if = "Option::is_none")]
    pub wallet_name: Option<String>,
    #[serde(rename = "groupId", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(rename = "groupName", skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(rename = "transactionType")]
    pub transaction_type: String,
    #[serde(rename = "solAmount")]
    pub sol_amount: f64,
    pub tokens: Vec<PublishedToken>,
    /// ISO-8601 confirmation time
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedToken {
    pub mint: String,
    pub amount: f64,
    pub symbol: String,
    pub name: String,
}

impl PublishedEvent {
    pub fn from_classified(event: &ClassifiedEvent, wallet: &WalletRecord) -> Self {
        let timestamp = Utc
            .timestamp_opt(event.block_time, 0)
            .single()
            .unwrap_or_else(Utc::now)
            .to_rfc3339();

        Self {
            signature: event.signature.clone(),
            wallet_address: event.wallet_address.clone(),
            wallet_name: wallet.name.clone(),
            group_id: wallet.group_id.clone(),
            group_name: wallet.group_name.clone(),
            transaction_type: event.event_type.as_str().to_string(),
            sol_amount: event.sol_amount,
            tokens: event
                .changes
                .iter()
                .map(|c| PublishedToken {
                    mint: c.mint.clone(),
                    amount: c.amount,
                    symbol: c.symbol.clone(),
                    name: c.name.clone(),
                })
                .collect(),
            timestamp,
        }
    }
}

/// In-process pub/sub with a global channel and lazily-created group channels
pub struct FanoutBus {
    global: broadcast::Sender<String>,
    groups: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl FanoutBus {
    pub fn new() -> Self {
        let (global, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            global,
            groups: Mutex::new(HashMap::new()),
        }
    }

    /// Publish one event; always on `events`, additionally on the group
    /// channel when the wallet has one. Returns the serialised payload.
    pub fn publish(&self, event: &PublishedEvent) -> Result<String, String> {
        let payload = serde_json::to_string(event)
            .map_err(|e| format!("Failed to serialise event {}: {}", event.signature, e))?;

        // A send error only means nobody is subscribed right now
        let _ = self.global.send(payload.clone());

        if let Some(group_id) = &event.group_id {
            let sender = {
                let groups = self.groups.lock().unwrap();
                groups.get(group_id).cloned()
            };
            if let Some(sender) = sender {
                let _ = sender.send(payload.clone());
            }
        }

        logger::debug(
            LogTag::Fanout,
            &format!(
                "Published {} ({}) for {}",
                event.signature, event.transaction_type, event.wallet_address
            ),
        );

        Ok(payload)
    }

    /// Subscribe to the global `events` channel
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.global.subscribe()
    }

    /// Subscribe to `events:group:{id}`, creating the channel on first use
    pub fn subscribe_group(&self, group_id: &str) -> broadcast::Receiver<String> {
        let mut groups = self.groups.lock().unwrap();
        groups
            .entry(group_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Number of live subscribers on the global channel
    pub fn subscriber_count(&self) -> usize {
        self.global.receiver_count()
    }
}

impl Default for FanoutBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{EventType, TokenChange};

    fn wallet(group_id: Option<&str>, group_name: Option<&str>) -> WalletRecord {
        WalletRecord {
            id: 1,
            address: "walletA".to_string(),
            name: Some("whale".to_string()),
            group_id: group_id.map(|s| s.to_string()),
            group_name: group_name.map(|s| s.to_string()),
            is_active: true,
        }
    }

    fn event() -> ClassifiedEvent {
        ClassifiedEvent {
            signature: "sig1".to_string(),
            block_time: 1_700_000_000,
            wallet_address: "walletA".to_string(),
            event_type: EventType::Buy,
            sol_amount: 0.5,
            usd_amount: 75.0,
            changes: vec![TokenChange {
                mint: "M1".to_string(),
                raw_amount: 1_000_000,
                decimals: 6,
                amount: 1.0,
                symbol: "TST".to_string(),
                name: "Test".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn global_subscriber_receives_every_event() {
        let bus = FanoutBus::new();
        let mut rx = bus.subscribe();

        let published = PublishedEvent::from_classified(&event(), &wallet(None, None));
        bus.publish(&published).unwrap();

        let raw = rx.recv().await.unwrap();
        let parsed: PublishedEvent = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.signature, "sig1");
        assert_eq!(parsed.transaction_type, "buy");
        assert_eq!(parsed.tokens.len(), 1);
    }

    #[tokio::test]
    async fn group_channel_only_sees_its_group() {
        let bus = FanoutBus::new();
        let mut group_a = bus.subscribe_group("group-a");
        let mut global = bus.subscribe();

        // Event from group-b: global sees it, group-a does not
        let published =
            PublishedEvent::from_classified(&event(), &wallet(Some("group-b"), Some("beta")));
        // Create group-b's channel so the publish has somewhere to go
        let mut group_b = bus.subscribe_group("group-b");
        bus.publish(&published).unwrap();

        assert!(global.recv().await.is_ok());
        assert!(group_b.recv().await.is_ok());
        assert!(group_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn ungrouped_event_skips_group_channels() {
        let bus = FanoutBus::new();
        let mut group_a = bus.subscribe_group("group-a");

        let published = PublishedEvent::from_classified(&event(), &wallet(None, None));
        bus.publish(&published).unwrap();

        assert!(group_a.try_recv().is_err());
    }

    #[test]
    fn wire_format_field_names() {
        let published = PublishedEvent::from_classified(&event(), &wallet(Some("g1"), Some("alpha")));
        let raw = serde_json::to_string(&published).unwrap();

        assert!(raw.contains("\"walletAddress\""));
        assert!(raw.contains("\"transactionType\""));
        assert!(raw.contains("\"solAmount\""));
        assert!(raw.contains("\"groupId\""));
        assert!(raw.contains("\"timestamp\""));
    }

    #[test]
    fn absent_group_fields_omitted() {
        let published = PublishedEvent::from_classified(&event(), &wallet(None, None));
        let raw = serde_json::to_string(&published).unwrap();
        assert!(!raw.contains("groupId"));
        assert!(!raw.contains("groupName"));
    }
}
