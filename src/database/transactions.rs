/// Event persistence
///
/// `persist_event` is the authoritative end of the exactly-once guarantee:
/// the duplicate check, the event insert and all token operations run in one
/// transaction, so a crash mid-way leaves no partial event behind and a
/// replay can never double-write.
use crate::classifier::{ClassifiedEvent, EventType};
use crate::database::connection::Database;
use crate::database::models::{
    DatabaseResult, PersistOutcome, StoredEvent, StoredOperation, WalletRecord,
};
use crate::database::tokens::upsert_token_row;
use anyhow::Context;
use rusqlite::{params, OptionalExtension};

impl Database {
    /// Persist one classified event for one wallet.
    ///
    /// Returns `Duplicate` without writing when the (signature, wallet) pair
    /// already exists. Database errors propagate; the caller must not publish
    /// the event in that case.
    pub fn persist_event(
        &self,
        wallet: &WalletRecord,
        event: &ClassifiedEvent,
    ) -> DatabaseResult<PersistOutcome> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().context("Failed to begin transaction")?;

        // Re-check under the same transaction that performs the insert
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM transactions WHERE signature = ?1 AND wallet_id = ?2",
                params![event.signature, wallet.id],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_some() {
            return Ok(PersistOutcome::Duplicate);
        }

        let (sol_spent, sol_received, usd_spent, usd_received) = match event.event_type {
            EventType::Buy => (event.sol_amount, 0.0, event.usd_amount, 0.0),
            EventType::Sell => (0.0, event.sol_amount, 0.0, event.usd_amount),
        };

        tx.execute(
            "INSERT INTO transactions
                 (wallet_id, signature, block_time, transaction_type,
                  sol_spent, sol_received, usd_spent, usd_received)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                wallet.id,
                event.signature,
                event.block_time,
                event.event_type.as_str(),
                sol_spent,
                sol_received,
                usd_spent,
                usd_received
            ],
        )
        .with_context(|| format!("Failed to insert event {}", event.signature))?;

        let event_id = tx.last_insert_rowid();

        for change in &event.changes {
            let token_id = upsert_token_row(
                &tx,
                &change.mint,
                &change.symbol,
                &change.name,
                change.decimals,
                None,
            )?;

            tx.execute(
                "INSERT INTO token_operations (transaction_id, token_id, amount, operation_type)
                 VALUES (?1, ?2, ?3, ?4)",
                params![event_id, token_id, change.amount, event.event_type.as_str()],
            )?;
        }

        tx.commit().context("Failed to commit event")?;

        Ok(PersistOutcome::Inserted(event_id))
    }

    /// Most recent stored events with their token operations, newest first.
    ///
    /// This is the consumer's bulk reload after a fanout reconnect.
    pub fn recent_events(&self, limit: usize) -> DatabaseResult<Vec<StoredEvent>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT t.id, t.signature, w.address, w.name, w.group_id,
                    t.block_time, t.transaction_type,
                    t.sol_spent, t.sol_received, t.usd_spent, t.usd_received
             FROM transactions t
             JOIN wallets w ON w.id = t.wallet_id
             ORDER BY t.id DESC
             LIMIT ?1",
        )?;

        let mut events = stmt
            .query_map(params![limit as i64], |row| {
                Ok(StoredEvent {
                    id: row.get(0)?,
                    signature: row.get(1)?,
                    wallet_address: row.get(2)?,
                    wallet_name: row.get(3)?,
                    group_id: row.get(4)?,
                    block_time: row.get(5)?,
                    transaction_type: row.get(6)?,
                    sol_spent: row.get(7)?,
                    sol_received: row.get(8)?,
                    usd_spent: row.get(9)?,
                    usd_received: row.get(10)?,
                    operations: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut op_stmt = conn.prepare(
            "SELECT tok.mint, tok.symbol, tok.name, op.amount, op.operation_type
             FROM token_operations op
             JOIN tokens tok ON tok.id = op.token_id
             WHERE op.transaction_id = ?1",
        )?;

        for event in &mut events {
            event.operations = op_stmt
                .query_map(params![event.id], |row| {
                    Ok(StoredOperation {
                        mint: row.get(0)?,
                        symbol: row.get(1)?,
                        name: row.get(2)?,
                        amount: row.get(3)?,
                        operation_type: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::TokenChange;

    fn wallet(db: &Database) -> WalletRecord {
        db.upsert_wallet("walletA", Some("whale"), None).unwrap();
        db.wallet_by_address("walletA").unwrap().unwrap()
    }

    fn buy_event(signature: &str) -> ClassifiedEvent {
        ClassifiedEvent {
            signature: signature.to_string(),
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

    #[test]
    fn insert_then_replay_writes_once() {
        let db = Database::in_memory().unwrap();
        let w = wallet(&db);
        let event = buy_event("sig1");

        let first = db.persist_event(&w, &event).unwrap();
        assert!(matches!(first, PersistOutcome::Inserted(_)));

        // Replaying the same payload any number of times adds nothing
        for _ in 0..3 {
            let outcome = db.persist_event(&w, &event).unwrap();
            assert_eq!(outcome, PersistOutcome::Duplicate);
        }

        let stats = db.stats().unwrap();
        assert_eq!(stats.transactions, 1);
        assert_eq!(stats.token_operations, 1);
    }

    #[test]
    fn same_signature_different_wallets_both_persist() {
        let db = Database::in_memory().unwrap();
        let w1 = wallet(&db);
        db.upsert_wallet("walletB", None, None).unwrap();
        let w2 = db.wallet_by_address("walletB").unwrap().unwrap();

        let event = buy_event("sig1");
        assert!(matches!(
            db.persist_event(&w1, &event).unwrap(),
            PersistOutcome::Inserted(_)
        ));

        let mut event_b = event.clone();
        event_b.wallet_address = "walletB".to_string();
        assert!(matches!(
            db.persist_event(&w2, &event_b).unwrap(),
            PersistOutcome::Inserted(_)
        ));

        assert_eq!(db.stats().unwrap().transactions, 2);
    }

    #[test]
    fn buy_event_zeroes_received_side() {
        let db = Database::in_memory().unwrap();
        let w = wallet(&db);
        db.persist_event(&w, &buy_event("sig1")).unwrap();

        let events = db.recent_events(10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].transaction_type, "buy");
        assert!(events[0].sol_spent > 0.0);
        assert_eq!(events[0].sol_received, 0.0);
        assert_eq!(events[0].usd_received, 0.0);
    }

    #[test]
    fn operations_carry_parent_type_and_amount() {
        let db = Database::in_memory().unwrap();
        let w = wallet(&db);
        db.persist_event(&w, &buy_event("sig1")).unwrap();

        let events = db.recent_events(10).unwrap();
        let ops = &events[0].operations;
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type, "buy");
        assert!((ops[0].amount - 1.0).abs() < 1e-9);
        assert_eq!(ops[0].mint, "M1");
    }

    #[test]
    fn persist_preserves_existing_deployment_time() {
        let db = Database::in_memory().unwrap();
        let w = wallet(&db);

        // Resolver stored the token earlier with a deployment time
        db.upsert_token(&crate::metadata::TokenMeta {
            mint: "M1".to_string(),
            symbol: "OLD".to_string(),
            name: "Old".to_string(),
            decimals: 6,
            deployment_time: Some(1_234),
        })
        .unwrap();

        db.persist_event(&w, &buy_event("sig1")).unwrap();

        let row = db.token_by_mint("M1").unwrap().unwrap();
        assert_eq!(row.deployment_time, Some(1_234));
        // Mutable fields follow the event's enriched metadata
        assert_eq!(row.symbol, "TST");
    }

    #[test]
    fn recent_events_newest_first() {
        let db = Database::in_memory().unwrap();
        let w = wallet(&db);
        db.persist_event(&w, &buy_event("sig1")).unwrap();
        db.persist_event(&w, &buy_event("sig2")).unwrap();

        let events = db.recent_events(10).unwrap();
        assert_eq!(events[0].signature, "sig2");
        assert_eq!(events[1].signature, "sig1");
    }
}
