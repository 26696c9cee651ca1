/// Wallet record operations
///
/// The watched-address set lives here: one row per wallet, at most one group
/// per wallet, soft deactivation instead of deletes so historical events keep
/// their joins.
use crate::database::connection::Database;
use crate::database::models::{DatabaseResult, WalletRecord};
use anyhow::Context;
use rusqlite::{params, OptionalExtension, Row};

fn wallet_from_row(row: &Row) -> rusqlite::Result<WalletRecord> {
    Ok(WalletRecord {
        id: row.get(0)?,
        address: row.get(1)?,
        name: row.get(2)?,
        group_id: row.get(3)?,
        group_name: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
    })
}

impl Database {
    /// Insert or update a wallet record, returning its id.
    ///
    /// An existing row keeps its id; name and group are overwritten and the
    /// wallet is re-activated.
    pub fn upsert_wallet(
        &self,
        address: &str,
        name: Option<&str>,
        group_id: Option<&str>,
    ) -> DatabaseResult<i64> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT INTO wallets (address, name, group_id, is_active)
             VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(address) DO UPDATE SET
                 name = excluded.name,
                 group_id = excluded.group_id,
                 is_active = 1",
            params![address, name, group_id],
        )
        .with_context(|| format!("Failed to upsert wallet {}", address))?;

        let id: i64 = conn.query_row(
            "SELECT id FROM wallets WHERE address = ?1",
            params![address],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Fetch a wallet with its group name resolved
    pub fn wallet_by_address(&self, address: &str) -> DatabaseResult<Option<WalletRecord>> {
        let conn = self.conn.lock().unwrap();

        let record = conn
            .query_row(
                "SELECT w.id, w.address, w.name, w.group_id, g.name, w.is_active
                 FROM wallets w
                 LEFT JOIN groups g ON g.id = w.group_id
                 WHERE w.address = ?1",
                params![address],
                wallet_from_row,
            )
            .optional()?;

        Ok(record)
    }

    /// All active watched addresses, ordered for stable shard partitions
    pub fn all_active_addresses(&self) -> DatabaseResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt =
            conn.prepare("SELECT address FROM wallets WHERE is_active = 1 ORDER BY id")?;
        let addresses = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(addresses)
    }

    /// Move a wallet to a different group (or out of any group)
    pub fn set_wallet_group(&self, address: &str, group_id: Option<&str>) -> DatabaseResult<()> {
        let conn = self.conn.lock().unwrap();

        let updated = conn.execute(
            "UPDATE wallets SET group_id = ?2 WHERE address = ?1",
            params![address, group_id],
        )?;

        if updated == 0 {
            anyhow::bail!("Unknown wallet: {}", address);
        }
        Ok(())
    }

    /// Soft-deactivate a wallet; it drops out of the watched set on the next
    /// subscription rebuild
    pub fn deactivate_wallet(&self, address: &str) -> DatabaseResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE wallets SET is_active = 0 WHERE address = ?1",
            params![address],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_id_stable() {
        let db = Database::in_memory().unwrap();
        let id1 = db.upsert_wallet("addr1", Some("first"), None).unwrap();
        let id2 = db.upsert_wallet("addr1", Some("renamed"), None).unwrap();
        assert_eq!(id1, id2);

        let record = db.wallet_by_address("addr1").unwrap().unwrap();
        assert_eq!(record.name.as_deref(), Some("renamed"));
        assert!(record.is_active);
    }

    #[test]
    fn active_addresses_excludes_deactivated() {
        let db = Database::in_memory().unwrap();
        db.upsert_wallet("addr1", None, None).unwrap();
        db.upsert_wallet("addr2", None, None).unwrap();
        db.deactivate_wallet("addr1").unwrap();

        let addresses = db.all_active_addresses().unwrap();
        assert_eq!(addresses, vec!["addr2".to_string()]);
    }

    #[test]
    fn group_join_resolves_name() {
        let db = Database::in_memory().unwrap();
        let group = db.create_group("alpha", Some("admin")).unwrap();
        db.upsert_wallet("addr1", None, Some(&group.id)).unwrap();

        let record = db.wallet_by_address("addr1").unwrap().unwrap();
        assert_eq!(record.group_id.as_deref(), Some(group.id.as_str()));
        assert_eq!(record.group_name.as_deref(), Some("alpha"));
    }
}
