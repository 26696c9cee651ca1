/// Group lifecycle
///
/// Groups are administrative tags consumed by the fanout's per-group channels.
/// Names are globally unique; a group can only be deleted once no wallet
/// references it.
use crate::database::connection::Database;
use crate::database::models::{DatabaseResult, GroupRecord};
use anyhow::Context;
use rusqlite::{params, OptionalExtension, Row};

fn group_from_row(row: &Row) -> rusqlite::Result<GroupRecord> {
    Ok(GroupRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        created_by: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl Database {
    /// Create a group with a fresh uuid
    pub fn create_group(&self, name: &str, created_by: Option<&str>) -> DatabaseResult<GroupRecord> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let created_at = chrono::Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO groups (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, name, created_by, created_at],
        )
        .with_context(|| format!("Failed to create group '{}'", name))?;

        Ok(GroupRecord {
            id,
            name: name.to_string(),
            created_by: created_by.map(|s| s.to_string()),
            created_at,
        })
    }

    pub fn group_by_id(&self, id: &str) -> DatabaseResult<Option<GroupRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, name, created_by, created_at FROM groups WHERE id = ?1",
                params![id],
                group_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn group_by_name(&self, name: &str) -> DatabaseResult<Option<GroupRecord>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, name, created_by, created_at FROM groups WHERE name = ?1",
                params![name],
                group_from_row,
            )
            .optional()?;
        Ok(record)
    }

    pub fn list_groups(&self) -> DatabaseResult<Vec<GroupRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT id, name, created_by, created_at FROM groups ORDER BY name")?;
        let groups = stmt
            .query_map([], group_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Delete a group. Refused while any wallet still references it.
    pub fn delete_group(&self, id: &str) -> DatabaseResult<()> {
        let conn = self.conn.lock().unwrap();

        let references: u64 = conn.query_row(
            "SELECT COUNT(*) FROM wallets WHERE group_id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        if references > 0 {
            anyhow::bail!(
                "Group {} still referenced by {} wallet(s)",
                id,
                references
            );
        }

        conn.execute("DELETE FROM groups WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique() {
        let db = Database::in_memory().unwrap();
        db.create_group("alpha", None).unwrap();
        assert!(db.create_group("alpha", None).is_err());
    }

    #[test]
    fn delete_refused_while_referenced() {
        let db = Database::in_memory().unwrap();
        let group = db.create_group("alpha", None).unwrap();
        db.upsert_wallet("addr1", None, Some(&group.id)).unwrap();

        assert!(db.delete_group(&group.id).is_err());

        db.set_wallet_group("addr1", None).unwrap();
        db.delete_group(&group.id).unwrap();
        assert!(db.group_by_id(&group.id).unwrap().is_none());
    }
}
