/// Token row operations
///
/// Mutable metadata fields (symbol, name, decimals) follow the latest
/// resolution; `deployment_time` is monotonic - once a non-null value is
/// stored, later upserts can never move it (oldest observation wins).
use crate::database::connection::Database;
use crate::database::models::{DatabaseResult, TokenRow};
use crate::metadata::TokenMeta;
use rusqlite::{params, Connection, OptionalExtension, Row};

fn token_from_row(row: &Row) -> rusqlite::Result<TokenRow> {
    Ok(TokenRow {
        id: row.get(0)?,
        mint: row.get(1)?,
        symbol: row.get(2)?,
        name: row.get(3)?,
        decimals: row.get::<_, i64>(4)? as u8,
        deployment_time: row.get(5)?,
    })
}

/// Shared upsert used both standalone and inside the persist transaction
pub(crate) fn upsert_token_row(
    conn: &Connection,
    mint: &str,
    symbol: &str,
    name: &str,
    decimals: u8,
    deployment_time: Option<i64>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO tokens (mint, symbol, name, decimals, deployment_time)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(mint) DO UPDATE SET
             symbol = excluded.symbol,
             name = excluded.name,
             decimals = excluded.decimals,
             deployment_time = COALESCE(tokens.deployment_time, excluded.deployment_time)",
        params![mint, symbol, name, decimals as i64, deployment_time],
    )?;

    conn.query_row(
        "SELECT id FROM tokens WHERE mint = ?1",
        params![mint],
        |row| row.get(0),
    )
}

impl Database {
    /// Upsert resolved token metadata
    pub fn upsert_token(&self, meta: &TokenMeta) -> DatabaseResult<i64> {
        let conn = self.conn.lock().unwrap();
        let id = upsert_token_row(
            &conn,
            &meta.mint,
            &meta.symbol,
            &meta.name,
            meta.decimals,
            meta.deployment_time,
        )?;
        Ok(id)
    }

    pub fn token_by_mint(&self, mint: &str) -> DatabaseResult<Option<TokenRow>> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT id, mint, symbol, name, decimals, deployment_time
                 FROM tokens WHERE mint = ?1",
                params![mint],
                token_from_row,
            )
            .optional()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(mint: &str, deployment_time: Option<i64>) -> TokenMeta {
        TokenMeta {
            mint: mint.to_string(),
            symbol: "TST".to_string(),
            name: "Test".to_string(),
            decimals: 6,
            deployment_time,
        }
    }

    #[test]
    fn deployment_time_never_advances() {
        let db = Database::in_memory().unwrap();

        db.upsert_token(&meta("M1", Some(1_000))).unwrap();
        db.upsert_token(&meta("M1", Some(2_000))).unwrap();

        let row = db.token_by_mint("M1").unwrap().unwrap();
        assert_eq!(row.deployment_time, Some(1_000));
    }

    #[test]
    fn null_deployment_fills_in_later() {
        let db = Database::in_memory().unwrap();

        db.upsert_token(&meta("M1", None)).unwrap();
        assert_eq!(
            db.token_by_mint("M1").unwrap().unwrap().deployment_time,
            None
        );

        db.upsert_token(&meta("M1", Some(1_500))).unwrap();
        assert_eq!(
            db.token_by_mint("M1").unwrap().unwrap().deployment_time,
            Some(1_500)
        );
    }

    #[test]
    fn mutable_fields_follow_latest() {
        let db = Database::in_memory().unwrap();

        db.upsert_token(&meta("M1", None)).unwrap();
        let mut updated = meta("M1", None);
        updated.symbol = "NEW".to_string();
        updated.name = "New Name".to_string();
        db.upsert_token(&updated).unwrap();

        let row = db.token_by_mint("M1").unwrap().unwrap();
        assert_eq!(row.symbol, "NEW");
        assert_eq!(row.name, "New Name");
    }
}
