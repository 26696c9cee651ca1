use crate::database::models::DatabaseResult;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::Mutex;

/// Main database connection wrapper
pub struct Database {
    pub(crate) conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database at the given path
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path))?;

        // WAL keeps the single writer from blocking bulk readers
        let _: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .unwrap_or_else(|_| "memory".to_string());
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// In-memory database for tests
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Initialize all required database tables
    fn initialize_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        // Create tables in order of dependencies
        self.create_groups_table(&conn)?;
        self.create_wallets_table(&conn)?;
        self.create_tokens_table(&conn)?;
        self.create_transactions_table(&conn)?;
        self.create_token_operations_table(&conn)?;

        self.create_indexes(&conn)?;

        Ok(())
    }

    fn create_groups_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS groups (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_by TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn create_wallets_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS wallets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                address TEXT NOT NULL UNIQUE,
                name TEXT,
                group_id TEXT REFERENCES groups(id),
                is_active INTEGER NOT NULL DEFAULT 1
            )",
            [],
        )?;
        Ok(())
    }

    fn create_tokens_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mint TEXT NOT NULL UNIQUE,
                symbol TEXT NOT NULL,
                name TEXT NOT NULL,
                decimals INTEGER NOT NULL,
                deployment_time INTEGER
            )",
            [],
        )?;
        Ok(())
    }

    fn create_transactions_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                wallet_id INTEGER NOT NULL REFERENCES wallets(id),
                signature TEXT NOT NULL,
                block_time INTEGER NOT NULL,
                transaction_type TEXT NOT NULL,
                sol_spent REAL NOT NULL DEFAULT 0,
                sol_received REAL NOT NULL DEFAULT 0,
                usd_spent REAL NOT NULL DEFAULT 0,
                usd_received REAL NOT NULL DEFAULT 0,
                UNIQUE(signature, wallet_id)
            )",
            [],
        )?;
        Ok(())
    }

    fn create_token_operations_table(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS token_operations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                transaction_id INTEGER NOT NULL REFERENCES transactions(id),
                token_id INTEGER NOT NULL REFERENCES tokens(id),
                amount REAL NOT NULL,
                operation_type TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Create database indexes for performance
    fn create_indexes(&self, conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_wallets_group ON wallets(group_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_wallets_active ON wallets(is_active)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_wallet ON transactions(wallet_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_transactions_block_time ON transactions(block_time)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_token_operations_tx ON token_operations(transaction_id)",
            [],
        )?;

        Ok(())
    }

    /// Get aggregate table counts
    pub fn stats(&self) -> DatabaseResult<super::models::DatabaseStats> {
        let conn = self.conn.lock().unwrap();

        let wallets: u64 = conn.query_row("SELECT COUNT(*) FROM wallets", [], |row| row.get(0))?;
        let active_wallets: u64 = conn.query_row(
            "SELECT COUNT(*) FROM wallets WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        let groups: u64 = conn.query_row("SELECT COUNT(*) FROM groups", [], |row| row.get(0))?;
        let tokens: u64 = conn.query_row("SELECT COUNT(*) FROM tokens", [], |row| row.get(0))?;
        let transactions: u64 =
            conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        let token_operations: u64 =
            conn.query_row("SELECT COUNT(*) FROM token_operations", [], |row| row.get(0))?;

        Ok(super::models::DatabaseStats {
            wallets,
            active_wallets,
            groups,
            tokens,
            transactions,
            token_operations,
        })
    }
}
