// ==========================================
// 批量物料导入系统 - SQLite 连接初始化与建表
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 / busy_timeout）
// - 提供记录存储所需的最小表结构（不做迁移）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 建表语句（IF NOT EXISTS，可重复执行）
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id    TEXT NOT NULL DEFAULT 'global',
    key         TEXT NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS item (
    item_code          TEXT PRIMARY KEY,
    item_name          TEXT NOT NULL,
    item_group         TEXT NOT NULL,
    stock_uom          TEXT NOT NULL,
    description        TEXT,
    gst_hsn_code       TEXT,
    barcode            TEXT UNIQUE,
    brand              TEXT,
    manufacturer       TEXT,
    disabled           INTEGER NOT NULL DEFAULT 0,
    is_stock_item      INTEGER NOT NULL DEFAULT 1,
    item_tax_template  TEXT,
    created_at         TEXT NOT NULL,
    updated_at         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS item_price (
    price_list       TEXT NOT NULL,
    item_code        TEXT NOT NULL REFERENCES item(item_code),
    currency         TEXT,
    price_list_rate  REAL NOT NULL CHECK (price_list_rate >= 0),
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    PRIMARY KEY (price_list, item_code)
);

CREATE TABLE IF NOT EXISTS stock_bin (
    warehouse       TEXT NOT NULL,
    item_code       TEXT NOT NULL REFERENCES item(item_code),
    qty             REAL NOT NULL CHECK (qty >= 0),
    valuation_rate  REAL NOT NULL DEFAULT 0 CHECK (valuation_rate >= 0),
    updated_at      TEXT NOT NULL,
    PRIMARY KEY (warehouse, item_code)
);

CREATE TABLE IF NOT EXISTS stock_reconciliation (
    reconciliation_id   TEXT PRIMARY KEY,
    batch_id            TEXT,
    purpose             TEXT NOT NULL,
    company             TEXT,
    difference_account  TEXT,
    posting_date        TEXT NOT NULL,
    posting_time        TEXT NOT NULL,
    created_at          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS stock_reconciliation_item (
    reconciliation_id  TEXT NOT NULL REFERENCES stock_reconciliation(reconciliation_id),
    item_code          TEXT NOT NULL REFERENCES item(item_code),
    warehouse          TEXT NOT NULL,
    qty                REAL NOT NULL,
    valuation_rate     REAL NOT NULL,
    current_qty        REAL,
    current_valuation_rate REAL
);

CREATE TABLE IF NOT EXISTS account (
    name       TEXT PRIMARY KEY,
    company    TEXT,
    root_type  TEXT,
    is_group   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS import_batch (
    batch_id               TEXT PRIMARY KEY,
    file_name              TEXT NOT NULL,
    total_rows             INTEGER NOT NULL,
    created_items          INTEGER NOT NULL,
    updated_items          INTEGER NOT NULL,
    created_prices         INTEGER NOT NULL,
    updated_prices         INTEGER NOT NULL,
    stock_reconciliations  INTEGER NOT NULL,
    error_rows             INTEGER NOT NULL,
    log_text               TEXT NOT NULL,
    errors_json            TEXT,
    imported_at            TEXT NOT NULL,
    elapsed_ms             INTEGER NOT NULL
);
"#;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 建表并登记 schema_version（幂等）
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        ensure_schema(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO item_price (price_list, item_code, price_list_rate, created_at, updated_at)
             VALUES ('Standard Selling', 'NOPE', 1.0, 'now', 'now')",
            [],
        );
        assert!(result.is_err());
    }
}
