// ==========================================
// 批量物料导入系统 - 记录存储 SQLite 实现
// ==========================================
// 职责: 按自然键读写 item / item_price / stock_bin，
//       库存写入同时过账 stock_reconciliation
// 红线: Repository 不含业务规则，只做数据 CRUD
// ==========================================

use crate::db::{configure_sqlite_connection, ensure_schema, open_sqlite_connection};
use crate::domain::import_result::ImportBatch;
use crate::domain::record::{
    AccountRecord, FieldDiff, FieldValue, ItemPriceRecord, ItemRecord, Record, RecordKey,
    StockLevelRecord,
};
use crate::domain::types::AccountRootType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{RecordStore, WriteContext};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// 库存对账单用途（期初导入）
pub const RECONCILIATION_PURPOSE: &str = "Opening Stock";

// ==========================================
// SqliteRecordStore
// ==========================================
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// 创建新的 Store 实例（自动建表）
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 Store 实例
    ///
    /// 说明：会对传入连接再次应用统一 PRAGMA 并建表（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
            ensure_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入会计科目（主数据维护入口，导入流程只读）
    pub fn upsert_account(&self, account: &AccountRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO account (name, company, root_type, is_group)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
                company = excluded.company,
                root_type = excluded.root_type,
                is_group = excluded.is_group
            "#,
            params![
                account.name,
                account.company,
                account.root_type.map(|r| r.to_string()),
                account.is_group,
            ],
        )?;
        Ok(())
    }

    /// 统计某物料已过账的库存对账单行数
    pub fn count_reconciliation_lines(&self, item_code: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM stock_reconciliation_item WHERE item_code = ?1",
            params![item_code],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ===== 读取 =====

    fn load_item(conn: &Connection, item_code: &str) -> RepositoryResult<Option<ItemRecord>> {
        let item = conn
            .query_row(
                r#"
                SELECT item_code, item_name, item_group, stock_uom, description,
                       gst_hsn_code, barcode, brand, manufacturer, disabled,
                       is_stock_item, item_tax_template
                FROM item WHERE item_code = ?1
                "#,
                params![item_code],
                |row| {
                    Ok(ItemRecord {
                        item_code: row.get(0)?,
                        item_name: row.get(1)?,
                        item_group: row.get(2)?,
                        stock_uom: row.get(3)?,
                        description: row.get(4)?,
                        gst_hsn_code: row.get(5)?,
                        barcode: row.get(6)?,
                        brand: row.get(7)?,
                        manufacturer: row.get(8)?,
                        disabled: row.get(9)?,
                        is_stock_item: row.get(10)?,
                        item_tax_template: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(item)
    }

    fn load_price(
        conn: &Connection,
        price_list: &str,
        item_code: &str,
    ) -> RepositoryResult<Option<ItemPriceRecord>> {
        let price = conn
            .query_row(
                r#"
                SELECT price_list, item_code, currency, price_list_rate
                FROM item_price WHERE price_list = ?1 AND item_code = ?2
                "#,
                params![price_list, item_code],
                |row| {
                    Ok(ItemPriceRecord {
                        price_list: row.get(0)?,
                        item_code: row.get(1)?,
                        currency: row.get(2)?,
                        price_list_rate: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(price)
    }

    fn load_bin(
        conn: &Connection,
        warehouse: &str,
        item_code: &str,
    ) -> RepositoryResult<Option<StockLevelRecord>> {
        let bin = conn
            .query_row(
                r#"
                SELECT warehouse, item_code, qty, valuation_rate
                FROM stock_bin WHERE warehouse = ?1 AND item_code = ?2
                "#,
                params![warehouse, item_code],
                |row| {
                    Ok(StockLevelRecord {
                        warehouse: row.get(0)?,
                        item_code: row.get(1)?,
                        qty: row.get(2)?,
                        valuation_rate: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(bin)
    }

    // ===== 写入（事务内）=====

    fn insert_item_tx(tx: &Transaction, item: &ItemRecord, ctx: &WriteContext) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO item (
                item_code, item_name, item_group, stock_uom, description,
                gst_hsn_code, barcode, brand, manufacturer, disabled,
                is_stock_item, item_tax_template, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            "#,
            params![
                item.item_code,
                item.item_name,
                item.item_group,
                item.stock_uom,
                item.description,
                item.gst_hsn_code,
                item.barcode,
                item.brand,
                item.manufacturer,
                item.disabled,
                item.is_stock_item,
                item.item_tax_template,
                ctx.posted_at,
            ],
        )?;
        Ok(())
    }

    fn insert_price_tx(
        tx: &Transaction,
        price: &ItemPriceRecord,
        ctx: &WriteContext,
    ) -> RepositoryResult<()> {
        tx.execute(
            r#"
            INSERT INTO item_price (
                price_list, item_code, currency, price_list_rate, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
            params![
                price.price_list,
                price.item_code,
                price.currency,
                price.price_list_rate,
                ctx.posted_at,
            ],
        )?;
        Ok(())
    }

    /// 按差异更新单表（列名与字段标识一致）
    fn update_columns_tx(
        tx: &Transaction,
        table: &str,
        key_columns: &[(&str, &str)],
        diff: &FieldDiff,
        ctx: &WriteContext,
    ) -> RepositoryResult<()> {
        let mut assignments = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        for change in diff.iter() {
            values.push(to_sql_value(&change.new));
            assignments.push(format!("{} = ?{}", change.field.as_str(), values.len()));
        }
        values.push(Value::Text(ctx.posted_at.to_rfc3339()));
        assignments.push(format!("updated_at = ?{}", values.len()));

        let mut conditions = Vec::new();
        for (column, value) in key_columns {
            values.push(Value::Text((*value).to_string()));
            conditions.push(format!("{} = ?{}", column, values.len()));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            table,
            assignments.join(", "),
            conditions.join(" AND ")
        );
        let affected = tx.execute(&sql, params_from_iter(values))?;
        if affected == 0 {
            let key = key_columns
                .iter()
                .map(|(_, v)| *v)
                .collect::<Vec<_>>()
                .join("/");
            return Err(RepositoryError::NotFound {
                entity: table.to_string(),
                key,
            });
        }
        Ok(())
    }

    /// 过账一张库存对账单并把 bin 设为绝对值
    fn post_reconciliation_tx(
        tx: &Transaction,
        target: &StockLevelRecord,
        current: Option<&StockLevelRecord>,
        ctx: &WriteContext,
    ) -> RepositoryResult<String> {
        let reconciliation_id = uuid::Uuid::new_v4().to_string();
        let posting_date = ctx.posted_at.date_naive().format("%Y-%m-%d").to_string();
        let posting_time = ctx.posted_at.format("%H:%M:%S").to_string();

        tx.execute(
            r#"
            INSERT INTO stock_reconciliation (
                reconciliation_id, batch_id, purpose, company, difference_account,
                posting_date, posting_time, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                reconciliation_id,
                ctx.batch_id,
                RECONCILIATION_PURPOSE,
                ctx.company,
                ctx.difference_account,
                posting_date,
                posting_time,
                ctx.posted_at,
            ],
        )?;

        tx.execute(
            r#"
            INSERT INTO stock_reconciliation_item (
                reconciliation_id, item_code, warehouse, qty, valuation_rate,
                current_qty, current_valuation_rate
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                reconciliation_id,
                target.item_code,
                target.warehouse,
                target.qty,
                target.valuation_rate,
                current.map(|c| c.qty),
                current.map(|c| c.valuation_rate),
            ],
        )?;

        tx.execute(
            r#"
            INSERT INTO stock_bin (warehouse, item_code, qty, valuation_rate, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(warehouse, item_code) DO UPDATE SET
                qty = excluded.qty,
                valuation_rate = excluded.valuation_rate,
                updated_at = excluded.updated_at
            "#,
            params![
                target.warehouse,
                target.item_code,
                target.qty,
                target.valuation_rate,
                ctx.posted_at,
            ],
        )?;

        Ok(reconciliation_id)
    }
}

fn to_sql_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::Text(v) => Value::Text(v.clone()),
        FieldValue::Number(v) => Value::Real(*v),
        FieldValue::Flag(v) => Value::Integer(i64::from(*v)),
        FieldValue::Empty => Value::Null,
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, key: &RecordKey) -> RepositoryResult<Option<Record>> {
        let conn = self.get_conn()?;
        let record = match key {
            RecordKey::Item { item_code } => Self::load_item(&conn, item_code)?.map(Record::Item),
            RecordKey::ItemPrice {
                price_list,
                item_code,
            } => Self::load_price(&conn, price_list, item_code)?.map(Record::ItemPrice),
            RecordKey::Stock {
                warehouse,
                item_code,
            } => Self::load_bin(&conn, warehouse, item_code)?.map(Record::Stock),
        };
        Ok(record)
    }

    async fn create(&self, record: &Record, ctx: &WriteContext) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        match record {
            Record::Item(item) => Self::insert_item_tx(&tx, item, ctx)?,
            Record::ItemPrice(price) => Self::insert_price_tx(&tx, price, ctx)?,
            Record::Stock(stock) => {
                let current = Self::load_bin(&tx, &stock.warehouse, &stock.item_code)?;
                let id = Self::post_reconciliation_tx(&tx, stock, current.as_ref(), ctx)?;
                debug!(reconciliation_id = %id, key = %record.key(), "库存对账单已过账");
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn update(
        &self,
        key: &RecordKey,
        diff: &FieldDiff,
        ctx: &WriteContext,
    ) -> RepositoryResult<()> {
        if diff.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        match key {
            RecordKey::Item { item_code } => {
                Self::update_columns_tx(&tx, "item", &[("item_code", item_code)], diff, ctx)?
            }
            RecordKey::ItemPrice {
                price_list,
                item_code,
            } => Self::update_columns_tx(
                &tx,
                "item_price",
                &[("price_list", price_list), ("item_code", item_code)],
                diff,
                ctx,
            )?,
            RecordKey::Stock {
                warehouse,
                item_code,
            } => {
                let current = Self::load_bin(&tx, warehouse, item_code)?.ok_or_else(|| {
                    RepositoryError::NotFound {
                        entity: "stock_bin".to_string(),
                        key: key.to_string(),
                    }
                })?;
                let mut target = Record::Stock(current.clone());
                target.apply_diff(diff);
                if let Record::Stock(target) = target {
                    let id = Self::post_reconciliation_tx(&tx, &target, Some(&current), ctx)?;
                    debug!(reconciliation_id = %id, key = %key, "库存对账单已过账");
                }
            }
        }

        tx.commit()?;
        Ok(())
    }

    async fn account(&self, name: &str) -> RepositoryResult<Option<AccountRecord>> {
        let conn = self.get_conn()?;
        let account = conn
            .query_row(
                "SELECT name, company, root_type, is_group FROM account WHERE name = ?1",
                params![name],
                |row| {
                    let root_type: Option<String> = row.get(2)?;
                    Ok(AccountRecord {
                        name: row.get(0)?,
                        company: row.get(1)?,
                        root_type: root_type.as_deref().and_then(AccountRootType::parse),
                        is_group: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    async fn save_import_log(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO import_batch (
                batch_id, file_name, total_rows, created_items, updated_items,
                created_prices, updated_prices, stock_reconciliations, error_rows,
                log_text, errors_json, imported_at, elapsed_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                batch.batch_id,
                batch.file_name,
                batch.total_rows,
                batch.created_items,
                batch.updated_items,
                batch.created_prices,
                batch.updated_prices,
                batch.stock_reconciliations,
                batch.error_rows,
                batch.log_text,
                batch.errors_json,
                batch.imported_at,
                batch.elapsed_ms,
            ],
        )?;
        Ok(())
    }

    async fn recent_import_logs(&self, limit: usize) -> RepositoryResult<Vec<ImportBatch>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT batch_id, file_name, total_rows, created_items, updated_items,
                   created_prices, updated_prices, stock_reconciliations, error_rows,
                   log_text, errors_json, imported_at, elapsed_ms
            FROM import_batch
            ORDER BY imported_at DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok(ImportBatch {
                batch_id: row.get(0)?,
                file_name: row.get(1)?,
                total_rows: row.get(2)?,
                created_items: row.get(3)?,
                updated_items: row.get(4)?,
                created_prices: row.get(5)?,
                updated_prices: row.get(6)?,
                stock_reconciliations: row.get(7)?,
                error_rows: row.get(8)?,
                log_text: row.get(9)?,
                errors_json: row.get(10)?,
                imported_at: row.get(11)?,
                elapsed_ms: row.get(12)?,
            })
        })?;

        let mut batches = Vec::new();
        for row in rows {
            batches.push(row?);
        }
        Ok(batches)
    }
}
