// ==========================================
// 批量物料导入系统 - 配置管理器
// ==========================================
// 职责: 导入配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::error::ConfigError;
use crate::config::import_config_trait::ImportConfigReader;
use crate::config::import_settings::{config_keys, ImportSettings};
use crate::db::{configure_sqlite_connection, ensure_schema, open_sqlite_connection};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// 配置作用域（目前只有 global）
pub const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ConfigError::ReadError(format!("锁获取失败: {}", e)))?;
            configure_sqlite_connection(&guard)?;
            ensure_schema(&guard)?;
        }

        Ok(Self { conn })
    }

    fn get_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, ConfigError> {
        self.conn
            .lock()
            .map_err(|e| ConfigError::ReadError(format!("锁获取失败: {}", e)))
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入配置值（覆盖）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 获取所有导入配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, ConfigError> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT key, value FROM config_kv WHERE scope_id = ?1 AND key LIKE 'import/%' ORDER BY key",
        )?;

        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        serde_json::to_string(&config_map).map_err(|e| ConfigError::ReadError(e.to_string()))
    }

    // ===== 类型化读取 =====

    fn get_text(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self
            .get_config_value(key)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }

    fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get_text(key)? {
            None => Ok(default),
            Some(raw) => match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "y" => Ok(true),
                "0" | "false" | "no" | "n" => Ok(false),
                _ => Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                    message: "期望布尔值".to_string(),
                }),
            },
        }
    }

    fn get_delimiter(&self) -> Result<Option<u8>, ConfigError> {
        match self.get_text(config_keys::DELIMITER)? {
            None => Ok(None),
            Some(raw) => match raw.as_str() {
                "," | "comma" => Ok(Some(b',')),
                ";" | "semicolon" => Ok(Some(b';')),
                _ => Err(ConfigError::InvalidValue {
                    key: config_keys::DELIMITER.to_string(),
                    value: raw,
                    message: "仅支持逗号或分号".to_string(),
                }),
            },
        }
    }

    /// 文本配置：未配置时取默认值；显式配置为空白表示不使用默认
    fn get_text_or(&self, key: &str, default: Option<String>) -> Result<Option<String>, ConfigError> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => {
                let trimmed = raw.trim();
                Ok(if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                })
            }
        }
    }

    /// 从 config_kv 组装导入配置
    pub fn load_import_settings(&self) -> Result<ImportSettings, ConfigError> {
        let defaults = ImportSettings::default();
        Ok(ImportSettings {
            delimiter: self.get_delimiter()?,
            update_existing: self.get_bool(config_keys::UPDATE_EXISTING, defaults.update_existing)?,
            skip_item_price: self.get_bool(config_keys::SKIP_ITEM_PRICE, defaults.skip_item_price)?,
            skip_stock_reconciliation: self.get_bool(
                config_keys::SKIP_STOCK_RECONCILIATION,
                defaults.skip_stock_reconciliation,
            )?,
            default_price_list: self
                .get_text_or(config_keys::DEFAULT_PRICE_LIST, defaults.default_price_list)?,
            default_currency: self.get_text(config_keys::DEFAULT_CURRENCY)?,
            default_warehouse: self.get_text(config_keys::DEFAULT_WAREHOUSE)?,
            default_item_group: self
                .get_text_or(config_keys::DEFAULT_ITEM_GROUP, defaults.default_item_group)?,
            default_stock_uom: self
                .get_text_or(config_keys::DEFAULT_STOCK_UOM, defaults.default_stock_uom)?,
            default_company: self.get_text(config_keys::DEFAULT_COMPANY)?,
            difference_account: self.get_text(config_keys::DIFFERENCE_ACCOUNT)?,
        })
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_import_settings(&self) -> Result<ImportSettings, ConfigError> {
        self.load_import_settings()
    }
}
