// ==========================================
// 批量物料导入系统 - 配置层
// ==========================================
// 职责: 导入配置加载与校验
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod error;
pub mod import_config_trait;
pub mod import_settings;

// 重导出核心配置管理器
pub use config_manager::ConfigManager;
pub use error::ConfigError;
pub use import_config_trait::ImportConfigReader;
pub use import_settings::{config_keys, ImportSettings};
