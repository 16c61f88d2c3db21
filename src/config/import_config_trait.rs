// ==========================================
// 批量物料导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::error::ConfigError;
use crate::config::import_settings::ImportSettings;
use async_trait::async_trait;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取导入配置（缺失项取默认值）
    ///
    /// # 默认值
    /// - update_existing = true
    /// - default_price_list = "Standard Selling"
    /// - default_item_group = "All Item Groups"
    /// - default_stock_uom = "Nos"
    async fn get_import_settings(&self) -> Result<ImportSettings, ConfigError>;
}
