// ==========================================
// 批量物料导入系统 - 导入配置
// ==========================================
// 职责: 导入默认值与开关；差异科目校验
// 存储: config_kv 表（键见 config_keys）
// ==========================================

use crate::config::error::ConfigError;
use crate::repository::record_store::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// 配置键常量（scope_id='global'）
pub mod config_keys {
    pub const DELIMITER: &str = "import/delimiter";
    pub const UPDATE_EXISTING: &str = "import/update_existing";
    pub const SKIP_ITEM_PRICE: &str = "import/skip_item_price";
    pub const SKIP_STOCK_RECONCILIATION: &str = "import/skip_stock_reconciliation";
    pub const DEFAULT_PRICE_LIST: &str = "import/default_price_list";
    pub const DEFAULT_CURRENCY: &str = "import/default_currency";
    pub const DEFAULT_WAREHOUSE: &str = "import/default_warehouse";
    pub const DEFAULT_ITEM_GROUP: &str = "import/default_item_group";
    pub const DEFAULT_STOCK_UOM: &str = "import/default_stock_uom";
    pub const DEFAULT_COMPANY: &str = "import/default_company";
    pub const DIFFERENCE_ACCOUNT: &str = "import/difference_account";

    pub const ALL: [&str; 11] = [
        DELIMITER,
        UPDATE_EXISTING,
        SKIP_ITEM_PRICE,
        SKIP_STOCK_RECONCILIATION,
        DEFAULT_PRICE_LIST,
        DEFAULT_CURRENCY,
        DEFAULT_WAREHOUSE,
        DEFAULT_ITEM_GROUP,
        DEFAULT_STOCK_UOM,
        DEFAULT_COMPANY,
        DIFFERENCE_ACCOUNT,
    ];
}

pub const DEFAULT_PRICE_LIST: &str = "Standard Selling";
pub const DEFAULT_ITEM_GROUP: &str = "All Item Groups";
pub const DEFAULT_STOCK_UOM: &str = "Nos";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    pub delimiter: Option<u8>,                   // 指定分隔符（None = 自动识别）
    pub update_existing: bool,                   // 是否更新已有记录
    pub skip_item_price: bool,                   // 不导入价格
    pub skip_stock_reconciliation: bool,         // 不导入库存
    pub default_price_list: Option<String>,      // 价格表列缺失/为空时使用
    pub default_currency: Option<String>,
    pub default_warehouse: Option<String>,       // 仓库列缺失/为空时使用
    pub default_item_group: Option<String>,      // 新建物料的默认物料组
    pub default_stock_uom: Option<String>,       // 新建物料的默认单位
    pub default_company: Option<String>,
    pub difference_account: Option<String>,      // 库存对账差异科目
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            delimiter: None,
            update_existing: true,
            skip_item_price: false,
            skip_stock_reconciliation: false,
            default_price_list: Some(DEFAULT_PRICE_LIST.to_string()),
            default_currency: None,
            default_warehouse: None,
            default_item_group: Some(DEFAULT_ITEM_GROUP.to_string()),
            default_stock_uom: Some(DEFAULT_STOCK_UOM.to_string()),
            default_company: None,
            difference_account: None,
        }
    }
}

impl ImportSettings {
    /// 导入前校验差异科目
    ///
    /// # 规则
    /// - 未配置差异科目: 通过
    /// - 科目必须存在、非汇总科目、根类型为 Asset / Liability
    /// - 配置了公司时科目必须属于该公司；未配置时取科目所属公司
    ///
    /// # 返回
    /// - Ok(ImportSettings): 补全公司后的有效配置
    /// - Err(InvalidValue): 任一规则不满足（调用方中止导入）
    pub async fn validate_against<S: RecordStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<ImportSettings, ConfigError> {
        let mut effective = self.clone();

        let account_name = match &self.difference_account {
            None => {
                debug!("未配置差异科目，跳过校验");
                return Ok(effective);
            }
            Some(name) => name,
        };

        let invalid = |message: String| ConfigError::InvalidValue {
            key: config_keys::DIFFERENCE_ACCOUNT.to_string(),
            value: account_name.clone(),
            message,
        };

        let account = store
            .account(account_name)
            .await
            .map_err(|e| ConfigError::Lookup(e.to_string()))?
            .ok_or_else(|| invalid("科目不存在".to_string()))?;

        if account.is_group {
            return Err(invalid("不能使用汇总科目".to_string()));
        }

        match account.root_type {
            Some(root) if root.is_balance_sheet() => {}
            Some(root) => {
                return Err(invalid(format!(
                    "根类型必须为 Asset 或 Liability，实际为 {}",
                    root
                )))
            }
            None => return Err(invalid("科目缺少根类型".to_string())),
        }

        match (&self.default_company, &account.company) {
            (Some(company), Some(owner)) if company != owner => {
                return Err(invalid(format!("科目属于公司 {}，而非 {}", owner, company)));
            }
            (None, Some(owner)) => {
                warn!(company = %owner, "未配置公司，使用差异科目所属公司");
                effective.default_company = Some(owner.clone());
            }
            _ => {}
        }

        Ok(effective)
    }
}
