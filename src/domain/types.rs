// ==========================================
// 批量物料导入系统 - 领域类型定义
// ==========================================
// 职责: 语义字段、记录类型等基础枚举
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 语义字段 (Semantic Field)
// ==========================================
// 声明顺序即 ColumnMapping 的输出顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticField {
    // 物料主数据
    ItemCode,
    ItemName,
    ItemGroup,
    StockUom,
    Description,
    HsnCode,
    Barcode,
    Brand,
    Manufacturer,
    Disabled,
    IsStockItem,
    ItemTaxTemplate,

    // 价格
    PriceList,
    Rate,
    Currency,

    // 库存对账
    Warehouse,
    Quantity,
    ValuationRate,
}

impl SemanticField {
    pub const ALL: [SemanticField; 18] = [
        SemanticField::ItemCode,
        SemanticField::ItemName,
        SemanticField::ItemGroup,
        SemanticField::StockUom,
        SemanticField::Description,
        SemanticField::HsnCode,
        SemanticField::Barcode,
        SemanticField::Brand,
        SemanticField::Manufacturer,
        SemanticField::Disabled,
        SemanticField::IsStockItem,
        SemanticField::ItemTaxTemplate,
        SemanticField::PriceList,
        SemanticField::Rate,
        SemanticField::Currency,
        SemanticField::Warehouse,
        SemanticField::Quantity,
        SemanticField::ValuationRate,
    ];

    /// 字段标识（与数据库列/配置键保持一致）
    pub fn as_str(&self) -> &'static str {
        match self {
            SemanticField::ItemCode => "item_code",
            SemanticField::ItemName => "item_name",
            SemanticField::ItemGroup => "item_group",
            SemanticField::StockUom => "stock_uom",
            SemanticField::Description => "description",
            SemanticField::HsnCode => "gst_hsn_code",
            SemanticField::Barcode => "barcode",
            SemanticField::Brand => "brand",
            SemanticField::Manufacturer => "manufacturer",
            SemanticField::Disabled => "disabled",
            SemanticField::IsStockItem => "is_stock_item",
            SemanticField::ItemTaxTemplate => "item_tax_template",
            SemanticField::PriceList => "price_list",
            SemanticField::Rate => "price_list_rate",
            SemanticField::Currency => "currency",
            SemanticField::Warehouse => "warehouse",
            SemanticField::Quantity => "qty",
            SemanticField::ValuationRate => "valuation_rate",
        }
    }

    /// 按字段标识解析（大小写不敏感）
    pub fn parse(id: &str) -> Option<Self> {
        let id = id.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.as_str().eq_ignore_ascii_case(id))
    }

    /// 物料字段（不含主键 item_code）：任一有值即产生 ItemIntent
    pub fn is_item_field(&self) -> bool {
        matches!(
            self,
            SemanticField::ItemName
                | SemanticField::ItemGroup
                | SemanticField::StockUom
                | SemanticField::Description
                | SemanticField::HsnCode
                | SemanticField::Barcode
                | SemanticField::Brand
                | SemanticField::Manufacturer
                | SemanticField::Disabled
                | SemanticField::IsStockItem
                | SemanticField::ItemTaxTemplate
        )
    }

    /// 导入时必须映射的字段
    pub fn is_required(&self) -> bool {
        matches!(self, SemanticField::ItemCode)
    }

    /// 数值字段（需做数值解析）
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            SemanticField::Rate | SemanticField::Quantity | SemanticField::ValuationRate
        )
    }
}

impl fmt::Display for SemanticField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 记录类型 (Record Kind)
// ==========================================
// 依赖顺序: Item 先于 ItemPrice / StockReconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Item,
    ItemPrice,
    StockReconciliation,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Item => write!(f, "ITEM"),
            RecordKind::ItemPrice => write!(f, "ITEM_PRICE"),
            RecordKind::StockReconciliation => write!(f, "STOCK_RECONCILIATION"),
        }
    }
}

// ==========================================
// 科目根类型 (Account Root Type)
// ==========================================
// 库存对账差异科目只允许 Asset / Liability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountRootType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl AccountRootType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Asset" => Some(AccountRootType::Asset),
            "Liability" => Some(AccountRootType::Liability),
            "Equity" => Some(AccountRootType::Equity),
            "Income" => Some(AccountRootType::Income),
            "Expense" => Some(AccountRootType::Expense),
            _ => None,
        }
    }

    pub fn is_balance_sheet(&self) -> bool {
        matches!(self, AccountRootType::Asset | AccountRootType::Liability)
    }
}

impl fmt::Display for AccountRootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRootType::Asset => write!(f, "Asset"),
            AccountRootType::Liability => write!(f, "Liability"),
            AccountRootType::Equity => write!(f, "Equity"),
            AccountRootType::Income => write!(f, "Income"),
            AccountRootType::Expense => write!(f, "Expense"),
        }
    }
}
