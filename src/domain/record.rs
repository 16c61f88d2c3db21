// ==========================================
// 批量物料导入系统 - 目标记录模型
// ==========================================
// 职责: Item / Item Price / 库存水位 记录、自然键、字段差异
// 红线: 记录只通过自然键寻址
// ==========================================

use crate::domain::types::{AccountRootType, RecordKind, SemanticField};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 数值比较精度（数据库 REAL 往返后的误差容忍）
pub const AMOUNT_EPSILON: f64 = 1e-9;

pub fn amounts_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= AMOUNT_EPSILON
}

// ==========================================
// ItemRecord - 物料主数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub item_code: String,                  // 物料编码（自然键）
    pub item_name: String,                  // 物料名称
    pub item_group: String,                 // 物料组
    pub stock_uom: String,                  // 库存单位
    pub description: Option<String>,        // 描述
    pub gst_hsn_code: Option<String>,       // HSN 编码
    pub barcode: Option<String>,            // 条码
    pub brand: Option<String>,              // 品牌
    pub manufacturer: Option<String>,       // 制造商
    pub disabled: bool,                     // 是否停用
    pub is_stock_item: bool,                // 是否库存物料
    pub item_tax_template: Option<String>,  // 物料税模板
}

impl ItemRecord {
    pub fn field(&self, field: SemanticField) -> Option<FieldValue> {
        let text = |v: &Option<String>| Some(FieldValue::from_optional_text(v.clone()));
        match field {
            SemanticField::ItemCode => Some(FieldValue::Text(self.item_code.clone())),
            SemanticField::ItemName => Some(FieldValue::Text(self.item_name.clone())),
            SemanticField::ItemGroup => Some(FieldValue::Text(self.item_group.clone())),
            SemanticField::StockUom => Some(FieldValue::Text(self.stock_uom.clone())),
            SemanticField::Description => text(&self.description),
            SemanticField::HsnCode => text(&self.gst_hsn_code),
            SemanticField::Barcode => text(&self.barcode),
            SemanticField::Brand => text(&self.brand),
            SemanticField::Manufacturer => text(&self.manufacturer),
            SemanticField::Disabled => Some(FieldValue::Flag(self.disabled)),
            SemanticField::IsStockItem => Some(FieldValue::Flag(self.is_stock_item)),
            SemanticField::ItemTaxTemplate => text(&self.item_tax_template),
            _ => None,
        }
    }

    fn set_field(&mut self, field: SemanticField, value: &FieldValue) {
        match field {
            SemanticField::ItemName => self.item_name = value.as_text().unwrap_or_default(),
            SemanticField::ItemGroup => self.item_group = value.as_text().unwrap_or_default(),
            SemanticField::StockUom => self.stock_uom = value.as_text().unwrap_or_default(),
            SemanticField::Description => self.description = value.as_text(),
            SemanticField::HsnCode => self.gst_hsn_code = value.as_text(),
            SemanticField::Barcode => self.barcode = value.as_text(),
            SemanticField::Brand => self.brand = value.as_text(),
            SemanticField::Manufacturer => self.manufacturer = value.as_text(),
            SemanticField::Disabled => self.disabled = value.as_flag().unwrap_or(false),
            SemanticField::IsStockItem => self.is_stock_item = value.as_flag().unwrap_or(true),
            SemanticField::ItemTaxTemplate => self.item_tax_template = value.as_text(),
            _ => {}
        }
    }
}

// ==========================================
// ItemPriceRecord - 价格表条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPriceRecord {
    pub price_list: String,        // 价格表
    pub item_code: String,         // 物料编码
    pub currency: Option<String>,  // 币种
    pub price_list_rate: f64,      // 价格
}

// ==========================================
// StockLevelRecord - 仓库库存水位
// ==========================================
// 由库存对账单写入（绝对值快照）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevelRecord {
    pub warehouse: String,      // 仓库
    pub item_code: String,      // 物料编码
    pub qty: f64,               // 在库数量
    pub valuation_rate: f64,    // 计价单价
}

// ==========================================
// AccountRecord - 会计科目（仅用于差异科目校验）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub name: String,
    pub company: Option<String>,
    pub root_type: Option<AccountRootType>,
    pub is_group: bool,
}

// ==========================================
// RecordKey - 自然键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordKey {
    Item { item_code: String },
    ItemPrice { price_list: String, item_code: String },
    Stock { warehouse: String, item_code: String },
}

impl RecordKey {
    pub fn item(item_code: impl Into<String>) -> Self {
        RecordKey::Item {
            item_code: item_code.into(),
        }
    }

    pub fn item_price(price_list: impl Into<String>, item_code: impl Into<String>) -> Self {
        RecordKey::ItemPrice {
            price_list: price_list.into(),
            item_code: item_code.into(),
        }
    }

    pub fn stock(warehouse: impl Into<String>, item_code: impl Into<String>) -> Self {
        RecordKey::Stock {
            warehouse: warehouse.into(),
            item_code: item_code.into(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            RecordKey::Item { .. } => RecordKind::Item,
            RecordKey::ItemPrice { .. } => RecordKind::ItemPrice,
            RecordKey::Stock { .. } => RecordKind::StockReconciliation,
        }
    }

    pub fn item_code(&self) -> &str {
        match self {
            RecordKey::Item { item_code }
            | RecordKey::ItemPrice { item_code, .. }
            | RecordKey::Stock { item_code, .. } => item_code,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Item { item_code } => write!(f, "Item[{}]", item_code),
            RecordKey::ItemPrice {
                price_list,
                item_code,
            } => write!(f, "ItemPrice[{}/{}]", price_list, item_code),
            RecordKey::Stock {
                warehouse,
                item_code,
            } => write!(f, "Stock[{}/{}]", warehouse, item_code),
        }
    }
}

// ==========================================
// Record - 目标记录（也用作 Create 的完整载荷）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Item(ItemRecord),
    ItemPrice(ItemPriceRecord),
    Stock(StockLevelRecord),
}

impl Record {
    pub fn key(&self) -> RecordKey {
        match self {
            Record::Item(item) => RecordKey::item(&item.item_code),
            Record::ItemPrice(price) => RecordKey::item_price(&price.price_list, &price.item_code),
            Record::Stock(stock) => RecordKey::stock(&stock.warehouse, &stock.item_code),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.key().kind()
    }

    /// 读取记录上的字段值（不属于该记录类型的字段返回 None）
    pub fn field(&self, field: SemanticField) -> Option<FieldValue> {
        match self {
            Record::Item(item) => item.field(field),
            Record::ItemPrice(price) => match field {
                SemanticField::Rate => Some(FieldValue::Number(price.price_list_rate)),
                SemanticField::Currency => {
                    Some(FieldValue::from_optional_text(price.currency.clone()))
                }
                _ => None,
            },
            Record::Stock(stock) => match field {
                SemanticField::Quantity => Some(FieldValue::Number(stock.qty)),
                SemanticField::ValuationRate => Some(FieldValue::Number(stock.valuation_rate)),
                _ => None,
            },
        }
    }

    /// 将差异应用到记录上（差异中的 new 值覆盖原值）
    pub fn apply_diff(&mut self, diff: &FieldDiff) {
        for change in diff.iter() {
            match self {
                Record::Item(item) => item.set_field(change.field, &change.new),
                Record::ItemPrice(price) => match change.field {
                    SemanticField::Rate => {
                        price.price_list_rate = change.new.as_number().unwrap_or(0.0)
                    }
                    SemanticField::Currency => price.currency = change.new.as_text(),
                    _ => {}
                },
                Record::Stock(stock) => match change.field {
                    SemanticField::Quantity => stock.qty = change.new.as_number().unwrap_or(0.0),
                    SemanticField::ValuationRate => {
                        stock.valuation_rate = change.new.as_number().unwrap_or(0.0)
                    }
                    _ => {}
                },
            }
        }
    }
}

// ==========================================
// FieldValue - 字段值
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
    Empty,
}

impl FieldValue {
    pub fn from_optional_text(value: Option<String>) -> Self {
        value.map(FieldValue::Text).unwrap_or(FieldValue::Empty)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Text(v) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            FieldValue::Flag(v) => Some(*v),
            _ => None,
        }
    }

    /// 语义相等（数值按精度比较）
    pub fn same_as(&self, other: &FieldValue) -> bool {
        match (self, other) {
            (FieldValue::Number(a), FieldValue::Number(b)) => amounts_equal(*a, *b),
            _ => self == other,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(v) => write!(f, "{}", v),
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Flag(v) => write!(f, "{}", if *v { 1 } else { 0 }),
            FieldValue::Empty => write!(f, ""),
        }
    }
}

// ==========================================
// FieldDiff - 字段差异（Update 只携带变化字段）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: SemanticField,
    pub old: FieldValue,
    pub new: FieldValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    changes: Vec<FieldChange>,
}

impl FieldDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// 值不同才记录
    pub fn record(&mut self, field: SemanticField, old: FieldValue, new: FieldValue) {
        if old.same_as(&new) {
            return;
        }
        self.changes.push(FieldChange { field, old, new });
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.changes.iter()
    }

    pub fn get(&self, field: SemanticField) -> Option<&FieldChange> {
        self.changes.iter().find(|c| c.field == field)
    }

    pub fn fields(&self) -> Vec<SemanticField> {
        self.changes.iter().map(|c| c.field).collect()
    }
}
