// ==========================================
// 批量物料导入系统 - 导入中间结构
// ==========================================
// 职责: RawRow / ColumnMapping / NormalizedRecordIntent / RowError
// 生命周期: 仅在单次 detect / import 调用内存在
// ==========================================

use crate::domain::record::{FieldValue, RecordKey};
use crate::domain::types::{RecordKind, SemanticField};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ==========================================
// RawRow - 原始数据行
// ==========================================
// 单元格与表头按位置对齐；解析后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawRow {
    row_number: usize,
    cells: Vec<String>,
}

impl RawRow {
    pub(crate) fn new(row_number: usize, cells: Vec<String>) -> Self {
        Self { row_number, cells }
    }

    /// 行号（表头为第 1 行，首个数据行为第 2 行）
    pub fn row_number(&self) -> usize {
        self.row_number
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// 取单元格；越界（短行）视为空
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(|s| s.as_str())
    }

    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

// ==========================================
// ColumnMapping - 语义字段 → 源列
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedColumn {
    pub column: String, // 源列名（原样）
    pub index: usize,   // 表头中的位置
}

/// 每个语义字段至多映射一列；按字段声明顺序输出
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    fields: BTreeMap<SemanticField, MappedColumn>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按列名构建映射（调用方手工调整映射时使用）
    ///
    /// # 返回
    /// - Err: 列名不在表头中，或同一字段重复指定
    pub fn from_columns<'a, I>(header: &[String], pairs: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (SemanticField, &'a str)>,
    {
        let mut mapping = Self::new();
        for (field, column) in pairs {
            let index = header
                .iter()
                .position(|h| h.trim() == column.trim())
                .ok_or_else(|| format!("表头中不存在列: {}", column))?;
            if !mapping.insert(field, header[index].clone(), index) {
                return Err(format!("字段 {} 被重复映射", field));
            }
        }
        Ok(mapping)
    }

    /// 插入映射；字段已被占用时保持原映射并返回 false
    pub fn insert(&mut self, field: SemanticField, column: String, index: usize) -> bool {
        if self.fields.contains_key(&field) {
            return false;
        }
        self.fields.insert(field, MappedColumn { column, index });
        true
    }

    pub fn get(&self, field: SemanticField) -> Option<&MappedColumn> {
        self.fields.get(&field)
    }

    pub fn column_name(&self, field: SemanticField) -> Option<&str> {
        self.fields.get(&field).map(|m| m.column.as_str())
    }

    pub fn contains(&self, field: SemanticField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SemanticField, &MappedColumn)> {
        self.fields.iter().map(|(f, m)| (*f, m))
    }

    /// 未映射的必填字段（导入时阻断）
    pub fn missing_required(&self) -> Vec<SemanticField> {
        SemanticField::ALL
            .iter()
            .copied()
            .filter(|f| f.is_required() && !self.contains(*f))
            .collect()
    }
}

// ==========================================
// NormalizedRecordIntent - 已校验的记录意图
// ==========================================
// 只能由 RowNormalizer 构造（crate 外不可字面量构造）

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct ItemIntent {
    pub row_number: usize,
    pub item_code: String,
    pub item_name: Option<String>,
    pub item_group: Option<String>,
    pub stock_uom: Option<String>,
    pub description: Option<String>,
    pub gst_hsn_code: Option<String>,
    pub barcode: Option<String>,
    pub brand: Option<String>,
    pub manufacturer: Option<String>,
    pub disabled: Option<bool>,
    pub is_stock_item: Option<bool>,
    pub item_tax_template: Option<String>,
}

impl ItemIntent {
    pub(crate) fn new(row_number: usize, item_code: String) -> Self {
        Self {
            row_number,
            item_code,
            item_name: None,
            item_group: None,
            stock_uom: None,
            description: None,
            gst_hsn_code: None,
            barcode: None,
            brand: None,
            manufacturer: None,
            disabled: None,
            is_stock_item: None,
            item_tax_template: None,
        }
    }

    /// 本行实际提供了值的物料字段
    pub fn provided_fields(&self) -> Vec<(SemanticField, FieldValue)> {
        let mut out = Vec::new();
        let mut text = |field: SemanticField, value: &Option<String>| {
            if let Some(v) = value {
                out.push((field, FieldValue::Text(v.clone())));
            }
        };
        text(SemanticField::ItemName, &self.item_name);
        text(SemanticField::ItemGroup, &self.item_group);
        text(SemanticField::StockUom, &self.stock_uom);
        text(SemanticField::Description, &self.description);
        text(SemanticField::HsnCode, &self.gst_hsn_code);
        text(SemanticField::Barcode, &self.barcode);
        text(SemanticField::Brand, &self.brand);
        text(SemanticField::Manufacturer, &self.manufacturer);
        text(SemanticField::ItemTaxTemplate, &self.item_tax_template);
        if let Some(v) = self.disabled {
            out.push((SemanticField::Disabled, FieldValue::Flag(v)));
        }
        if let Some(v) = self.is_stock_item {
            out.push((SemanticField::IsStockItem, FieldValue::Flag(v)));
        }
        out
    }

    /// 同一物料编码的后续行按字段覆盖（后行优先）
    pub(crate) fn merge_from(&mut self, later: &ItemIntent) {
        fn take<T: Clone>(slot: &mut Option<T>, later: &Option<T>) {
            if later.is_some() {
                *slot = later.clone();
            }
        }
        self.row_number = later.row_number;
        take(&mut self.item_name, &later.item_name);
        take(&mut self.item_group, &later.item_group);
        take(&mut self.stock_uom, &later.stock_uom);
        take(&mut self.description, &later.description);
        take(&mut self.gst_hsn_code, &later.gst_hsn_code);
        take(&mut self.barcode, &later.barcode);
        take(&mut self.brand, &later.brand);
        take(&mut self.manufacturer, &later.manufacturer);
        take(&mut self.disabled, &later.disabled);
        take(&mut self.is_stock_item, &later.is_stock_item);
        take(&mut self.item_tax_template, &later.item_tax_template);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct PriceIntent {
    pub row_number: usize,
    pub item_code: String,
    pub price_list: String,
    pub rate: f64,
    pub currency: Option<String>,
}

impl PriceIntent {
    pub(crate) fn merge_from(&mut self, later: &PriceIntent) {
        self.row_number = later.row_number;
        self.rate = later.rate;
        if later.currency.is_some() {
            self.currency = later.currency.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[non_exhaustive]
pub struct StockIntent {
    pub row_number: usize,
    pub item_code: String,
    pub warehouse: String,
    pub qty: f64,
    pub valuation_rate: Option<f64>,
}

impl StockIntent {
    pub(crate) fn merge_from(&mut self, later: &StockIntent) {
        self.row_number = later.row_number;
        self.qty = later.qty;
        if later.valuation_rate.is_some() {
            self.valuation_rate = later.valuation_rate;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NormalizedRecordIntent {
    Item(ItemIntent),
    Price(PriceIntent),
    Stock(StockIntent),
}

impl NormalizedRecordIntent {
    pub fn row_number(&self) -> usize {
        match self {
            NormalizedRecordIntent::Item(i) => i.row_number,
            NormalizedRecordIntent::Price(p) => p.row_number,
            NormalizedRecordIntent::Stock(s) => s.row_number,
        }
    }

    pub fn item_code(&self) -> &str {
        match self {
            NormalizedRecordIntent::Item(i) => &i.item_code,
            NormalizedRecordIntent::Price(p) => &p.item_code,
            NormalizedRecordIntent::Stock(s) => &s.item_code,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.key().kind()
    }

    pub fn key(&self) -> RecordKey {
        match self {
            NormalizedRecordIntent::Item(i) => RecordKey::item(&i.item_code),
            NormalizedRecordIntent::Price(p) => RecordKey::item_price(&p.price_list, &p.item_code),
            NormalizedRecordIntent::Stock(s) => RecordKey::stock(&s.warehouse, &s.item_code),
        }
    }
}

// ==========================================
// RowError - 行级错误（非致命）
// ==========================================
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum RowErrorReason {
    #[error("缺少物料编码")]
    MissingItemCode,

    #[error("字段 {field} 不是有效数值: {value}")]
    InvalidNumber { field: SemanticField, value: String },

    #[error("字段 {field} 不能为负数: {value}")]
    NegativeValue { field: SemanticField, value: f64 },

    #[error("字段 {field} 不是有效的是/否标记: {value}")]
    InvalidFlag { field: SemanticField, value: String },

    #[error("新建物料缺少必填字段 {field}")]
    MissingRequiredForNew { field: SemanticField },

    #[error("物料不存在，且本次导入未创建该物料")]
    ItemNotFound,

    #[error("依赖失败: 所属物料未能创建")]
    DependencyFailed,

    #[error("读取已有记录失败: {0}")]
    LookupFailed(String),

    #[error("写入失败: {0}")]
    ApplyFailed(String),

    #[error("CSV 记录解析失败: {0}")]
    MalformedRecord(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub row_number: usize,             // 原始文件行号
    pub item_code: Option<String>,     // 物料编码（如果可解析）
    pub reason: RowErrorReason,        // 错误原因
}

impl RowError {
    pub fn new(row_number: usize, item_code: Option<String>, reason: RowErrorReason) -> Self {
        Self {
            row_number,
            item_code,
            reason,
        }
    }

    pub fn is_dependency_failure(&self) -> bool {
        matches!(self.reason, RowErrorReason::DependencyFailed)
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item_code {
            Some(code) => write!(f, "第 {} 行 [{}]: {}", self.row_number, code, self.reason),
            None => write!(f, "第 {} 行: {}", self.row_number, self.reason),
        }
    }
}
