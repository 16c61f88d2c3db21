// ==========================================
// 批量物料导入系统 - 列映射识别
// ==========================================
// 规则: 忽略大小写 / 空白 / 标点后与同义词表精确匹配
//       从左到右扫描，先匹配的列胜出；每个字段至多一列
// ==========================================

use crate::domain::import::ColumnMapping;
use crate::domain::types::SemanticField;
use crate::importer::bulk_item_importer_trait::ColumnDetector;
use tracing::debug;

/// 同义词表（已规整：小写、仅字母数字）
const SYNONYMS: &[(SemanticField, &[&str])] = &[
    (SemanticField::ItemCode, &["itemcode", "code", "sku"]),
    (SemanticField::ItemName, &["itemname", "item", "name"]),
    (SemanticField::ItemGroup, &["itemgroup", "group"]),
    (SemanticField::StockUom, &["stockuom", "uom"]),
    (SemanticField::Description, &["description"]),
    (SemanticField::HsnCode, &["gsthsncode", "hsn", "hsncode"]),
    (SemanticField::Barcode, &["barcode"]),
    (SemanticField::Brand, &["brand"]),
    (SemanticField::Manufacturer, &["manufacturer"]),
    (SemanticField::Disabled, &["disabled"]),
    (SemanticField::IsStockItem, &["isstockitem", "isstock"]),
    (SemanticField::ItemTaxTemplate, &["itemtax", "itemtaxtemplate"]),
    (SemanticField::PriceList, &["pricelist"]),
    (
        SemanticField::Rate,
        &["pricelistrate", "standardsellingrate", "standardrate", "rate", "price"],
    ),
    (SemanticField::Currency, &["currency"]),
    (SemanticField::Warehouse, &["warehouse"]),
    (
        SemanticField::Quantity,
        &["openingqty", "openingstock", "qty", "quantity"],
    ),
    (SemanticField::ValuationRate, &["valuationrate", "valuation"]),
];

/// 列名规整: 小写并去掉所有非字母数字字符
pub fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// 规整后的列名对应的语义字段
pub fn lookup_field(normalized: &str) -> Option<SemanticField> {
    SYNONYMS
        .iter()
        .find(|(_, names)| names.contains(&normalized))
        .map(|(field, _)| *field)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SynonymColumnDetector;

impl ColumnDetector for SynonymColumnDetector {
    fn detect(&self, header: &[String]) -> ColumnMapping {
        let mut mapping = ColumnMapping::new();

        for (index, column) in header.iter().enumerate() {
            let normalized = normalize_header(column);
            if normalized.is_empty() {
                continue;
            }
            if let Some(field) = lookup_field(&normalized) {
                if !mapping.insert(field, column.clone(), index) {
                    debug!(column = %column, field = %field, "字段已被左侧列占用，忽略");
                }
            }
        }

        debug!(mapped = mapping.len(), columns = header.len(), "列映射识别完成");
        mapping
    }
}
