// ==========================================
// 批量物料导入系统 - 行校验与意图生成
// ==========================================
// 阶段 2: RawRow + ColumnMapping → NormalizedRecordIntent
// 红线: 行内任一校验失败则整行不产生意图；不中断后续行
// ==========================================

use crate::config::ImportSettings;
use crate::domain::import::{
    ColumnMapping, ItemIntent, NormalizedRecordIntent, PriceIntent, RawRow, RowError,
    RowErrorReason, StockIntent,
};
use crate::domain::types::SemanticField;
use crate::importer::bulk_item_importer_trait::{DataCleaner, RowNormalizer};
use crate::importer::data_cleaner::{DataCleaner as DataCleanerImpl, NumberFormat};
use tracing::debug;

pub struct RowNormalizerImpl {
    cleaner: Box<dyn DataCleaner>,
    settings: ImportSettings,
}

impl RowNormalizerImpl {
    pub fn new(settings: ImportSettings) -> Self {
        Self::with_cleaner(Box::new(DataCleanerImpl), settings)
    }

    pub fn with_cleaner(cleaner: Box<dyn DataCleaner>, settings: ImportSettings) -> Self {
        Self { cleaner, settings }
    }

    /// 提取单元格（未映射 / 短行 → None）
    fn cell<'a>(
        header: &[String],
        mapping: &ColumnMapping,
        row: &'a RawRow,
        field: SemanticField,
    ) -> Option<&'a str> {
        mapping
            .get(field)
            .filter(|m| m.index < header.len())
            .and_then(|m| row.cell(m.index))
    }

    /// 非负数值字段
    fn non_negative(
        &self,
        field: SemanticField,
        raw: Option<&str>,
        format: NumberFormat,
        errors: &mut Vec<RowErrorReason>,
    ) -> Option<f64> {
        match self.cleaner.parse_number(field, raw, format) {
            Ok(Some(value)) if value < 0.0 => {
                errors.push(RowErrorReason::NegativeValue { field, value });
                None
            }
            Ok(value) => value,
            Err(reason) => {
                errors.push(reason);
                None
            }
        }
    }

    fn flag(
        &self,
        field: SemanticField,
        raw: Option<&str>,
        errors: &mut Vec<RowErrorReason>,
    ) -> Option<bool> {
        self.cleaner.parse_flag(field, raw).unwrap_or_else(|reason| {
            errors.push(reason);
            None
        })
    }

    /// 列值为空时回退到配置默认值
    fn with_default(&self, value: Option<String>, default: &Option<String>) -> Option<String> {
        value.or_else(|| self.cleaner.normalize_null(default.as_deref()))
    }
}

impl RowNormalizer for RowNormalizerImpl {
    fn normalize(
        &self,
        header: &[String],
        mapping: &ColumnMapping,
        row: &RawRow,
        format: NumberFormat,
    ) -> Result<Vec<NormalizedRecordIntent>, Vec<RowError>> {
        let row_number = row.row_number();
        let cell = |field| Self::cell(header, mapping, row, field);
        let text = |field| self.cleaner.normalize_null(cell(field));
        let mut errors = Vec::new();

        let item_code = text(SemanticField::ItemCode);
        if item_code.is_none() {
            errors.push(RowErrorReason::MissingItemCode);
        }

        // ===== 物料字段 =====
        let mut item = ItemIntent::new(row_number, item_code.clone().unwrap_or_default());
        item.item_name = text(SemanticField::ItemName);
        item.item_group = text(SemanticField::ItemGroup);
        item.stock_uom = text(SemanticField::StockUom);
        item.description = text(SemanticField::Description);
        item.gst_hsn_code = text(SemanticField::HsnCode);
        item.barcode = text(SemanticField::Barcode);
        item.brand = text(SemanticField::Brand);
        item.manufacturer = text(SemanticField::Manufacturer);
        item.item_tax_template = text(SemanticField::ItemTaxTemplate);
        item.disabled = self.flag(SemanticField::Disabled, cell(SemanticField::Disabled), &mut errors);
        item.is_stock_item =
            self.flag(SemanticField::IsStockItem, cell(SemanticField::IsStockItem), &mut errors);

        // ===== 数值字段 =====
        let number = |field: SemanticField, errors: &mut Vec<RowErrorReason>| {
            self.non_negative(field, cell(field), format, errors)
        };
        let rate = number(SemanticField::Rate, &mut errors);
        let qty = number(SemanticField::Quantity, &mut errors);
        let valuation_rate = number(SemanticField::ValuationRate, &mut errors);

        if !errors.is_empty() {
            return Err(errors
                .into_iter()
                .map(|reason| RowError::new(row_number, item_code.clone(), reason))
                .collect());
        }

        // 上面已保证存在
        let item_code = match item_code {
            Some(code) => code,
            None => return Ok(Vec::new()),
        };

        let mut intents = Vec::new();

        if !item.provided_fields().is_empty() {
            intents.push(NormalizedRecordIntent::Item(item));
        }

        let price_list = self.with_default(text(SemanticField::PriceList), &self.settings.default_price_list);
        match (rate, price_list) {
            (Some(_), _) if self.settings.skip_item_price => {
                debug!(row_number, item_code = %item_code, "已配置跳过价格导入");
            }
            (Some(rate), Some(price_list)) => {
                intents.push(NormalizedRecordIntent::Price(PriceIntent {
                    row_number,
                    item_code: item_code.clone(),
                    price_list,
                    rate,
                    currency: self.with_default(
                        text(SemanticField::Currency),
                        &self.settings.default_currency,
                    ),
                }));
            }
            (Some(_), None) => {
                debug!(row_number, item_code = %item_code, "有价格但无价格表，忽略");
            }
            (None, _) => {}
        }

        let warehouse = self.with_default(text(SemanticField::Warehouse), &self.settings.default_warehouse);
        match (qty, warehouse) {
            (Some(_), _) if self.settings.skip_stock_reconciliation => {
                debug!(row_number, item_code = %item_code, "已配置跳过库存对账");
            }
            (Some(qty), Some(warehouse)) => {
                intents.push(NormalizedRecordIntent::Stock(StockIntent {
                    row_number,
                    item_code: item_code.clone(),
                    warehouse,
                    qty,
                    valuation_rate,
                }));
            }
            (Some(_), None) => {
                debug!(row_number, item_code = %item_code, "有数量但无仓库，忽略");
            }
            (None, _) => {}
        }

        Ok(intents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::bulk_item_importer_trait::ColumnDetector;
    use crate::importer::column_detector::SynonymColumnDetector;

    fn header(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(n: usize, cells: &[&str]) -> RawRow {
        RawRow::new(n, cells.iter().map(|s| s.to_string()).collect())
    }

    fn normalize_with(
        settings: ImportSettings,
        names: &[&str],
        cells: &[&str],
        format: NumberFormat,
    ) -> Result<Vec<NormalizedRecordIntent>, Vec<RowError>> {
        let h = header(names);
        let mapping = SynonymColumnDetector.detect(&h);
        RowNormalizerImpl::new(settings).normalize(&h, &mapping, &row(2, cells), format)
    }

    fn normalize(
        settings: ImportSettings,
        names: &[&str],
        cells: &[&str],
    ) -> Result<Vec<NormalizedRecordIntent>, Vec<RowError>> {
        normalize_with(settings, names, cells, NumberFormat::CommaGrouping)
    }

    const FULL: &[&str] = &["Item Code", "Item Name", "Rate", "Qty", "Warehouse"];

    #[test]
    fn test_row_yields_three_intents() {
        let intents = normalize(
            ImportSettings::default(),
            FULL,
            &["ITM-1", "Widget", "10.00", "5", "WH-1"],
        )
        .unwrap();

        assert_eq!(intents.len(), 3);
        match &intents[1] {
            NormalizedRecordIntent::Price(p) => {
                assert_eq!(p.price_list, "Standard Selling");
                assert_eq!(p.rate, 10.0);
            }
            other => panic!("unexpected intent: {:?}", other),
        }
        match &intents[2] {
            NormalizedRecordIntent::Stock(s) => {
                assert_eq!(s.warehouse, "WH-1");
                assert_eq!(s.qty, 5.0);
                assert_eq!(s.valuation_rate, None);
            }
            other => panic!("unexpected intent: {:?}", other),
        }
    }

    #[test]
    fn test_code_only_row_yields_nothing() {
        let intents = normalize(ImportSettings::default(), FULL, &["ITM-1", "", "", "", ""]).unwrap();
        assert!(intents.is_empty());
    }

    #[test]
    fn test_quantity_without_warehouse_ignored() {
        let intents =
            normalize(ImportSettings::default(), FULL, &["ITM-1", "", "", "5", ""]).unwrap();
        assert!(intents.is_empty());

        let settings = ImportSettings {
            default_warehouse: Some("Stores".to_string()),
            ..ImportSettings::default()
        };
        let intents = normalize(settings, FULL, &["ITM-1", "", "", "5", ""]).unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].key().to_string(), "Stock[Stores/ITM-1]");
    }

    #[test]
    fn test_missing_code_and_bad_rate_collected() {
        let errors = normalize(ImportSettings::default(), FULL, &["", "Widget", "abc", "-1", "WH-1"])
            .unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.row_number == 2 && e.item_code.is_none()));
        assert_eq!(errors[0].reason, RowErrorReason::MissingItemCode);
        assert!(matches!(errors[2].reason, RowErrorReason::NegativeValue { .. }));
    }

    #[test]
    fn test_error_keeps_item_code() {
        let errors = normalize(ImportSettings::default(), FULL, &["ITM-9", "Widget", "x", "", ""])
            .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].item_code.as_deref(), Some("ITM-9"));
    }

    #[test]
    fn test_zero_quantity_allowed() {
        let intents =
            normalize(ImportSettings::default(), FULL, &["ITM-1", "", "", "0", "WH-1"]).unwrap();
        assert_eq!(intents.len(), 1);
    }

    #[test]
    fn test_skip_flags_suppress_intents() {
        let settings = ImportSettings {
            skip_item_price: true,
            skip_stock_reconciliation: true,
            ..ImportSettings::default()
        };
        let intents = normalize(settings, FULL, &["ITM-1", "Widget", "10", "5", "WH-1"]).unwrap();
        assert_eq!(intents.len(), 1);
        assert!(matches!(intents[0], NormalizedRecordIntent::Item(_)));
    }

    #[test]
    fn test_flags_and_currency() {
        let names = &["SKU", "Disabled", "Price", "Currency"];
        let intents =
            normalize(ImportSettings::default(), names, &["ITM-1", "yes", "3.5", "INR"]).unwrap();
        match (&intents[0], &intents[1]) {
            (NormalizedRecordIntent::Item(i), NormalizedRecordIntent::Price(p)) => {
                assert_eq!(i.disabled, Some(true));
                assert_eq!(p.rate, 3.5);
                assert_eq!(p.currency.as_deref(), Some("INR"));
            }
            other => panic!("unexpected intents: {:?}", other),
        }
    }

    #[test]
    fn test_number_format_is_forwarded() {
        let cells = &["ITM-1", "Widget", "1,250", "2,5", "WH-1"];
        let grouped = normalize(ImportSettings::default(), FULL, cells).unwrap();
        let decimal =
            normalize_with(ImportSettings::default(), FULL, cells, NumberFormat::DecimalComma).unwrap();

        match (&grouped[1], &grouped[2]) {
            (NormalizedRecordIntent::Price(p), NormalizedRecordIntent::Stock(s)) => {
                assert_eq!(p.rate, 1250.0);
                assert_eq!(s.qty, 25.0);
            }
            other => panic!("unexpected intents: {:?}", other),
        }
        match (&decimal[1], &decimal[2]) {
            (NormalizedRecordIntent::Price(p), NormalizedRecordIntent::Stock(s)) => {
                assert_eq!(p.rate, 1250.0);
                assert_eq!(s.qty, 2.5);
            }
            other => panic!("unexpected intents: {:?}", other),
        }
    }
}
