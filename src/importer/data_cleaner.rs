// ==========================================
// 批量物料导入系统 - 单元格清洗器实现
// ==========================================
// 职责: TRIM / 空值标准化 / 数值解析 / 是否标记解析
// ==========================================

use crate::domain::import::RowErrorReason;
use crate::domain::types::SemanticField;
use crate::importer::bulk_item_importer_trait::DataCleaner as DataCleanerTrait;

pub struct DataCleaner;

// ==========================================
// NumberFormat - 数值单元格写法
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberFormat {
    /// 逗号一律视为千分位
    #[default]
    CommaGrouping,
    /// 允许小数逗号（分号分隔的文件）
    DecimalComma,
}

impl NumberFormat {
    /// 按文件分隔符确定数值写法
    pub fn for_delimiter(delimiter: u8) -> Self {
        if delimiter == b';' {
            NumberFormat::DecimalComma
        } else {
            NumberFormat::CommaGrouping
        }
    }
}

impl DataCleanerTrait for DataCleaner {
    fn normalize_null(&self, value: Option<&str>) -> Option<String> {
        value.and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn parse_number(
        &self,
        field: SemanticField,
        value: Option<&str>,
        format: NumberFormat,
    ) -> Result<Option<f64>, RowErrorReason> {
        let raw = match self.normalize_null(value) {
            None => return Ok(None),
            Some(v) => v,
        };

        let invalid = || RowErrorReason::InvalidNumber {
            field,
            value: raw.clone(),
        };

        let canonical = canonical_number(&raw, format).ok_or_else(invalid)?;
        let number: f64 = canonical.parse().map_err(|_| invalid())?;
        if !number.is_finite() {
            return Err(invalid());
        }
        Ok(Some(number))
    }

    fn parse_flag(
        &self,
        field: SemanticField,
        value: Option<&str>,
    ) -> Result<Option<bool>, RowErrorReason> {
        let raw = match self.normalize_null(value) {
            None => return Ok(None),
            Some(v) => v,
        };

        match raw.to_lowercase().as_str() {
            "1" | "y" | "yes" | "true" => Ok(Some(true)),
            "0" | "n" | "no" | "false" => Ok(Some(false)),
            _ => Err(RowErrorReason::InvalidFlag { field, value: raw }),
        }
    }
}

/// 数值文本规整为 Rust 可解析形式
///
/// - 逗号默认视为千分位: "1,234" → "1234"，"1,234,567.5" → "1234567.5"
/// - 分号分隔文件中，不构成千分位的单个逗号视为小数逗号:
///   "10,5" → "10.5"，"1.234,5" → "1234.5"
fn canonical_number(raw: &str, format: NumberFormat) -> Option<String> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    // 只接受数字、符号、小数点、逗号、指数
    if !compact
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+' | 'e' | 'E'))
    {
        return None;
    }

    if !compact.contains(',') {
        return Some(compact);
    }

    if format == NumberFormat::DecimalComma && !is_thousands_grouped(&compact) {
        let (int_part, frac_part) = compact.split_once(',')?;
        if frac_part.contains(',') || frac_part.contains('.') {
            return None;
        }
        let (sign, digits) = split_sign(int_part);
        // 整数部分允许以点作千分位
        if digits.contains('.') && !is_grouped(digits, '.') {
            return None;
        }
        return Some(format!("{}{}.{}", sign, digits.replace('.', ""), frac_part));
    }

    Some(compact.replace(',', ""))
}

fn split_sign(value: &str) -> (&str, &str) {
    match value.strip_prefix(['-', '+']) {
        Some(rest) => (&value[..value.len() - rest.len()], rest),
        None => ("", value),
    }
}

/// "1,234" / "-12,345.50" 形式的千分位写法
fn is_thousands_grouped(value: &str) -> bool {
    let (_, digits) = split_sign(value);
    let int_part = match digits.split_once('.') {
        Some((int_part, frac)) if frac.chars().all(|c| c.is_ascii_digit()) => int_part,
        Some(_) => return false,
        None => digits,
    };
    int_part.contains(',') && is_grouped(int_part, ',')
}

/// 1~3 位数字开头，其后每组恰好 3 位
fn is_grouped(digits: &str, sep: char) -> bool {
    let mut groups = digits.split(sep);
    let head_ok = groups
        .next()
        .map(|g| (1..=3).contains(&g.len()) && g.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false);
    head_ok && groups.all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_null() {
        let cleaner = DataCleaner;
        assert_eq!(cleaner.normalize_null(Some("  ITM-1 ")), Some("ITM-1".to_string()));
        assert_eq!(cleaner.normalize_null(Some("   ")), None);
        assert_eq!(cleaner.normalize_null(None), None);
    }

    #[test]
    fn test_parse_number_formats() {
        let cleaner = DataCleaner;
        let rate = SemanticField::Rate;
        let fmt = NumberFormat::CommaGrouping;
        assert_eq!(cleaner.parse_number(rate, Some("10.00"), fmt).unwrap(), Some(10.0));
        assert_eq!(cleaner.parse_number(rate, Some("1,234.50"), fmt).unwrap(), Some(1234.5));
        assert_eq!(cleaner.parse_number(rate, Some(""), fmt).unwrap(), None);
        assert_eq!(cleaner.parse_number(rate, Some("-3"), fmt).unwrap(), Some(-3.0));
    }

    #[test]
    fn test_comma_is_grouping_by_default() {
        let cleaner = DataCleaner;
        let rate = SemanticField::Rate;
        let fmt = NumberFormat::CommaGrouping;
        assert_eq!(cleaner.parse_number(rate, Some("1,234"), fmt).unwrap(), Some(1234.0));
        assert_eq!(cleaner.parse_number(rate, Some("1,234,567"), fmt).unwrap(), Some(1234567.0));
        assert_eq!(cleaner.parse_number(rate, Some("10,5"), fmt).unwrap(), Some(105.0));
    }

    #[test]
    fn test_decimal_comma_in_semicolon_files() {
        let cleaner = DataCleaner;
        let rate = SemanticField::Rate;
        let fmt = NumberFormat::for_delimiter(b';');
        assert_eq!(fmt, NumberFormat::DecimalComma);
        assert_eq!(cleaner.parse_number(rate, Some("10,5"), fmt).unwrap(), Some(10.5));
        assert_eq!(cleaner.parse_number(rate, Some("-0,25"), fmt).unwrap(), Some(-0.25));
        assert_eq!(cleaner.parse_number(rate, Some("1.234,5"), fmt).unwrap(), Some(1234.5));
        // 合法千分位仍按千分位
        assert_eq!(cleaner.parse_number(rate, Some("1,234"), fmt).unwrap(), Some(1234.0));
        assert_eq!(cleaner.parse_number(rate, Some("1,234.5"), fmt).unwrap(), Some(1234.5));
        assert!(cleaner.parse_number(rate, Some("1,2,3"), fmt).is_err());
        assert_eq!(NumberFormat::for_delimiter(b','), NumberFormat::CommaGrouping);
    }

    #[test]
    fn test_parse_number_rejects_garbage() {
        let cleaner = DataCleaner;
        for bad in ["abc", "NaN", "inf", "$10", "1.2.3"] {
            let err = cleaner
                .parse_number(SemanticField::Quantity, Some(bad), NumberFormat::default())
                .unwrap_err();
            assert!(
                matches!(err, RowErrorReason::InvalidNumber { field: SemanticField::Quantity, .. }),
                "expected rejection for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_flag() {
        let cleaner = DataCleaner;
        let field = SemanticField::Disabled;
        assert_eq!(cleaner.parse_flag(field, Some("Yes")).unwrap(), Some(true));
        assert_eq!(cleaner.parse_flag(field, Some("0")).unwrap(), Some(false));
        assert_eq!(cleaner.parse_flag(field, None).unwrap(), None);
        assert!(cleaner.parse_flag(field, Some("maybe")).is_err());
    }
}
