// ==========================================
// 批量物料导入系统 - 导入 Trait
// ==========================================
// 职责: 定义导入主接口与各阶段组件接口（不包含实现）
// ==========================================

use crate::domain::action::ImportPlan;
use crate::domain::import::{ColumnMapping, NormalizedRecordIntent, RawRow, RowError, RowErrorReason};
use crate::domain::import_result::ImportResult;
use crate::domain::types::SemanticField;
use crate::importer::data_cleaner::NumberFormat;
use crate::importer::error::ImportError;
use crate::importer::file_parser::CsvUpload;
use async_trait::async_trait;
use serde::Serialize;

/// detect_columns 的返回值（仅列名，供展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectedColumns {
    pub columns: Vec<String>,
}

// ==========================================
// BulkItemImporter Trait
// ==========================================
// 用途: 导入主接口
// 实现者: BulkItemImporterImpl
#[async_trait]
pub trait BulkItemImporter: Send + Sync {
    /// 读取表头列名（无副作用，可重复调用）
    ///
    /// # 返回
    /// - Err(MalformedInput): 文件无法解码或无表头
    fn detect_columns(&self, file: &CsvUpload) -> Result<DetectedColumns, ImportError>;

    /// 预览自动识别的列映射（无副作用）
    fn preview_mapping(&self, file: &CsvUpload) -> Result<ColumnMapping, ImportError>;

    /// 试运行: 读取 → 校验 → 对账，不写入
    ///
    /// # 返回
    /// - Ok(ImportPlan): 有序动作 + 行错误
    /// - Err(ImportAborted): 必填列未映射 / 差异科目非法
    async fn preview_import(&self, file: &CsvUpload) -> Result<ImportPlan, ImportError>;

    /// 完整导入（使用自动识别的映射）
    ///
    /// # 导入流程
    /// 1. CSV 读取（BOM / 分隔符识别）
    /// 2. 列映射识别
    /// 3. 逐行校验生成记录意图
    /// 4. 对账生成 Create / Update / Skip 动作
    /// 5. 按依赖顺序执行动作（单条失败不影响其余）
    /// 6. 生成并保存导入日志
    async fn import_csv(&self, file: &CsvUpload) -> Result<ImportResult, ImportError>;

    /// 完整导入（使用调用方调整过的映射）
    async fn import_csv_with_mapping(
        &self,
        file: &CsvUpload,
        mapping: ColumnMapping,
    ) -> Result<ImportResult, ImportError>;
}

// ==========================================
// ColumnDetector Trait
// ==========================================
// 用途: 表头 → 语义字段映射（纯函数）
// 实现者: SynonymColumnDetector
pub trait ColumnDetector: Send + Sync {
    fn detect(&self, header: &[String]) -> ColumnMapping;
}

// ==========================================
// RowNormalizer Trait
// ==========================================
// 用途: 原始行 → 记录意图（行内任一校验失败则整行失败）
// 实现者: RowNormalizerImpl
pub trait RowNormalizer: Send + Sync {
    /// # 参数
    /// - format: 数值单元格写法（由文件分隔符决定）
    ///
    /// # 返回
    /// - Ok(intents): 0~3 个意图（Item / Price / Stock）
    /// - Err(errors): 本行全部校验错误
    fn normalize(
        &self,
        header: &[String],
        mapping: &ColumnMapping,
        row: &RawRow,
        format: NumberFormat,
    ) -> Result<Vec<NormalizedRecordIntent>, Vec<RowError>>;
}

// ==========================================
// DataCleaner Trait
// ==========================================
// 用途: 单元格值清洗与类型转换
// 实现者: DataCleanerImpl
pub trait DataCleaner: Send + Sync {
    /// 标准化 NULL 值（空字符串/空白 → None，其余 TRIM）
    fn normalize_null(&self, value: Option<&str>) -> Option<String>;

    /// 解析数值（空值 → None；逗号按 format 解释）
    fn parse_number(
        &self,
        field: SemanticField,
        value: Option<&str>,
        format: NumberFormat,
    ) -> Result<Option<f64>, RowErrorReason>;

    /// 解析是/否标记（1/0, yes/no, true/false, y/n；空值 → None）
    fn parse_flag(
        &self,
        field: SemanticField,
        value: Option<&str>,
    ) -> Result<Option<bool>, RowErrorReason>;
}
