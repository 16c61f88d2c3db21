// ==========================================
// 批量物料导入系统 - 导入层
// ==========================================
// 职责: CSV → 物料 / 价格 / 库存对账
// 流程: 读取 → 列映射 → 行校验 → 对账 → 执行
// ==========================================

// 模块声明
pub mod batch_applier;
pub mod bulk_item_importer_impl;
pub mod bulk_item_importer_trait;
pub mod column_detector;
pub mod data_cleaner;
pub mod error;
pub mod file_parser;
pub mod reconciliation;
pub mod row_normalizer;

// 重导出核心类型
pub use batch_applier::BatchApplier;
pub use bulk_item_importer_impl::BulkItemImporterImpl;
pub use column_detector::SynonymColumnDetector;
pub use data_cleaner::{DataCleaner as DataCleanerImpl, NumberFormat};
pub use error::{ImportError, ImportOutcome};
pub use file_parser::{CsvReader, CsvUpload, ParsedCsv};
pub use reconciliation::{PlanOutcome, ReconciliationEngine};
pub use row_normalizer::RowNormalizerImpl;

// 重导出 Trait 接口
pub use bulk_item_importer_trait::{
    BulkItemImporter, ColumnDetector, DataCleaner, DetectedColumns, RowNormalizer,
};
