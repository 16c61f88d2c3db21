// ==========================================
// 批量物料导入系统 - 领域模型层
// ==========================================
// 职责: 定义目标记录、导入中间结构、导入结果
// 红线: 不含数据访问逻辑,不含导入流程逻辑
// ==========================================

pub mod action;
pub mod import;
pub mod import_result;
pub mod record;
pub mod types;

// 重导出核心类型
pub use action::{Action, ActionOp, ImportPlan, PlanSummary, SkipReason};
pub use import::{
    ColumnMapping, ItemIntent, MappedColumn, NormalizedRecordIntent, PriceIntent, RawRow,
    RowError, RowErrorReason, StockIntent,
};
pub use import_result::{ImportBatch, ImportResult};
pub use record::{
    amounts_equal, AccountRecord, FieldChange, FieldDiff, FieldValue, ItemPriceRecord,
    ItemRecord, Record, RecordKey, StockLevelRecord,
};
pub use types::{AccountRootType, RecordKind, SemanticField};
