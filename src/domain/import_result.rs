// ==========================================
// 批量物料导入系统 - 导入结果与导入日志
// ==========================================
// ImportResult: 由 BatchApplier 在运行结束时一次性生成，之后只读
// ImportBatch: 持久化的导入日志（import_batch 表）
// ==========================================

use crate::domain::import::RowError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub batch_id: String,              // 批次 ID（UUID）
    pub file_name: String,             // 源文件名
    pub total_rows: usize,             // 读取的数据行数
    pub created_items: usize,
    pub updated_items: usize,
    pub created_prices: usize,
    pub updated_prices: usize,
    pub stock_reconciliations: usize,  // 已过账的库存对账单数
    pub unchanged: usize,              // 值一致而跳过的记录数
    pub skipped_updates: usize,        // 有差异但配置禁止更新的记录数
    pub errors: Vec<RowError>,         // 行级错误（按行号排序）
    pub notes: Vec<String>,            // 提示信息
    pub elapsed_ms: u64,
}

impl ImportResult {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// 创建 + 更新的记录总数
    pub fn applied_count(&self) -> usize {
        self.created_items
            + self.updated_items
            + self.created_prices
            + self.updated_prices
            + self.stock_reconciliations
    }

    /// 文本导入日志（Summary / Notes / Errors 三段）
    pub fn render_log(&self) -> String {
        let mut log = String::new();
        let _ = writeln!(log, "Summary");
        let _ = writeln!(log, "  文件: {}", self.file_name);
        let _ = writeln!(log, "  数据行: {}", self.total_rows);
        let _ = writeln!(log, "  新建物料: {}", self.created_items);
        let _ = writeln!(log, "  更新物料: {}", self.updated_items);
        let _ = writeln!(log, "  新建价格: {}", self.created_prices);
        let _ = writeln!(log, "  更新价格: {}", self.updated_prices);
        let _ = writeln!(log, "  库存对账单: {}", self.stock_reconciliations);
        let _ = writeln!(log, "  未变化: {}", self.unchanged);
        let _ = writeln!(log, "  禁止更新而跳过: {}", self.skipped_updates);
        let _ = writeln!(log, "  错误: {}", self.errors.len());

        if !self.notes.is_empty() {
            let _ = writeln!(log, "Notes");
            for note in &self.notes {
                let _ = writeln!(log, "  - {}", note);
            }
        }

        if !self.errors.is_empty() {
            let _ = writeln!(log, "Errors");
            for error in &self.errors {
                let _ = writeln!(log, "  - {}", error);
            }
        }
        log
    }
}

// ==========================================
// ImportBatch - 导入批次日志
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub file_name: String,
    pub total_rows: i64,
    pub created_items: i64,
    pub updated_items: i64,
    pub created_prices: i64,
    pub updated_prices: i64,
    pub stock_reconciliations: i64,
    pub error_rows: i64,
    pub log_text: String,
    pub errors_json: Option<String>,       // 行错误明细（JSON）
    pub imported_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl ImportBatch {
    pub fn from_result(result: &ImportResult, imported_at: DateTime<Utc>) -> Self {
        Self {
            batch_id: result.batch_id.clone(),
            file_name: result.file_name.clone(),
            total_rows: result.total_rows as i64,
            created_items: result.created_items as i64,
            updated_items: result.updated_items as i64,
            created_prices: result.created_prices as i64,
            updated_prices: result.updated_prices as i64,
            stock_reconciliations: result.stock_reconciliations as i64,
            error_rows: result.errors.len() as i64,
            log_text: result.render_log(),
            errors_json: if result.errors.is_empty() {
                None
            } else {
                serde_json::to_string(&result.errors).ok()
            },
            imported_at,
            elapsed_ms: result.elapsed_ms as i64,
        }
    }
}
