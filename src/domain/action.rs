// ==========================================
// 批量物料导入系统 - 对账动作与导入计划
// ==========================================
// 职责: Reconciliation 输出的 Create / Update / Skip 动作
// 红线: 全部 Item 动作排在 Price / Stock 动作之前
// ==========================================

use crate::domain::import::{RowError, RowErrorReason};
use crate::domain::record::{FieldDiff, Record, RecordKey};
use crate::domain::types::RecordKind;
use serde::Serialize;
use std::fmt;

// ==========================================
// SkipReason - 跳过原因
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// 已有记录与目标值一致（不计入更新）
    Unchanged,
    /// 已有记录存在差异，但配置禁止更新
    UpdateDisabled,
    /// 无法执行（依赖失败、物料不存在、新建缺字段等），同时产生 RowError
    Rejected(RowErrorReason),
    /// 源行校验失败（行错误在校验阶段已记录）
    InvalidRow,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Unchanged => write!(f, "值未变化"),
            SkipReason::UpdateDisabled => write!(f, "已禁用更新"),
            SkipReason::Rejected(reason) => write!(f, "{}", reason),
            SkipReason::InvalidRow => write!(f, "行校验失败"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", content = "payload", rename_all = "snake_case")]
pub enum ActionOp {
    Create(Record),
    Update(FieldDiff),
    Skip(SkipReason),
}

// ==========================================
// Action - 单个目标记录的动作
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub target: RecordKey,            // 目标自然键
    pub row_number: usize,            // 最后一个贡献行
    pub source_rows: Vec<usize>,      // 所有贡献行（源顺序）
    pub depends_on: Option<String>,   // 本次导入内需先创建的物料编码
    pub op: ActionOp,
}

impl Action {
    pub fn kind(&self) -> RecordKind {
        self.target.kind()
    }

    pub fn item_code(&self) -> &str {
        self.target.item_code()
    }

    pub fn is_create(&self) -> bool {
        matches!(self.op, ActionOp::Create(_))
    }

    pub fn is_update(&self) -> bool {
        matches!(self.op, ActionOp::Update(_))
    }

    pub fn is_skip(&self) -> bool {
        matches!(self.op, ActionOp::Skip(_))
    }

    /// 被拒绝的 Skip 转成行错误
    pub fn rejection(&self) -> Option<RowError> {
        match &self.op {
            ActionOp::Skip(SkipReason::Rejected(reason)) => Some(RowError::new(
                self.row_number,
                Some(self.item_code().to_string()),
                reason.clone(),
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            ActionOp::Create(_) => write!(f, "CREATE {}", self.target),
            ActionOp::Update(diff) => {
                let fields: Vec<String> = diff.fields().iter().map(|f| f.to_string()).collect();
                write!(f, "UPDATE {} ({})", self.target, fields.join(", "))
            }
            ActionOp::Skip(reason) => write!(f, "SKIP {} ({})", self.target, reason),
        }
    }
}

// ==========================================
// ImportPlan - 导入计划（预览 / 执行共用）
// ==========================================
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportPlan {
    pub total_rows: usize,           // 读取的数据行数（不含空行）
    pub actions: Vec<Action>,        // 已排序的动作
    pub row_errors: Vec<RowError>,   // 读取/校验阶段的行错误
    pub notes: Vec<String>,          // 提示信息（重复键等）
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub item_creates: usize,
    pub item_updates: usize,
    pub price_creates: usize,
    pub price_updates: usize,
    pub stock_writes: usize,
    pub unchanged: usize,
    pub skipped_updates: usize,
    pub rejected: usize,
}

impl ImportPlan {
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for action in &self.actions {
            match (&action.op, action.kind()) {
                (ActionOp::Create(_), RecordKind::Item) => summary.item_creates += 1,
                (ActionOp::Update(_), RecordKind::Item) => summary.item_updates += 1,
                (ActionOp::Create(_), RecordKind::ItemPrice) => summary.price_creates += 1,
                (ActionOp::Update(_), RecordKind::ItemPrice) => summary.price_updates += 1,
                (ActionOp::Create(_), RecordKind::StockReconciliation)
                | (ActionOp::Update(_), RecordKind::StockReconciliation) => {
                    summary.stock_writes += 1
                }
                (ActionOp::Skip(SkipReason::Rejected(_)), _)
                | (ActionOp::Skip(SkipReason::InvalidRow), _) => summary.rejected += 1,
                (ActionOp::Skip(SkipReason::UpdateDisabled), _) => summary.skipped_updates += 1,
                (ActionOp::Skip(SkipReason::Unchanged), _) => summary.unchanged += 1,
            }
        }
        summary
    }

    /// 所有动作均为 Skip（重复导入同一文件时成立）
    pub fn is_noop(&self) -> bool {
        self.actions.iter().all(|a| a.is_skip())
    }
}
