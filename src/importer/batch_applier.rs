// ==========================================
// 批量物料导入系统 - 批量执行器
// ==========================================
// 阶段 4: 按计划顺序执行动作
// 红线: 单条失败记为 RowError，不中断后续动作；
//       计数只在存储确认成功后递增
// ==========================================

use crate::domain::action::{ActionOp, ImportPlan, SkipReason};
use crate::domain::import::{RowError, RowErrorReason};
use crate::domain::import_result::ImportResult;
use crate::domain::types::RecordKind;
use crate::repository::record_store::{RecordStore, WriteContext};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

// ==========================================
// ImportTally - 运行期累计（仅本模块可变）
// ==========================================
#[derive(Debug, Default)]
struct ImportTally {
    created_items: usize,
    updated_items: usize,
    created_prices: usize,
    updated_prices: usize,
    stock_reconciliations: usize,
    unchanged: usize,
    skipped_updates: usize,
    errors: Vec<RowError>,
}

impl ImportTally {
    fn record_success(&mut self, kind: RecordKind, created: bool) {
        match (kind, created) {
            (RecordKind::Item, true) => self.created_items += 1,
            (RecordKind::Item, false) => self.updated_items += 1,
            (RecordKind::ItemPrice, true) => self.created_prices += 1,
            (RecordKind::ItemPrice, false) => self.updated_prices += 1,
            (RecordKind::StockReconciliation, _) => self.stock_reconciliations += 1,
        }
    }

    fn finish(mut self, plan_meta: PlanMeta, ctx: &WriteContext, started: Instant) -> ImportResult {
        let mut errors = plan_meta.row_errors;
        errors.append(&mut self.errors);
        // 稳定排序：同一行内保持发生顺序
        errors.sort_by_key(|e| e.row_number);

        ImportResult {
            batch_id: ctx.batch_id.clone(),
            file_name: plan_meta.file_name,
            total_rows: plan_meta.total_rows,
            created_items: self.created_items,
            updated_items: self.updated_items,
            created_prices: self.created_prices,
            updated_prices: self.updated_prices,
            stock_reconciliations: self.stock_reconciliations,
            unchanged: self.unchanged,
            skipped_updates: self.skipped_updates,
            errors,
            notes: plan_meta.notes,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}

struct PlanMeta {
    file_name: String,
    total_rows: usize,
    row_errors: Vec<RowError>,
    notes: Vec<String>,
}

// ==========================================
// BatchApplier
// ==========================================
pub struct BatchApplier<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    ctx: WriteContext,
}

impl<'a, S: RecordStore + ?Sized> BatchApplier<'a, S> {
    pub fn new(store: &'a S, ctx: WriteContext) -> Self {
        Self { store, ctx }
    }

    /// 执行计划并生成导入结果
    ///
    /// # 说明
    /// - 物料新建失败后，本次运行中依赖它的 Price / Stock 动作记为依赖失败
    /// - 计划中已被拒绝的动作直接转成行错误
    #[instrument(skip_all, fields(batch_id = %self.ctx.batch_id, actions = plan.actions.len()))]
    pub async fn apply(&self, file_name: &str, plan: ImportPlan, started: Instant) -> ImportResult {
        let mut tally = ImportTally::default();
        let mut failed_items: BTreeSet<String> = BTreeSet::new();

        for action in &plan.actions {
            if let Some(code) = &action.depends_on {
                if failed_items.contains(code) {
                    debug!(key = %action.target, "物料新建失败，跳过依赖动作");
                    tally.errors.push(RowError::new(
                        action.row_number,
                        Some(code.clone()),
                        RowErrorReason::DependencyFailed,
                    ));
                    continue;
                }
            }

            let kind = action.kind();
            let outcome = match &action.op {
                ActionOp::Create(record) => Some((self.store.create(record, &self.ctx).await, true)),
                ActionOp::Update(diff) => {
                    Some((self.store.update(&action.target, diff, &self.ctx).await, false))
                }
                ActionOp::Skip(SkipReason::Rejected(_)) => {
                    if let Some(error) = action.rejection() {
                        tally.errors.push(error);
                    }
                    None
                }
                ActionOp::Skip(SkipReason::UpdateDisabled) => {
                    debug!(key = %action.target, "已禁用更新，跳过");
                    tally.skipped_updates += 1;
                    None
                }
                ActionOp::Skip(SkipReason::InvalidRow) => {
                    // 行错误已在校验阶段记录
                    None
                }
                ActionOp::Skip(SkipReason::Unchanged) => {
                    debug!(key = %action.target, "值未变化，跳过");
                    tally.unchanged += 1;
                    None
                }
            };

            match outcome {
                Some((Ok(()), created)) => {
                    debug!(key = %action.target, created, "写入成功");
                    tally.record_success(kind, created);
                }
                Some((Err(e), created)) => {
                    warn!(key = %action.target, row_number = action.row_number, error = %e, "写入失败");
                    if kind == RecordKind::Item && created {
                        failed_items.insert(action.item_code().to_string());
                    }
                    tally.errors.push(RowError::new(
                        action.row_number,
                        Some(action.item_code().to_string()),
                        RowErrorReason::ApplyFailed(e.to_string()),
                    ));
                }
                None => {}
            }
        }

        let meta = PlanMeta {
            file_name: file_name.to_string(),
            total_rows: plan.total_rows,
            row_errors: plan.row_errors,
            notes: plan.notes,
        };
        let result = tally.finish(meta, &self.ctx, started);

        info!(
            created_items = result.created_items,
            updated_items = result.updated_items,
            created_prices = result.created_prices,
            updated_prices = result.updated_prices,
            stock_reconciliations = result.stock_reconciliations,
            unchanged = result.unchanged,
            skipped_updates = result.skipped_updates,
            errors = result.errors.len(),
            elapsed_ms = result.elapsed_ms,
            "批量执行完成"
        );
        result
    }
}
