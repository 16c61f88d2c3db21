// ==========================================
// 批量物料导入系统 - 导入器实现
// ==========================================
// 职责: 整合导入流程，从字节流到记录存储
// 流程: 读取 → 列映射 → 行校验 → 对账 → 执行 → 导入日志
// ==========================================

use crate::config::ImportSettings;
use crate::domain::action::{Action, ActionOp, ImportPlan, SkipReason};
use crate::domain::import::ColumnMapping;
use crate::domain::import_result::{ImportBatch, ImportResult};
use crate::domain::record::RecordKey;
use crate::domain::types::RecordKind;
use crate::importer::batch_applier::BatchApplier;
use crate::importer::bulk_item_importer_trait::{
    BulkItemImporter, ColumnDetector, DetectedColumns, RowNormalizer,
};
use crate::importer::column_detector::SynonymColumnDetector;
use crate::importer::data_cleaner::NumberFormat;
use crate::importer::error::ImportError;
use crate::importer::file_parser::{CsvReader, CsvUpload};
use crate::importer::reconciliation::ReconciliationEngine;
use crate::importer::row_normalizer::RowNormalizerImpl;
use crate::repository::record_store::{RecordStore, WriteContext};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// BulkItemImporterImpl - 导入器实现
// ==========================================
pub struct BulkItemImporterImpl<S>
where
    S: RecordStore,
{
    // 记录存储
    store: S,

    // 导入配置
    settings: ImportSettings,

    // 导入组件
    column_detector: Box<dyn ColumnDetector>,
    row_normalizer: Box<dyn RowNormalizer>,
}

impl<S> BulkItemImporterImpl<S>
where
    S: RecordStore,
{
    /// 使用默认组件创建导入器
    pub fn new(store: S, settings: ImportSettings) -> Self {
        let row_normalizer = Box::new(RowNormalizerImpl::new(settings.clone()));
        Self::with_components(store, settings, Box::new(SynonymColumnDetector), row_normalizer)
    }

    /// 创建导入器（自定义组件）
    ///
    /// # 参数
    /// - store: 记录存储
    /// - settings: 导入配置
    /// - column_detector: 列映射识别器
    /// - row_normalizer: 行校验器
    pub fn with_components(
        store: S,
        settings: ImportSettings,
        column_detector: Box<dyn ColumnDetector>,
        row_normalizer: Box<dyn RowNormalizer>,
    ) -> Self {
        Self {
            store,
            settings,
            column_detector,
            row_normalizer,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &ImportSettings {
        &self.settings
    }

    fn reader(&self) -> CsvReader {
        CsvReader::with_delimiter(self.settings.delimiter)
    }

    /// 读取 → 校验 → 对账（不写入）
    ///
    /// # 返回
    /// - (ImportPlan, 生效配置)
    async fn prepare(
        &self,
        file: &CsvUpload,
        mapping: Option<ColumnMapping>,
    ) -> Result<(ImportPlan, ImportSettings), ImportError> {
        // === 步骤 1: 读取 CSV ===
        let parsed = self.reader().parse(file)?;

        // === 步骤 2: 列映射 ===
        let mapping = mapping.unwrap_or_else(|| self.column_detector.detect(&parsed.header));
        let missing = mapping.missing_required();
        if !missing.is_empty() {
            let fields: Vec<String> = missing.iter().map(|f| f.to_string()).collect();
            error!(missing = ?fields, "必填字段未映射");
            return Err(ImportError::ImportAborted(format!(
                "必填字段未映射到任何列: {}",
                fields.join(", ")
            )));
        }

        // === 步骤 3: 配置校验（任何行处理之前）===
        let effective = self
            .settings
            .validate_against(&self.store)
            .await
            .map_err(|e| {
                error!(error = %e, "导入配置校验失败");
                ImportError::ImportAborted(e.to_string())
            })?;

        // === 步骤 4: 逐行校验 ===
        let number_format = NumberFormat::for_delimiter(parsed.delimiter);
        let mut plan = ImportPlan::default();
        let mut intents = Vec::new();
        let mut invalid_codes = BTreeSet::new();
        let mut invalid_rows = Vec::new();

        for next in parsed.rows {
            plan.total_rows += 1;
            let row = match next {
                Ok(row) => row,
                Err(row_error) => {
                    plan.row_errors.push(row_error);
                    continue;
                }
            };

            let normalized =
                self.row_normalizer
                    .normalize(&parsed.header, &mapping, &row, number_format);
            match normalized {
                Ok(row_intents) => intents.extend(row_intents),
                Err(errors) => {
                    debug!(row_number = row.row_number(), errors = errors.len(), "行校验失败");
                    // 无物料编码的行没有目标记录，只保留行错误
                    if let Some(code) = errors.iter().find_map(|e| e.item_code.clone()) {
                        invalid_rows.push(Action {
                            target: RecordKey::item(&code),
                            row_number: row.row_number(),
                            source_rows: vec![row.row_number()],
                            depends_on: None,
                            op: ActionOp::Skip(SkipReason::InvalidRow),
                        });
                        invalid_codes.insert(code);
                    }
                    plan.row_errors.extend(errors);
                }
            }
        }
        info!(
            total_rows = plan.total_rows,
            intents = intents.len(),
            invalid_rows = plan.row_errors.len(),
            "行校验完成"
        );

        // === 步骤 5: 对账 ===
        let outcome = ReconciliationEngine::new(&self.store, &effective)
            .plan(intents, &invalid_codes)
            .await;
        plan.actions = outcome.actions;
        plan.notes = outcome.notes;

        // 校验失败行的 Skip 排在 Item 段末尾，保持 Item 先于 Price / Stock
        let item_end = plan
            .actions
            .iter()
            .position(|a| a.kind() != RecordKind::Item)
            .unwrap_or(plan.actions.len());
        plan.actions.splice(item_end..item_end, invalid_rows);

        Ok((plan, effective))
    }

    #[instrument(skip(self, file, mapping), fields(file_name = %file.file_name, batch_id))]
    async fn run_import(
        &self,
        file: &CsvUpload,
        mapping: Option<ColumnMapping>,
    ) -> Result<ImportResult, ImportError> {
        let started = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());
        info!(batch_id = %batch_id, "开始导入");

        let (plan, effective) = self.prepare(file, mapping).await?;
        let summary = plan.summary();
        debug!(?summary, "导入计划");

        // === 步骤 6: 执行 ===
        let ctx = WriteContext {
            batch_id,
            company: effective.default_company.clone(),
            difference_account: effective.difference_account.clone(),
            posted_at: Utc::now(),
        };
        let result = BatchApplier::new(&self.store, ctx)
            .apply(&file.file_name, plan, started)
            .await;

        // === 步骤 7: 导入日志（失败不影响已写入的结果）===
        let batch = ImportBatch::from_result(&result, Utc::now());
        if let Err(e) = self.store.save_import_log(&batch).await {
            warn!(error = %e, "导入日志保存失败");
        }

        info!(
            applied = result.applied_count(),
            errors = result.errors.len(),
            elapsed_ms = result.elapsed_ms,
            "导入完成"
        );
        Ok(result)
    }
}

#[async_trait]
impl<S> BulkItemImporter for BulkItemImporterImpl<S>
where
    S: RecordStore,
{
    #[instrument(skip(self, file), fields(file_name = %file.file_name))]
    fn detect_columns(&self, file: &CsvUpload) -> Result<DetectedColumns, ImportError> {
        let parsed = self.reader().parse(file)?;
        Ok(DetectedColumns {
            columns: parsed.header,
        })
    }

    fn preview_mapping(&self, file: &CsvUpload) -> Result<ColumnMapping, ImportError> {
        let parsed = self.reader().parse(file)?;
        Ok(self.column_detector.detect(&parsed.header))
    }

    async fn preview_import(&self, file: &CsvUpload) -> Result<ImportPlan, ImportError> {
        let (plan, _) = self.prepare(file, None).await?;
        Ok(plan)
    }

    async fn import_csv(&self, file: &CsvUpload) -> Result<ImportResult, ImportError> {
        self.run_import(file, None).await
    }

    async fn import_csv_with_mapping(
        &self,
        file: &CsvUpload,
        mapping: ColumnMapping,
    ) -> Result<ImportResult, ImportError> {
        self.run_import(file, Some(mapping)).await
    }
}
