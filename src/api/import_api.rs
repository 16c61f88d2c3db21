// ==========================================
// 批量物料导入系统 - 导入API
// ==========================================
// 职责: 封装导入相关功能（按文件路径调用），供 CLI 使用
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{config_keys, ConfigManager, ImportConfigReader};
use crate::domain::action::{ImportPlan, PlanSummary};
use crate::domain::import::{ColumnMapping, RowError};
use crate::domain::import_result::{ImportBatch, ImportResult};
use crate::domain::types::SemanticField;
use crate::importer::{BulkItemImporter, BulkItemImporterImpl, CsvUpload};
use crate::repository::{RecordStore, SqliteRecordStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// 列映射条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    /// 语义字段标识
    pub field: String,
    /// 源列名
    pub column: String,
    /// 表头中的位置（从 0 开始）
    pub index: usize,
}

/// 列映射预览响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingPreviewResponse {
    /// 文件表头（原样）
    pub columns: Vec<String>,
    /// 识别出的映射
    pub mapping: Vec<MappingEntry>,
    /// 未被映射的列
    pub unmapped_columns: Vec<String>,
    /// 未映射的必填字段
    pub missing_required: Vec<String>,
}

/// 导入预览响应（不写入）
#[derive(Debug, Clone, Serialize)]
pub struct ImportPreviewResponse {
    pub total_rows: usize,
    pub summary: PlanSummary,
    /// 动作描述（按执行顺序）
    pub actions: Vec<String>,
    pub row_errors: Vec<RowError>,
    pub notes: Vec<String>,
}

impl From<&ImportPlan> for ImportPreviewResponse {
    fn from(plan: &ImportPlan) -> Self {
        let mut row_errors = plan.row_errors.clone();
        row_errors.extend(plan.actions.iter().filter_map(|a| a.rejection()));
        row_errors.sort_by_key(|e| e.row_number);

        Self {
            total_rows: plan.total_rows,
            summary: plan.summary(),
            actions: plan.actions.iter().map(|a| a.to_string()).collect(),
            row_errors,
            notes: plan.notes.clone(),
        }
    }
}

/// 导入API响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportApiResponse {
    pub result: ImportResult,
    /// 可读导入日志
    pub log_text: String,
}

/// 导入API
pub struct ImportApi {
    db_path: String,
}

impl ImportApi {
    /// 创建新的ImportApi实例
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// 创建导入器（每次调用重新读取配置）
    async fn create_importer(&self) -> ApiResult<BulkItemImporterImpl<SqliteRecordStore>> {
        let config = ConfigManager::new(&self.db_path)?;
        let settings = config.get_import_settings().await?;
        let store = SqliteRecordStore::new(&self.db_path)?;
        Ok(BulkItemImporterImpl::new(store, settings))
    }

    fn load_upload(file_path: &str) -> ApiResult<CsvUpload> {
        let is_csv = Path::new(file_path)
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            return Err(ApiError::InvalidInput(
                "当前仅支持 .csv 格式文件导入".to_string(),
            ));
        }
        Ok(CsvUpload::from_path(file_path)?)
    }

    /// 读取表头列名
    pub async fn detect_columns(&self, file_path: &str) -> ApiResult<Vec<String>> {
        let upload = Self::load_upload(file_path)?;
        let importer = self.create_importer().await?;
        Ok(importer.detect_columns(&upload)?.columns)
    }

    /// 预览自动识别的列映射
    pub async fn preview_mapping(&self, file_path: &str) -> ApiResult<MappingPreviewResponse> {
        let upload = Self::load_upload(file_path)?;
        let importer = self.create_importer().await?;
        let columns = importer.detect_columns(&upload)?.columns;
        let mapping = importer.preview_mapping(&upload)?;

        let mapped: Vec<MappingEntry> = mapping
            .iter()
            .map(|(field, m)| MappingEntry {
                field: field.as_str().to_string(),
                column: m.column.clone(),
                index: m.index,
            })
            .collect();
        let unmapped_columns = columns
            .iter()
            .enumerate()
            .filter(|(idx, _)| !mapped.iter().any(|m| m.index == *idx))
            .map(|(_, c)| c.clone())
            .collect();
        let missing_required = mapping
            .missing_required()
            .iter()
            .map(|f| f.as_str().to_string())
            .collect();

        Ok(MappingPreviewResponse {
            columns,
            mapping: mapped,
            unmapped_columns,
            missing_required,
        })
    }

    /// 预览导入计划（不写入）
    pub async fn preview_import(&self, file_path: &str) -> ApiResult<ImportPreviewResponse> {
        let upload = Self::load_upload(file_path)?;
        let importer = self.create_importer().await?;
        let plan = importer.preview_import(&upload).await?;
        Ok(ImportPreviewResponse::from(&plan))
    }

    /// 导入 CSV（自动识别列映射）
    ///
    /// # 返回
    /// - Ok(ImportApiResponse): 导入结果（可能包含行错误）
    /// - Err(ApiError): 输入格式错误 / 导入中止 / 存储不可用
    pub async fn import_csv(&self, file_path: &str) -> ApiResult<ImportApiResponse> {
        let upload = Self::load_upload(file_path)?;
        let importer = self.create_importer().await?;
        let result = importer.import_csv(&upload).await?;
        Ok(Self::respond(result))
    }

    /// 导入 CSV（使用手工指定的列映射）
    ///
    /// # 参数
    /// - overrides: (字段标识, 源列名) 列表，例如 ("qty", "On Hand")；
    ///   未指定的字段沿用自动识别结果
    pub async fn import_csv_with_mapping(
        &self,
        file_path: &str,
        overrides: &[(String, String)],
    ) -> ApiResult<ImportApiResponse> {
        let upload = Self::load_upload(file_path)?;
        let importer = self.create_importer().await?;
        let header = importer.detect_columns(&upload)?.columns;

        let mut pairs = Vec::with_capacity(overrides.len());
        for (field_id, column) in overrides {
            let field = SemanticField::parse(field_id)
                .ok_or_else(|| ApiError::InvalidInput(format!("未知字段: {}", field_id)))?;
            pairs.push((field, column.as_str()));
        }
        let manual = ColumnMapping::from_columns(&header, pairs).map_err(ApiError::InvalidInput)?;

        // 手工映射优先，其余字段取自动识别中未冲突的列
        let mut mapping = manual.clone();
        for (field, m) in importer.preview_mapping(&upload)?.iter() {
            let column_taken = manual.iter().any(|(_, taken)| taken.index == m.index);
            if !column_taken {
                mapping.insert(field, m.column.clone(), m.index);
            }
        }
        info!(fields = mapping.len(), "使用手工列映射导入");

        let result = importer.import_csv_with_mapping(&upload, mapping).await?;
        Ok(Self::respond(result))
    }

    /// 查询最近的导入日志
    pub async fn recent_import_logs(&self, limit: usize) -> ApiResult<Vec<ImportBatch>> {
        if limit == 0 {
            return Err(ApiError::InvalidInput("limit 必须大于 0".to_string()));
        }
        let store = SqliteRecordStore::new(&self.db_path)?;
        Ok(store.recent_import_logs(limit.min(100)).await?)
    }

    /// 设置导入配置项（仅允许已知的 import/ 键）
    pub fn set_import_config(&self, key: &str, value: &str) -> ApiResult<()> {
        if !config_keys::ALL.contains(&key) {
            return Err(ApiError::InvalidInput(format!("未知配置项: {}", key)));
        }
        let config = ConfigManager::new(&self.db_path)?;
        let previous = config.get_config_value(key)?;
        config.set_config_value(key, value)?;

        // 写入后立即校验；无法解析时恢复原值
        if let Err(e) = config.load_import_settings() {
            config.set_config_value(key, previous.as_deref().unwrap_or(""))?;
            return Err(e.into());
        }
        Ok(())
    }

    /// 导入配置快照（JSON）
    pub fn get_import_config_snapshot(&self) -> ApiResult<String> {
        Ok(ConfigManager::new(&self.db_path)?.get_config_snapshot()?)
    }

    fn respond(result: ImportResult) -> ImportApiResponse {
        let log_text = result.render_log();
        ImportApiResponse { result, log_text }
    }
}
