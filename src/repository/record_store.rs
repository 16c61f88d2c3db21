// ==========================================
// 批量物料导入系统 - 记录存储 Trait
// ==========================================
// 职责: 定义导入引擎所需的最小数据访问接口
// 红线: Repository 不含业务规则，只做按自然键的读写
// ==========================================

use crate::domain::import_result::ImportBatch;
use crate::domain::record::{AccountRecord, FieldDiff, Record, RecordKey};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ==========================================
// WriteContext - 单次导入的写入上下文
// ==========================================
// 库存对账单过账时使用（公司 / 差异科目 / 过账时间）
#[derive(Debug, Clone, PartialEq)]
pub struct WriteContext {
    pub batch_id: String,
    pub company: Option<String>,
    pub difference_account: Option<String>,
    pub posted_at: DateTime<Utc>,
}

impl WriteContext {
    pub fn new(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            company: None,
            difference_account: None,
            posted_at: Utc::now(),
        }
    }
}

// ==========================================
// RecordStore Trait
// ==========================================
// 实现者: SqliteRecordStore（使用 rusqlite）
// 引擎不持锁，也不假设独占存储；并发导入由存储自身的更新语义兜底
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 按自然键读取记录
    ///
    /// # 返回
    /// - Ok(Some(record)): 记录存在
    /// - Ok(None): 记录不存在
    async fn get(&self, key: &RecordKey) -> RepositoryResult<Option<Record>>;

    /// 新建记录（Stock 记录同时过账一张库存对账单）
    ///
    /// # 返回
    /// - Err: 约束违反等存储错误（由调用方转成行错误）
    async fn create(&self, record: &Record, ctx: &WriteContext) -> RepositoryResult<()>;

    /// 按自然键更新变化字段（Stock 记录同时过账一张库存对账单）
    async fn update(
        &self,
        key: &RecordKey,
        diff: &FieldDiff,
        ctx: &WriteContext,
    ) -> RepositoryResult<()>;

    /// 读取会计科目（差异科目校验）
    async fn account(&self, name: &str) -> RepositoryResult<Option<AccountRecord>>;

    /// 保存导入日志
    async fn save_import_log(&self, batch: &ImportBatch) -> RepositoryResult<()>;

    /// 查询最近的导入日志（按导入时间倒序）
    async fn recent_import_logs(&self, limit: usize) -> RepositoryResult<Vec<ImportBatch>>;
}
