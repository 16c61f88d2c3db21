// ==========================================
// 批量物料导入系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: CSV → 物料 / 价格 / 库存对账 的幂等导入引擎
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 记录与导入中间结构
pub mod domain;

// 数据仓储层 - 记录存储
pub mod repository;

// 导入层 - 读取 / 列映射 / 行校验 / 对账 / 执行
pub mod importer;

// 配置层 - 导入配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{RecordKind, SemanticField};

// 领域实体
pub use domain::{
    ColumnMapping, ImportBatch, ImportPlan, ImportResult, NormalizedRecordIntent, RawRow,
    Record, RecordKey, RowError, RowErrorReason,
};

// 导入引擎
pub use importer::{BulkItemImporter, BulkItemImporterImpl, CsvUpload, ImportError};

// 存储
pub use repository::{RecordStore, SqliteRecordStore};

// 配置
pub use config::{ConfigManager, ImportSettings};

// API
pub use api::{ApiError, ImportApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "批量物料导入系统";
