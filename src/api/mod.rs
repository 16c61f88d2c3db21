// ==========================================
// 批量物料导入系统 - API 层
// ==========================================
// 职责: 提供按文件路径调用的业务接口,供 CLI 调用
// ==========================================

pub mod error;
pub mod import_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use import_api::{
    ImportApi, ImportApiResponse, ImportPreviewResponse, MappingEntry, MappingPreviewResponse,
};
