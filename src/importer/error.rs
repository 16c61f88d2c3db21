// ==========================================
// 批量物料导入系统 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 只有文件级结构错误会中止整次导入；
//       行级错误走 RowError，不经过本类型
// ==========================================

use crate::config::ConfigError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 导入模块错误类型（致命，调用方拿不到 ImportResult）
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 输入结构错误 =====
    #[error("文件 {file_name} 无法解析: {message}")]
    MalformedInput { file_name: String, message: String },

    // ===== 中止 =====
    #[error("导入已中止: {0}")]
    ImportAborted(String),

    // ===== 外部依赖错误 =====
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    #[error("记录存储错误: {0}")]
    Repository(#[from] RepositoryError),
}

impl ImportError {
    pub fn malformed(file_name: &str, message: impl Into<String>) -> Self {
        ImportError::MalformedInput {
            file_name: file_name.to_string(),
            message: message.into(),
        }
    }

    pub fn is_malformed_input(&self) -> bool {
        matches!(self, ImportError::MalformedInput { .. })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, ImportError::ImportAborted(_))
    }
}

/// Result 类型别名
pub type ImportOutcome<T> = Result<T, ImportError>;
