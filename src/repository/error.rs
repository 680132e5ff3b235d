// ==========================================
// 钢筋网片 ERP 集成层 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 冲突/未找到/瞬时错误是控制流，用 StoreOutcome 表达，不走 Err
// ==========================================

use rusqlite::ErrorCode;
use thiserror::Error;

/// 仓储层错误类型（不可恢复部分）
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束违反: {0}")]
    UniqueConstraintViolation(String),

    #[error("数据库繁忙: {0}")]
    Busy(String),

    // ===== 数据质量错误 =====
    #[error("字段值错误 (field={field}): {message}")]
    FieldValueError { field: String, message: String },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg) => {
                let msg = msg.clone().unwrap_or_else(|| err.to_string());
                match e.code {
                    ErrorCode::ConstraintViolation if msg.contains("UNIQUE") => {
                        RepositoryError::UniqueConstraintViolation(msg)
                    }
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => {
                        RepositoryError::Busy(msg)
                    }
                    _ => RepositoryError::DatabaseQueryError(msg),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;

// ==========================================
// StoreOutcome - 仓储调用的带标签结果
// ==========================================
// Found: 成功（查询命中 / 创建成功 / 更新成功）
// NotFound: 目标不存在（按 id 更新/删除）
// Conflict: 唯一约束冲突，尽量带回已存在的记录
// TransientError: 超时/繁忙，可退避重试
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOutcome<T> {
    Found(T),
    NotFound,
    Conflict(Option<T>),
    TransientError(String),
}

impl<T> StoreOutcome<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, StoreOutcome::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            StoreOutcome::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> StoreOutcome<U> {
        match self {
            StoreOutcome::Found(v) => StoreOutcome::Found(f(v)),
            StoreOutcome::NotFound => StoreOutcome::NotFound,
            StoreOutcome::Conflict(v) => StoreOutcome::Conflict(v.map(f)),
            StoreOutcome::TransientError(msg) => StoreOutcome::TransientError(msg),
        }
    }
}

/// 将写操作结果归类为 StoreOutcome
///
/// 唯一约束 → Conflict(None)，繁忙/锁 → TransientError，其余错误向上抛出
pub fn classify_write<T>(result: rusqlite::Result<T>) -> RepositoryResult<StoreOutcome<T>> {
    match result {
        Ok(value) => Ok(StoreOutcome::Found(value)),
        Err(err) => match RepositoryError::from(err) {
            RepositoryError::UniqueConstraintViolation(_) => Ok(StoreOutcome::Conflict(None)),
            RepositoryError::Busy(msg) => Ok(StoreOutcome::TransientError(msg)),
            other => Err(other),
        },
    }
}
