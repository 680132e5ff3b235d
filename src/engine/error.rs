// ==========================================
// 钢筋网片 ERP 集成层 - 引擎错误类型
// ==========================================
// 工具: thiserror 派生宏
// 约定: 单项错误只记入该项报告，不中断批次
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// 规格不完整或取值非法（分配前拒绝）
    #[error("规格校验失败 ({field}): {message}")]
    Validation { field: String, message: String },

    /// 编码冲突重试耗尽
    #[error("编码分配失败: {code} 冲突 {attempts} 次后放弃")]
    AllocationExhausted { code: String, attempts: u32 },

    /// 瞬时错误重试耗尽
    #[error("{operation} 重试 {attempts} 次后仍失败: {message}")]
    TransientExhausted {
        operation: String,
        attempts: u32,
        message: String,
    },

    /// 目录中已存在同编码但规格不同的条目
    #[error("编码 {code} 已被其他规格占用")]
    CodeTaken { code: String },

    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// 报告中的错误分类
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation { .. } => "VALIDATION_ERROR",
            EngineError::AllocationExhausted { .. } | EngineError::CodeTaken { .. } => {
                "CONFLICT_ERROR"
            }
            EngineError::TransientExhausted { .. } => "TRANSIENT_IO_ERROR",
            EngineError::Repository(_) => "REPOSITORY_ERROR",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
