// ==========================================
// 钢筋网片 ERP 集成层 - 配置层
// ==========================================
// 职责: 系统配置管理,支持按 key 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod engine_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, DEFAULT_SCOPE_VALUE};
pub use engine_config::{
    AllocationConfig, CoilTableRow, CuttingSpeedBucket, DurationConfig, EngineConfig,
    MatchingConfig, MaterialConfig, StandardSizeConfig, WeldingFit,
};
