// ==========================================
// 钢筋网片 ERP 集成层 - 应用层
// ==========================================
// 职责: 装配数据库、配置与引擎，供命令行入口使用
// ==========================================

pub mod file_save;
pub mod state;

// 重导出
pub use file_save::FileSaveReport;
pub use state::{get_default_db_path, AppState};
