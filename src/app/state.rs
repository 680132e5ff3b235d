// ==========================================
// 钢筋网片 ERP 集成层 - 应用状态
// ==========================================
// 职责: 打开共享数据库连接，装配配置与保存编排器
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::{ConfigManager, EngineConfig};
use crate::db::open_shared_connection;
use crate::engine::{BomDerivationEngine, EngineRepositories, SaveOrchestrator};

/// 应用状态
///
/// 持有共享连接、仓储集合与已加载的引擎参数
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    /// 仓储集合
    pub repos: EngineRepositories,

    /// 配置管理器
    pub config_manager: Arc<ConfigManager>,

    /// 引擎参数（启动时加载）
    pub engine_config: EngineConfig,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// 打开数据库（必要时建表）并加载 config_kv 中的引擎参数
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = open_shared_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;

        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone()));
        let engine_config = config_manager
            .load_engine_config()
            .map_err(|e| format!("加载引擎参数失败: {}", e))?;

        let repos = EngineRepositories::from_connection(conn.clone());

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            conn,
            repos,
            config_manager,
            engine_config,
        })
    }

    /// 保存编排器（每次调用使用当前参数）
    pub fn save_orchestrator(&self) -> SaveOrchestrator {
        SaveOrchestrator::new(self.repos.clone(), self.engine_config.clone())
    }

    pub fn bom_engine(&self) -> BomDerivationEngine {
        BomDerivationEngine::from_config(&self.engine_config)
    }

    /// 默认序列作用域（未配置时为 GLOBAL）
    pub fn default_scope(&self) -> String {
        self.config_manager
            .get_default_scope()
            .unwrap_or_else(|_| crate::config::DEFAULT_SCOPE_VALUE.to_string())
    }
}

/// 获取默认数据库路径
///
/// 优先使用环境变量 MESH_ERP_DB_PATH，其次用户数据目录，最后回退到当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("MESH_ERP_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./mesh_erp.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("mesh-erp");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("mesh_erp.db");
        }
    }

    path.to_string_lossy().to_string()
}
