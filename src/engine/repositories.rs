// ==========================================
// 钢筋网片 ERP 集成层 - 引擎层仓储聚合
// ==========================================
// 职责: 聚合分配/保存流程所需的三个仓储接口
// 约定: 引擎只依赖 trait，不假设具体持久化技术
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::repository::{
    BomLineStore, CatalogStore, SequenceCounterStore, SqliteBomLineRepository,
    SqliteCatalogRepository, SqliteSequenceCounterRepository,
};

/// 引擎仓储集合
///
/// 将目录、BOM 行、序列计数器三个仓储合并为一个参数，
/// 测试时可整体替换为注入故障的实现。
#[derive(Clone)]
pub struct EngineRepositories {
    /// 产品目录
    pub catalog: Arc<dyn CatalogStore>,
    /// BOM 行
    pub bom: Arc<dyn BomLineStore>,
    /// 序列计数器
    pub sequence: Arc<dyn SequenceCounterStore>,
}

impl EngineRepositories {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        bom: Arc<dyn BomLineStore>,
        sequence: Arc<dyn SequenceCounterStore>,
    ) -> Self {
        Self {
            catalog,
            bom,
            sequence,
        }
    }

    /// 基于共享 SQLite 连接创建全部仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            catalog: Arc::new(SqliteCatalogRepository::from_connection(conn.clone())),
            bom: Arc::new(SqliteBomLineRepository::from_connection(conn.clone())),
            sequence: Arc::new(SqliteSequenceCounterRepository::from_connection(conn)),
        }
    }

    /// 替换目录仓储（保留其余仓储）
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogStore>) -> Self {
        self.catalog = catalog;
        self
    }
}
