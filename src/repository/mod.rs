// ==========================================
// 钢筋网片 ERP 集成层 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 以 CRUD 形式的契约提供三个外部协作者（目录/BOM 行/序列计数器），
//       引擎只依赖 trait，不假设具体持久化技术
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod bom_repo;
pub mod catalog_repo;
pub mod error;
pub mod sequence_repo;

// 重导出核心仓储
pub use bom_repo::{BomLineStore, SqliteBomLineRepository};
pub use catalog_repo::{CatalogPage, CatalogQuery, CatalogSort, CatalogStore, SqliteCatalogRepository};
pub use error::{RepositoryError, RepositoryResult, StoreOutcome};
pub use sequence_repo::{SequenceCounterStore, SequenceFilter, SqliteSequenceCounterRepository};
