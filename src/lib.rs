// ==========================================
// 钢筋网片 ERP 集成层 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 产品编码分配与 BOM 推导引擎
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 规范化/查重/编码/BOM/保存编排
pub mod engine;

// 导入层 - 规格文件
pub mod importer;

// 配置层 - 引擎参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BomRole, ProductFamily, QuantityUnit, SaveState, SizeClass};

// 领域实体
pub use domain::{BomLine, CatalogEntry, DerivedBom, ProductCode, ProductSpec, SequenceCounter};

// 引擎
pub use engine::{
    BatchContext, BatchReport, BomDerivationEngine, CodeSequenceAllocator, DuplicateMatcher,
    EngineError, EngineRepositories, ItemOutcome, SaveOrchestrator,
};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "钢筋网片 ERP 集成层";
