// ==========================================
// 钢筋网片 ERP 集成层 - 引擎层
// ==========================================
// 职责: 规格规范化、查重、编码分配、BOM 推导、保存编排
// 红线: Engine 不拼 SQL，只经仓储 trait 访问数据
// ==========================================

pub mod bom_derivation;
pub mod code_allocator;
pub mod code_format;
pub mod duplicate_matcher;
pub mod error;
pub mod formulas;
pub mod normalizer;
pub mod repositories;
pub mod retry;
pub mod save_orchestrator;

// 重导出核心引擎
pub use bom_derivation::{BomDerivationEngine, OP_CUTTING, OP_DRAWING};
pub use code_allocator::{BatchContext, CodeSequenceAllocator, CommitSummary};
pub use duplicate_matcher::{DuplicateMatcher, MatchHit, MatchStrategy};
pub use error::{EngineError, EngineResult};
pub use repositories::EngineRepositories;
pub use retry::Backoff;
pub use save_orchestrator::{validate_spec, BatchReport, ItemOutcome, ItemReport, SaveOrchestrator};
