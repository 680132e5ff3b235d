// ==========================================
// 钢筋网片 ERP 集成层 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod bom;
pub mod product;
pub mod sequence;
pub mod types;

// 重导出核心类型
pub use bom::{BomLine, BomLineDraft, ComponentLine, DerivedBom, OperationLine};
pub use product::{CatalogEntry, CatalogEntryDraft, ProductCode, ProductSpec, RawSpecFields};
pub use sequence::{SequenceCounter, SequenceKey};
pub use types::{BomRole, ProductFamily, QuantityUnit, SaveState, SizeClass, WeldingMachineClass};
