// ==========================================
// 钢筋网片 ERP 集成层 - 导入层
// ==========================================
// 职责: 从 Excel / CSV 读取产品规格清单
// 流程: 文件解析 → 字段映射（别名 + 数值规范化）
// ==========================================

pub mod error;
pub mod file_parser;
pub mod spec_mapper;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, FileParser, RawRecord, UniversalFileParser};
pub use spec_mapper::{RowError, SpecImport, SpecMapper};

use std::path::Path;
use tracing::info;

/// 读取规格文件
pub fn import_specs<P: AsRef<Path>>(file_path: P) -> ImportResult<SpecImport> {
    let path = file_path.as_ref();
    let records = UniversalFileParser.parse(path)?;
    let result = SpecMapper.map_records(&records);
    info!(
        file = %path.display(),
        rows = records.len(),
        specs = result.specs.len(),
        errors = result.errors.len(),
        "规格文件导入完成"
    );
    Ok(result)
}
