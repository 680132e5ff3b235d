// ==========================================
// 钢筋网片 ERP 集成层 - 规格字段映射
// ==========================================
// 职责: 原始行 → ProductSpec
// 约定: 表头按别名匹配（忽略大小写与首尾空白）；数值先经规范化再解析
//       行级错误收集到结果中，不中断整个文件
// ==========================================

use crate::domain::product::ProductSpec;
use crate::domain::types::ProductFamily;
use crate::engine::normalizer::{parse_decimal, parse_spacing};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::file_parser::RawRecord;
use serde::Serialize;
use tracing::{debug, warn};

// ==========================================
// 表头别名
// ==========================================
const FAMILY: &[&str] = &["family", "产品族", "类别", "tip"];
const TYPE_CODE: &[&str] = &["type_code", "type", "型号", "tip kodu"];
const DIAMETER_LENGTH: &[&str] = &["diameter_length", "diameter", "d1", "纵筋直径", "直径"];
const DIAMETER_WIDTH: &[&str] = &["diameter_width", "d2", "横筋直径"];
const LENGTH: &[&str] = &["length", "l", "长度", "boy"];
const WIDTH: &[&str] = &["width", "w", "宽度", "en"];
const SPACING: &[&str] = &["spacing", "网孔", "间距", "göz"];
const SPACING_LENGTH: &[&str] = &["spacing_length", "纵筋间距"];
const SPACING_WIDTH: &[&str] = &["spacing_width", "横筋间距"];
const ROD_COUNT_LENGTH: &[&str] = &["rod_count_length", "纵筋根数"];
const ROD_COUNT_WIDTH: &[&str] = &["rod_count_width", "横筋根数"];
const QUALITY: &[&str] = &["quality", "材质"];
const DISPLAY_NAME: &[&str] = &["display_name", "name", "名称"];
const NOTE: &[&str] = &["note", "备注"];

/// 映射失败的行
#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

/// 映射结果
#[derive(Debug, Clone, Default)]
pub struct SpecImport {
    /// (数据行号, 规格)，行号从 1 开始，不含表头
    pub specs: Vec<(usize, ProductSpec)>,
    pub errors: Vec<RowError>,
}

impl SpecImport {
    pub fn into_specs(self) -> Vec<ProductSpec> {
        self.specs.into_iter().map(|(_, spec)| spec).collect()
    }
}

// ==========================================
// SpecMapper
// ==========================================
pub struct SpecMapper;

impl SpecMapper {
    /// 映射全部行，收集行级错误
    pub fn map_records(&self, records: &[RawRecord]) -> SpecImport {
        let mut result = SpecImport::default();
        for (idx, record) in records.iter().enumerate() {
            let row = idx + 1;
            match self.map_record(row, record) {
                Ok(spec) => result.specs.push((row, spec)),
                Err(e) => {
                    warn!(row, error = %e, "规格行映射失败");
                    result.errors.push(RowError {
                        row,
                        message: e.to_string(),
                    });
                }
            }
        }
        debug!(
            mapped = result.specs.len(),
            errors = result.errors.len(),
            "规格映射完成"
        );
        result
    }

    /// 映射单行
    pub fn map_record(&self, row: usize, record: &RawRecord) -> ImportResult<ProductSpec> {
        let type_code = text(record, TYPE_CODE);
        let family = match text(record, FAMILY) {
            Some(raw) => ProductFamily::from_str_lenient(&raw).ok_or_else(|| {
                ImportError::FieldMappingError {
                    row,
                    message: format!("未知产品族: {}", raw),
                }
            })?,
            // 未给出产品族时，有型号视为网片
            None if type_code.is_some() => ProductFamily::Mesh,
            None => {
                return Err(ImportError::MissingField {
                    row,
                    field: "family".to_string(),
                })
            }
        };

        let diameter = required_decimal(row, record, DIAMETER_LENGTH, "diameter_length")?;

        let spec = match family {
            ProductFamily::Mesh => {
                let (spacing_length, spacing_width) = self.spacing(row, record)?;
                let mut spec = ProductSpec::mesh(
                    type_code.as_deref().unwrap_or(""),
                    diameter,
                    optional_decimal(row, record, DIAMETER_WIDTH, "diameter_width")?
                        .unwrap_or(diameter),
                    required_decimal(row, record, LENGTH, "length")?,
                    required_decimal(row, record, WIDTH, "width")?,
                    spacing_length,
                    spacing_width,
                );
                spec.rod_count_length = optional_count(row, record, ROD_COUNT_LENGTH, "rod_count_length")?;
                spec.rod_count_width = optional_count(row, record, ROD_COUNT_WIDTH, "rod_count_width")?;
                spec
            }
            ProductFamily::Rod => {
                ProductSpec::rod(diameter, required_decimal(row, record, LENGTH, "length")?)
            }
            ProductFamily::WireCoil => ProductSpec::wire_coil(diameter),
            ProductFamily::RawCoil => {
                let quality = text(record, QUALITY).ok_or_else(|| ImportError::MissingField {
                    row,
                    field: "quality".to_string(),
                })?;
                ProductSpec::raw_coil(diameter, &quality)
            }
        };

        Ok(ProductSpec {
            display_name: text(record, DISPLAY_NAME),
            note: text(record, NOTE),
            ..spec
        })
    }

    /// 网孔间距：分列优先，其次合并列（"15" 视为 15x15）
    fn spacing(&self, row: usize, record: &RawRecord) -> ImportResult<(f64, f64)> {
        let length = optional_decimal(row, record, SPACING_LENGTH, "spacing_length")?;
        let width = optional_decimal(row, record, SPACING_WIDTH, "spacing_width")?;
        match (length, width) {
            (Some(l), Some(w)) => return Ok((l, w)),
            (Some(v), None) | (None, Some(v)) => return Ok((v, v)),
            (None, None) => {}
        }

        let raw = text(record, SPACING).ok_or_else(|| ImportError::MissingField {
            row,
            field: "spacing".to_string(),
        })?;
        parse_spacing(&raw).ok_or_else(|| ImportError::TypeConversionError {
            row,
            field: "spacing".to_string(),
            message: format!("无法解析网孔间距: {}", raw),
        })
    }
}

// ==========================================
// 单元格读取
// ==========================================

fn text(record: &RawRecord, aliases: &[&str]) -> Option<String> {
    record
        .iter()
        .find(|(header, _)| {
            let h = header.trim().to_lowercase();
            aliases.iter().any(|alias| *alias == h)
        })
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn optional_decimal(
    row: usize,
    record: &RawRecord,
    aliases: &[&str],
    field: &str,
) -> ImportResult<Option<f64>> {
    match text(record, aliases) {
        None => Ok(None),
        Some(raw) => parse_decimal(&raw)
            .map(Some)
            .ok_or_else(|| ImportError::TypeConversionError {
                row,
                field: field.to_string(),
                message: format!("无法解析数值: {}", raw),
            }),
    }
}

fn required_decimal(row: usize, record: &RawRecord, aliases: &[&str], field: &str) -> ImportResult<f64> {
    optional_decimal(row, record, aliases, field)?.ok_or_else(|| ImportError::MissingField {
        row,
        field: field.to_string(),
    })
}

fn optional_count(
    row: usize,
    record: &RawRecord,
    aliases: &[&str],
    field: &str,
) -> ImportResult<Option<u32>> {
    match optional_decimal(row, record, aliases, field)? {
        None => Ok(None),
        Some(v) if v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) => Ok(Some(v as u32)),
        Some(v) => Err(ImportError::TypeConversionError {
            row,
            field: field.to_string(),
            message: format!("根数必须为非负整数: {}", v),
        }),
    }
}
