// ==========================================
// 钢筋网片 ERP 集成层 - 产品编码格式
// ==========================================
// 编码 = 产品族前缀 + 类型码 + 直径码 + (尺寸后缀 | 序列后缀)
//   网片标准: CH.STD.{d4}.{nn}     nn = 同直径标准编码的零基序号
//   网片非标: CH.OZL.{d4}.{ssss}   ssss = 产品族序列号
//   定尺钢筋: YM.NCBK.{d4}.{len}   len 与规范名称同精度 (500, 500.4)
//   冷拔钢丝: YM.NTEL.{d4}
//   盘条:     FLM.{d4}.{quality}
// ==========================================

use crate::config::StandardSizeConfig;
use crate::domain::product::{CatalogEntryDraft, ProductCode, ProductSpec, RawSpecFields};
use crate::domain::types::{ProductFamily, SizeClass};
use crate::engine::normalizer::{canonical_name, display_name, format_decimal};

/// 网片产品族序列键 family 段
pub const MESH_SEQUENCE_FAMILY: &str = "CH";
/// 标准编码类型码
pub const STANDARD_TYPE: &str = "STD";
/// 非标编码类型码（同时作为序列计数器 subtype）
pub const CUSTOM_TYPE: &str = "OZL";

/// 直径码: 5.0 → "0500"
pub fn diameter_code(diameter: f64) -> String {
    format!("{:04}", (diameter * 100.0).round().max(0.0) as i64)
}

pub fn standard_mesh_prefix(diameter: f64) -> String {
    format!("{}.{}.{}.", MESH_SEQUENCE_FAMILY, STANDARD_TYPE, diameter_code(diameter))
}

pub fn custom_mesh_prefix() -> String {
    format!("{}.{}.", MESH_SEQUENCE_FAMILY, CUSTOM_TYPE)
}

pub fn standard_mesh_code(diameter: f64, index: u32) -> ProductCode {
    ProductCode::new(format!("{}{:02}", standard_mesh_prefix(diameter), index))
}

pub fn custom_mesh_code(diameter: f64, sequence: i64) -> ProductCode {
    ProductCode::new(format!(
        "{}{}.{:04}",
        custom_mesh_prefix(),
        diameter_code(diameter),
        sequence
    ))
}

pub fn rod_code(diameter: f64, length: f64) -> ProductCode {
    ProductCode::new(format!(
        "{}.{}.{}",
        ProductFamily::Rod.code_prefix(),
        diameter_code(diameter),
        format_decimal(length)
    ))
}

pub fn wire_code(diameter: f64) -> ProductCode {
    ProductCode::new(format!(
        "{}.{}",
        ProductFamily::WireCoil.code_prefix(),
        diameter_code(diameter)
    ))
}

pub fn coil_code(diameter: f64, quality: &str) -> ProductCode {
    ProductCode::new(format!(
        "{}.{}.{}",
        ProductFamily::RawCoil.code_prefix(),
        diameter_code(diameter),
        quality.trim()
    ))
}

/// 尺寸派生编码（半成品/原材料）；网片返回 None
pub fn dimensional_code(spec: &ProductSpec) -> Option<ProductCode> {
    match spec.family {
        ProductFamily::Mesh => None,
        ProductFamily::Rod => Some(rod_code(spec.diameter_length, spec.length)),
        ProductFamily::WireCoil => Some(wire_code(spec.diameter_length)),
        ProductFamily::RawCoil => Some(coil_code(
            spec.diameter_length,
            spec.quality.as_deref().unwrap_or(""),
        )),
    }
}

/// 从非标编码解析序列号: "CH.OZL.0500.0042" → 42
pub fn parse_custom_sequence(code: &str) -> Option<i64> {
    let rest = code.trim().strip_prefix(&custom_mesh_prefix())?;
    let (_, seq) = rest.rsplit_once('.')?;
    if seq.is_empty() || !seq.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    seq.parse().ok()
}

/// 从标准编码解析 (直径码, 序号): "CH.STD.0500.03" → ("0500", 3)
pub fn parse_standard_code(code: &str) -> Option<(String, u32)> {
    let rest = code
        .trim()
        .strip_prefix(&format!("{}.{}.", MESH_SEQUENCE_FAMILY, STANDARD_TYPE))?;
    let (d4, index) = rest.split_once('.')?;
    if d4.len() != 4 || !d4.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((d4.to_string(), index.parse().ok()?))
}

/// 尺寸类别判定
///
/// 网片标准尺寸: 两向直径相同、(长, 宽) 与 (纵距, 横距) 均在标准清单内、未人工指定根数
pub fn size_class(spec: &ProductSpec, standard: &StandardSizeConfig) -> SizeClass {
    if spec.family != ProductFamily::Mesh {
        return SizeClass::Dimensional;
    }
    const TOL: f64 = 1e-6;
    let pair_in = |list: &[(f64, f64)], a: f64, b: f64| {
        list.iter()
            .any(|(x, y)| (x - a).abs() < TOL && (y - b).abs() < TOL)
    };
    let (sl, sw) = spec.effective_spacing();
    let is_standard = (spec.diameter_length - spec.effective_diameter_width()).abs() < TOL
        && pair_in(&standard.sizes, spec.length, spec.effective_width())
        && pair_in(&standard.spacings, sl, sw)
        && !spec.has_rod_count_override();

    if is_standard {
        SizeClass::Standard
    } else {
        SizeClass::Custom
    }
}

/// 规格 → 目录原始字段（统一写入规范化后的文本）
pub fn raw_fields(spec: &ProductSpec) -> RawSpecFields {
    match spec.family {
        ProductFamily::Mesh => {
            let (sl, sw) = spec.effective_spacing();
            RawSpecFields {
                type_code: spec.type_code.clone(),
                diameter_length: Some(format_decimal(spec.diameter_length)),
                diameter_width: Some(format_decimal(spec.effective_diameter_width())),
                length: Some(format_decimal(spec.length)),
                width: Some(format_decimal(spec.effective_width())),
                spacing: Some(format!("{}x{}", format_decimal(sl), format_decimal(sw))),
            }
        }
        ProductFamily::Rod => RawSpecFields {
            diameter_length: Some(format_decimal(spec.diameter_length)),
            length: Some(format_decimal(spec.length)),
            ..Default::default()
        },
        ProductFamily::WireCoil | ProductFamily::RawCoil => RawSpecFields {
            type_code: spec.quality.clone(),
            diameter_length: Some(format_decimal(spec.diameter_length)),
            ..Default::default()
        },
    }
}

/// 构造待创建的目录条目
pub fn catalog_draft(
    spec: &ProductSpec,
    code: &ProductCode,
    size_class: SizeClass,
    weight_kg: Option<f64>,
) -> CatalogEntryDraft {
    CatalogEntryDraft {
        code: code.as_str().to_string(),
        family: spec.family,
        size_class,
        canonical_name: canonical_name(spec),
        display_name: display_name(spec),
        fields: raw_fields(spec),
        weight_kg,
    }
}
