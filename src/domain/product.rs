// ==========================================
// 钢筋网片 ERP 集成层 - 产品领域模型
// ==========================================
// 职责: 产品规格 (引擎输入)、产品编码、目录条目 (外部事实)
// 红线: ProductSpec 对引擎只读; CatalogEntry 只经保存路径写入
// ==========================================

use crate::domain::types::{ProductFamily, SizeClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// ProductSpec - 产品规格
// ==========================================
// 单位: 直径 mm，长度/网孔间距 cm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    pub family: ProductFamily,
    pub type_code: Option<String>,       // 网片型号（如 Q257/257）
    pub diameter_length: f64,            // 纵筋直径
    pub diameter_width: Option<f64>,     // 横筋直径（网片）
    pub length: f64,                     // 纵向长度（钢筋定尺长度）
    pub width: Option<f64>,              // 横向宽度（网片）
    pub spacing_length: Option<f64>,     // 纵筋间距
    pub spacing_width: Option<f64>,      // 横筋间距
    pub rod_count_length: Option<u32>,   // 纵筋根数（人工指定时覆盖公式）
    pub rod_count_width: Option<u32>,    // 横筋根数（人工指定时覆盖公式）
    pub quality: Option<String>,         // 盘条材质代码（原材料）
    pub display_name: Option<String>,
    pub note: Option<String>,
}

impl ProductSpec {
    /// 网片规格
    #[allow(clippy::too_many_arguments)]
    pub fn mesh(
        type_code: &str,
        diameter_length: f64,
        diameter_width: f64,
        length: f64,
        width: f64,
        spacing_length: f64,
        spacing_width: f64,
    ) -> Self {
        Self {
            family: ProductFamily::Mesh,
            type_code: Some(type_code.to_string()),
            diameter_length,
            diameter_width: Some(diameter_width),
            length,
            width: Some(width),
            spacing_length: Some(spacing_length),
            spacing_width: Some(spacing_width),
            rod_count_length: None,
            rod_count_width: None,
            quality: None,
            display_name: None,
            note: None,
        }
    }

    /// 定尺钢筋规格
    pub fn rod(diameter: f64, length: f64) -> Self {
        Self {
            family: ProductFamily::Rod,
            type_code: None,
            diameter_length: diameter,
            diameter_width: None,
            length,
            width: None,
            spacing_length: None,
            spacing_width: None,
            rod_count_length: None,
            rod_count_width: None,
            quality: None,
            display_name: None,
            note: None,
        }
    }

    /// 冷拔钢丝规格
    pub fn wire_coil(diameter: f64) -> Self {
        Self {
            family: ProductFamily::WireCoil,
            ..Self::rod(diameter, 0.0)
        }
    }

    /// 盘条规格
    pub fn raw_coil(diameter: f64, quality: &str) -> Self {
        Self {
            family: ProductFamily::RawCoil,
            quality: Some(quality.to_string()),
            ..Self::rod(diameter, 0.0)
        }
    }

    pub fn with_rod_counts(mut self, length_axis: Option<u32>, width_axis: Option<u32>) -> Self {
        self.rod_count_length = length_axis;
        self.rod_count_width = width_axis;
        self
    }

    pub fn with_display_name(mut self, name: &str) -> Self {
        self.display_name = Some(name.to_string());
        self
    }

    /// 横筋直径（缺省时与纵筋相同）
    pub fn effective_diameter_width(&self) -> f64 {
        self.diameter_width.unwrap_or(self.diameter_length)
    }

    pub fn effective_width(&self) -> f64 {
        self.width.unwrap_or(0.0)
    }

    /// 网孔间距（单值 15 等价于 15x15）
    pub fn effective_spacing(&self) -> (f64, f64) {
        match (self.spacing_length, self.spacing_width) {
            (Some(l), Some(w)) => (l, w),
            (Some(v), None) | (None, Some(v)) => (v, v),
            (None, None) => (0.0, 0.0),
        }
    }

    pub fn has_rod_count_override(&self) -> bool {
        self.rod_count_length.is_some() || self.rod_count_width.is_some()
    }
}

// ==========================================
// ProductCode - 产品编码
// ==========================================
// 唯一性由目录保证，引擎不做假设
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductCode(String);

impl ProductCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ProductCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ==========================================
// RawSpecFields - 目录中的原始规格字段
// ==========================================
// 历史数据格式不统一（"5,0" / "5.0" / "5"），比较前必须规范化
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSpecFields {
    pub type_code: Option<String>,
    pub diameter_length: Option<String>,
    pub diameter_width: Option<String>,
    pub length: Option<String>,
    pub width: Option<String>,
    pub spacing: Option<String>,
}

// ==========================================
// CatalogEntry - 目录条目
// ==========================================
// 对齐: catalog_entry 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub code: String,
    pub family: ProductFamily,
    pub size_class: SizeClass,
    pub canonical_name: String,
    pub display_name: String,
    pub fields: RawSpecFields,
    pub weight_kg: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 待创建的目录条目（不含主键/审计字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntryDraft {
    pub code: String,
    pub family: ProductFamily,
    pub size_class: SizeClass,
    pub canonical_name: String,
    pub display_name: String,
    pub fields: RawSpecFields,
    pub weight_kg: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_spacing_is_square() {
        let mut spec = ProductSpec::mesh("Q257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        spec.spacing_width = None;
        assert_eq!(spec.effective_spacing(), (15.0, 15.0));
    }

    #[test]
    fn test_width_diameter_defaults_to_length_diameter() {
        let spec = ProductSpec::rod(6.5, 300.0);
        assert_eq!(spec.effective_diameter_width(), 6.5);
        assert!(!spec.has_rod_count_override());
    }
}
