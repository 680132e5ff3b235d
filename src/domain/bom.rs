// ==========================================
// 钢筋网片 ERP 集成层 - BOM 领域模型
// ==========================================
// 职责: BOM 行 (持久化)、推导结果 (引擎输出)
// 说明: 同一子件编码可被多个父件引用 (扇入)
// ==========================================

use crate::domain::product::{ProductCode, ProductSpec};
use crate::domain::types::{BomRole, QuantityUnit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// BomLine - BOM 行
// ==========================================
// 对齐: bom_line 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLine {
    pub id: i64,
    pub parent_code: String,
    pub item_code: String, // 子件或工序编码
    pub role: BomRole,
    pub quantity: f64,
    pub unit: QuantityUnit,
    pub duration_s: Option<f64>,
    pub seq_no: i32,
    pub created_at: DateTime<Utc>,
}

/// 待创建的 BOM 行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BomLineDraft {
    pub parent_code: String,
    pub item_code: String,
    pub role: BomRole,
    pub quantity: f64,
    pub unit: QuantityUnit,
    pub duration_s: Option<f64>,
    pub seq_no: i32,
}

// ==========================================
// 推导结果
// ==========================================

/// 物料消耗行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentLine {
    pub code: ProductCode,
    pub quantity: f64,
    pub unit: QuantityUnit,
    /// 子件本身的规格（用于逐级推导和建档）
    pub spec: ProductSpec,
}

/// 工序行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationLine {
    pub code: String,
    pub duration_s: f64,
}

/// 单层 BOM 推导结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedBom {
    pub components: Vec<ComponentLine>,
    pub operations: Vec<OperationLine>,
    /// 单件质量 (kg)
    pub unit_mass_kg: f64,
}

impl DerivedBom {
    /// 转换为待持久化的 BOM 行（组件在前，工序在后）
    pub fn to_line_drafts(&self, parent_code: &str) -> Vec<BomLineDraft> {
        let mut drafts = Vec::with_capacity(self.components.len() + self.operations.len());
        let mut seq_no = 1;

        for component in &self.components {
            drafts.push(BomLineDraft {
                parent_code: parent_code.to_string(),
                item_code: component.code.as_str().to_string(),
                role: BomRole::Component,
                quantity: component.quantity,
                unit: component.unit,
                duration_s: None,
                seq_no,
            });
            seq_no += 1;
        }

        for operation in &self.operations {
            drafts.push(BomLineDraft {
                parent_code: parent_code.to_string(),
                item_code: operation.code.clone(),
                role: BomRole::Operation,
                quantity: 1.0,
                unit: QuantityUnit::Second,
                duration_s: Some(operation.duration_s),
                seq_no,
            });
            seq_no += 1;
        }

        drafts
    }
}
