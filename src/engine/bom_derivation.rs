// ==========================================
// 钢筋网片 ERP 集成层 - BOM 推导引擎
// ==========================================
// 职责: 由产品规格推导单层 BOM（子件、用量、工序工时）
// 结构: 网片 → 定尺钢筋 (纵/横) → 盘条
//       冷拔钢丝 → 盘条
// 红线: 纯函数，同一规格结果恒定；子件编码只由 (直径, 长度) 派生
// ==========================================

use crate::config::{DurationConfig, EngineConfig, MaterialConfig};
use crate::domain::bom::{ComponentLine, DerivedBom, OperationLine};
use crate::domain::product::ProductSpec;
use crate::domain::types::{ProductFamily, QuantityUnit};
use crate::engine::code_format::{coil_code, rod_code};
use crate::engine::formulas::{
    coil_consumption_kg, coil_diameter_for, cutting_duration_s, cylinder_mass_kg,
    drawing_duration_s, quality_code, rod_count, welding_duration_s, welding_machine_class,
};
use tracing::debug;

/// 剪切工序编码
pub const OP_CUTTING: &str = "OP.CUT";
/// 拉拔工序编码
pub const OP_DRAWING: &str = "OP.DRW";

/// 用量保留 4 位小数，工时保留 2 位
fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

// ==========================================
// BomDerivationEngine
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct BomDerivationEngine {
    material: MaterialConfig,
    durations: DurationConfig,
}

impl BomDerivationEngine {
    pub fn new(material: MaterialConfig, durations: DurationConfig) -> Self {
        Self {
            material,
            durations,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.material.clone(), config.durations.clone())
    }

    /// 推导单层 BOM
    pub fn derive_bom(&self, spec: &ProductSpec) -> DerivedBom {
        let bom = match spec.family {
            ProductFamily::Mesh => self.derive_mesh(spec),
            ProductFamily::Rod => self.derive_rod(spec),
            ProductFamily::WireCoil => self.derive_wire_coil(spec),
            ProductFamily::RawCoil => DerivedBom {
                components: Vec::new(),
                operations: Vec::new(),
                unit_mass_kg: round_to(
                    cylinder_mass_kg(
                        spec.diameter_length,
                        self.material.coil_reference_length,
                        &self.material,
                    ),
                    4,
                ),
            },
        };

        debug!(
            family = %spec.family,
            components = bom.components.len(),
            operations = bom.operations.len(),
            unit_mass_kg = bom.unit_mass_kg,
            "BOM 推导完成"
        );
        bom
    }

    // ==========================================
    // 网片
    // ==========================================
    // 纵筋按长度下料，沿宽度方向分布；横筋按宽度下料，沿长度方向分布
    fn derive_mesh(&self, spec: &ProductSpec) -> DerivedBom {
        let length = spec.length;
        let width = spec.effective_width();
        let d_length = spec.diameter_length;
        let d_width = spec.effective_diameter_width();
        let (spacing_length, spacing_width) = spec.effective_spacing();

        let count_length = spec
            .rod_count_length
            .unwrap_or_else(|| rod_count(width, spacing_length));
        let count_width = spec
            .rod_count_width
            .unwrap_or_else(|| rod_count(length, spacing_width));

        let rod_length_axis = ProductSpec::rod(d_length, length);
        let rod_width_axis = ProductSpec::rod(d_width, width);
        let code_length_axis = rod_code(d_length, length);
        let code_width_axis = rod_code(d_width, width);

        let mut components = Vec::with_capacity(2);
        if code_length_axis == code_width_axis {
            // 两向钢筋相同：合并为一行，用量覆盖两个方向
            components.push(ComponentLine {
                code: code_length_axis,
                quantity: f64::from(count_length + count_width),
                unit: QuantityUnit::Piece,
                spec: rod_length_axis,
            });
        } else {
            components.push(ComponentLine {
                code: code_length_axis,
                quantity: f64::from(count_length),
                unit: QuantityUnit::Piece,
                spec: rod_length_axis,
            });
            components.push(ComponentLine {
                code: code_width_axis,
                quantity: f64::from(count_width),
                unit: QuantityUnit::Piece,
                spec: rod_width_axis,
            });
        }

        let mass = f64::from(count_length) * cylinder_mass_kg(d_length, length, &self.material)
            + f64::from(count_width) * cylinder_mass_kg(d_width, width, &self.material);

        let max_diameter = d_length.max(d_width);
        let class = welding_machine_class(length, max_diameter, &self.durations);
        let welding = welding_duration_s(
            class,
            length,
            width,
            count_length + count_width,
            max_diameter,
            &self.durations,
        );

        DerivedBom {
            components,
            operations: vec![OperationLine {
                code: class.operation_code().to_string(),
                duration_s: round_to(welding, 2),
            }],
            unit_mass_kg: round_to(mass, 4),
        }
    }

    // ==========================================
    // 定尺钢筋
    // ==========================================
    fn derive_rod(&self, spec: &ProductSpec) -> DerivedBom {
        let diameter = spec.diameter_length;
        let length = spec.length;

        DerivedBom {
            components: vec![self.coil_line(diameter, length)],
            operations: vec![
                OperationLine {
                    code: OP_DRAWING.to_string(),
                    duration_s: round_to(drawing_duration_s(diameter, &self.durations), 2),
                },
                OperationLine {
                    code: OP_CUTTING.to_string(),
                    duration_s: round_to(
                        cutting_duration_s(diameter, length, &self.durations),
                        2,
                    ),
                },
            ],
            unit_mass_kg: round_to(cylinder_mass_kg(diameter, length, &self.material), 4),
        }
    }

    // ==========================================
    // 冷拔钢丝（按参考长度计量）
    // ==========================================
    fn derive_wire_coil(&self, spec: &ProductSpec) -> DerivedBom {
        let diameter = spec.diameter_length;
        let reference = self.material.coil_reference_length;

        DerivedBom {
            components: vec![self.coil_line(diameter, reference)],
            operations: vec![OperationLine {
                code: OP_DRAWING.to_string(),
                duration_s: round_to(drawing_duration_s(diameter, &self.durations), 2),
            }],
            unit_mass_kg: round_to(cylinder_mass_kg(diameter, reference, &self.material), 4),
        }
    }

    /// 盘条消耗行
    fn coil_line(&self, diameter: f64, length: f64) -> ComponentLine {
        let coil_diameter = coil_diameter_for(diameter, &self.material);
        let quality = quality_code(coil_diameter, &self.material).to_string();
        ComponentLine {
            code: coil_code(coil_diameter, &quality),
            quantity: round_to(coil_consumption_kg(diameter, length, &self.material), 4),
            unit: QuantityUnit::Kg,
            spec: ProductSpec::raw_coil(coil_diameter, &quality),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::WeldingMachineClass;

    fn engine() -> BomDerivationEngine {
        BomDerivationEngine::default()
    }

    #[test]
    fn test_mesh_two_axis_rods() {
        let spec = ProductSpec::mesh("Q257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        let bom = engine().derive_bom(&spec);

        assert_eq!(bom.components.len(), 2);
        assert_eq!(bom.components[0].code.as_str(), "YM.NCBK.0500.500");
        assert_eq!(bom.components[0].quantity, 16.0);
        assert_eq!(bom.components[1].code.as_str(), "YM.NCBK.0500.215");
        assert_eq!(bom.components[1].quantity, 35.0);
        assert_eq!(bom.operations.len(), 1);
        assert_eq!(
            bom.operations[0].code,
            WeldingMachineClass::Automatic.operation_code()
        );
        assert!(bom.unit_mass_kg > 0.0);
    }

    #[test]
    fn test_square_mesh_merges_axis_rods() {
        let spec = ProductSpec::mesh("Q188", 6.0, 6.0, 300.0, 300.0, 15.0, 15.0);
        let bom = engine().derive_bom(&spec);
        assert_eq!(bom.components.len(), 1);
        assert_eq!(bom.components[0].code.as_str(), "YM.NCBK.0600.300");
        assert_eq!(bom.components[0].quantity, 42.0);
    }

    #[test]
    fn test_rod_count_override() {
        let spec = ProductSpec::mesh("Q257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0)
            .with_rod_counts(Some(10), None);
        let bom = engine().derive_bom(&spec);
        assert_eq!(bom.components[0].quantity, 10.0);
        assert_eq!(bom.components[1].quantity, 35.0);
    }

    #[test]
    fn test_rod_bom_uses_coil_and_operations() {
        let bom = engine().derive_bom(&ProductSpec::rod(5.0, 500.0));
        assert_eq!(bom.components.len(), 1);
        assert_eq!(bom.components[0].code.as_str(), "FLM.0600.1008");
        assert_eq!(bom.components[0].unit, QuantityUnit::Kg);
        let ops: Vec<_> = bom.operations.iter().map(|o| o.code.as_str()).collect();
        assert_eq!(ops, vec![OP_DRAWING, OP_CUTTING]);
    }

    #[test]
    fn test_large_semi_automatic_mesh() {
        let spec = ProductSpec::mesh("R785", 10.0, 12.0, 700.0, 250.0, 10.0, 25.0);
        let bom = engine().derive_bom(&spec);
        assert_eq!(
            bom.operations[0].code,
            WeldingMachineClass::SemiAutomatic.operation_code()
        );
        let coil = engine().derive_bom(&bom.components[1].spec);
        assert_eq!(coil.components[0].code.as_str(), "FLM.1300.1010");
    }

    #[test]
    fn test_deterministic_and_mass_increases_with_length() {
        let e = engine();
        let spec = ProductSpec::mesh("Q257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        assert_eq!(e.derive_bom(&spec), e.derive_bom(&spec));

        let mut last = 0.0;
        for length in [100.0, 200.0, 350.0, 500.0, 800.0] {
            let mass = e.derive_bom(&ProductSpec::rod(5.0, length)).unit_mass_kg;
            assert!(mass > last, "length={} mass={}", length, mass);
            last = mass;
        }
    }

    #[test]
    fn test_wire_and_raw_coil() {
        let wire = engine().derive_bom(&ProductSpec::wire_coil(5.5));
        assert_eq!(wire.components[0].code.as_str(), "FLM.0650.1008");
        assert_eq!(wire.operations[0].code, OP_DRAWING);

        let coil = engine().derive_bom(&ProductSpec::raw_coil(6.0, "1008"));
        assert!(coil.components.is_empty());
        assert!(coil.operations.is_empty());
    }
}
