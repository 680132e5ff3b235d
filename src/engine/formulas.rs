// ==========================================
// 钢筋网片 ERP 集成层 - 计算公式
// ==========================================
// 职责: 根数、质量、盘条选型、各工序工时
// 红线: 全部为纯函数，常数一律来自配置，不持有状态
// 单位: 直径 mm，长度 cm，质量 kg，工时 s
// ==========================================

use crate::config::{DurationConfig, MaterialConfig, WeldingFit};
use crate::domain::types::WeldingMachineClass;
use std::f64::consts::PI;

/// 浮点比较容差（避免 300/15 之类的除法误差多算一根）
const EPS: f64 = 1e-9;

// ==========================================
// 根数与质量
// ==========================================

/// 单方向钢筋根数 = ceil(分布跨度 / 间距) + 1
pub fn rod_count(span: f64, spacing: f64) -> u32 {
    if span <= 0.0 || spacing <= 0.0 {
        return 0;
    }
    ((span / spacing) - EPS).ceil().max(0.0) as u32 + 1
}

/// 圆柱近似质量 (kg) = π·(d/2)²·L·ρ / 换算常数
pub fn cylinder_mass_kg(diameter: f64, length: f64, material: &MaterialConfig) -> f64 {
    let radius = diameter / 2.0;
    PI * radius * radius * length * material.density / material.unit_constant
}

/// 单根钢筋的盘条消耗 (kg)：参考长度下的质量按实际长度折算
pub fn coil_consumption_kg(diameter: f64, length: f64, material: &MaterialConfig) -> f64 {
    let reference = material.coil_reference_length;
    if reference <= 0.0 {
        return cylinder_mass_kg(diameter, length, material);
    }
    cylinder_mass_kg(diameter, reference, material) * (length / reference)
}

/// 成品直径对应的盘条直径：无精确条目时向上取最近的较大条目，超出表时取最大条目
pub fn coil_diameter_for(rod_diameter: f64, material: &MaterialConfig) -> f64 {
    material
        .coil_table
        .iter()
        .find(|row| row.rod_diameter + EPS >= rod_diameter)
        .or_else(|| material.coil_table.last())
        .map(|row| row.coil_diameter)
        .unwrap_or(rod_diameter)
}

/// 盘条材质代码
pub fn quality_code(coil_diameter: f64, material: &MaterialConfig) -> &str {
    if coil_diameter <= material.quality_threshold + EPS {
        &material.quality_low
    } else {
        &material.quality_high
    }
}

// ==========================================
// 工时
// ==========================================

/// 剪切工时 = 长度 / 分档速度 + 准备时间
pub fn cutting_duration_s(diameter: f64, length: f64, cfg: &DurationConfig) -> f64 {
    let speed = cfg
        .cutting_buckets
        .iter()
        .find(|b| diameter <= b.max_diameter + EPS && length <= b.max_length + EPS)
        .or_else(|| cfg.cutting_buckets.last())
        .map(|b| b.speed)
        .filter(|s| *s > 0.0);

    match speed {
        Some(speed) => length / speed + cfg.cutting_setup_s,
        None => cfg.cutting_setup_s,
    }
}

/// 拉拔工时（直径线性）
pub fn drawing_duration_s(diameter: f64, cfg: &DurationConfig) -> f64 {
    cfg.drawing_slope_s_per_mm * diameter + cfg.drawing_intercept_s
}

/// 焊机类别：长度与直径均在自动线能力内时走自动线
pub fn welding_machine_class(
    panel_length: f64,
    max_diameter: f64,
    cfg: &DurationConfig,
) -> WeldingMachineClass {
    if panel_length <= cfg.automatic_max_length + EPS
        && max_diameter <= cfg.automatic_max_diameter + EPS
    {
        WeldingMachineClass::Automatic
    } else {
        WeldingMachineClass::SemiAutomatic
    }
}

/// 焊接工时 = 系数 · 面积(m²)^a · 钢筋密度(根/m²)^b · 直径^c
pub fn welding_duration_s(
    class: WeldingMachineClass,
    panel_length: f64,
    panel_width: f64,
    total_rods: u32,
    max_diameter: f64,
    cfg: &DurationConfig,
) -> f64 {
    let fit: &WeldingFit = match class {
        WeldingMachineClass::Automatic => &cfg.welding_automatic,
        WeldingMachineClass::SemiAutomatic => &cfg.welding_semi_automatic,
    };
    let area_m2 = panel_length * panel_width / 10_000.0;
    if area_m2 <= 0.0 {
        return 0.0;
    }
    let density = f64::from(total_rods) / area_m2;
    fit.coefficient
        * area_m2.powf(fit.area_exponent)
        * density.powf(fit.density_exponent)
        * max_diameter.powf(fit.diameter_exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rod_count_fencepost() {
        assert_eq!(rod_count(215.0, 15.0), 16);
        assert_eq!(rod_count(500.0, 15.0), 35);
        assert_eq!(rod_count(300.0, 15.0), 21);
        assert_eq!(rod_count(0.0, 15.0), 0);
    }

    #[test]
    fn test_cylinder_mass() {
        let material = MaterialConfig::default();
        let mass = cylinder_mass_kg(5.0, 500.0, &material);
        assert!((mass - 0.7707).abs() < 1e-3, "mass={}", mass);
        let consumption = coil_consumption_kg(5.0, 500.0, &material);
        assert!((consumption - mass).abs() < 1e-9);
    }

    #[test]
    fn test_coil_lookup_rounds_up() {
        let material = MaterialConfig::default();
        assert_eq!(coil_diameter_for(5.0, &material), 6.0);
        assert_eq!(coil_diameter_for(5.2, &material), 6.5);
        assert_eq!(coil_diameter_for(3.0, &material), 5.5);
        assert_eq!(coil_diameter_for(14.0, &material), 13.0);
        assert_eq!(quality_code(7.0, &material), "1008");
        assert_eq!(quality_code(7.5, &material), "1010");
    }

    #[test]
    fn test_durations() {
        let cfg = DurationConfig::default();
        let cut = cutting_duration_s(5.0, 300.0, &cfg);
        assert!((cut - (300.0 / 120.0 + 1.5)).abs() < 1e-9);
        let cut_long = cutting_duration_s(12.0, 900.0, &cfg);
        assert!((cut_long - (900.0 / 85.0 + 1.5)).abs() < 1e-9);
        assert!((drawing_duration_s(5.0, &cfg) - 3.0).abs() < 1e-9);

        assert_eq!(
            welding_machine_class(500.0, 5.0, &cfg),
            WeldingMachineClass::Automatic
        );
        assert_eq!(
            welding_machine_class(700.0, 5.0, &cfg),
            WeldingMachineClass::SemiAutomatic
        );
        let auto = welding_duration_s(WeldingMachineClass::Automatic, 500.0, 215.0, 51, 5.0, &cfg);
        let semi = welding_duration_s(WeldingMachineClass::SemiAutomatic, 500.0, 215.0, 51, 5.0, &cfg);
        assert!(auto > 0.0 && semi > auto);
    }
}
