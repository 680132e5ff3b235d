// ==========================================
// 钢筋网片 ERP 集成层 - 引擎参数
// ==========================================
// 职责: 匹配阈值、分配重试、标准尺寸、材料常数、工时拟合常数
// 说明: 模糊阈值与工时常数来自历史样本拟合，置信度未知，全部可配置
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// 重复匹配参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// 模糊匹配阈值（编辑距离相似度）
    pub fuzzy_threshold: f64,
    /// 结构匹配的绝对容差（直径 mm / 长度 cm）
    pub tolerance: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.80,
            tolerance: 0.01,
        }
    }
}

// ==========================================
// 编码分配参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationConfig {
    /// 批次初始化时扫描目录的上限
    pub scan_limit: usize,
    /// 目录快照分页大小
    pub page_size: usize,
    /// 编码冲突时重新分配的最大次数
    pub max_conflict_retries: u32,
    /// 瞬时错误最大重试次数
    pub max_transient_retries: u32,
    /// 指数退避基准（毫秒）
    pub backoff_base_ms: u64,
    /// 指数退避上限（毫秒）
    pub backoff_max_ms: u64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            scan_limit: 5_000,
            page_size: 500,
            max_conflict_retries: 3,
            max_transient_retries: 3,
            backoff_base_ms: 50,
            backoff_max_ms: 2_000,
        }
    }
}

// ==========================================
// 标准尺寸
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandardSizeConfig {
    /// 标准 (长, 宽)，cm
    pub sizes: Vec<(f64, f64)>,
    /// 标准 (纵筋间距, 横筋间距)，cm
    pub spacings: Vec<(f64, f64)>,
}

impl Default for StandardSizeConfig {
    fn default() -> Self {
        Self {
            sizes: vec![(500.0, 215.0)],
            spacings: vec![(15.0, 15.0), (15.0, 25.0)],
        }
    }
}

// ==========================================
// 材料常数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoilTableRow {
    pub rod_diameter: f64,
    pub coil_diameter: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    /// 钢材密度 g/cm³
    pub density: f64,
    /// mm²·cm·(g/cm³) → kg 的换算常数
    pub unit_constant: f64,
    /// 盘条单耗参考长度 cm
    pub coil_reference_length: f64,
    /// 成品直径 → 盘条直径（按成品直径升序）
    pub coil_table: Vec<CoilTableRow>,
    /// 材质阈值：盘条直径 ≤ 阈值用低碳材质
    pub quality_threshold: f64,
    pub quality_low: String,
    pub quality_high: String,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        let coil_table = [
            (4.5, 5.5),
            (5.0, 6.0),
            (5.5, 6.5),
            (6.0, 7.0),
            (6.5, 7.5),
            (7.0, 8.0),
            (7.5, 8.5),
            (8.0, 9.0),
            (8.5, 10.0),
            (9.0, 10.0),
            (9.5, 11.0),
            (10.0, 11.0),
            (10.5, 12.0),
            (11.0, 12.0),
            (12.0, 13.0),
        ]
        .into_iter()
        .map(|(rod_diameter, coil_diameter)| CoilTableRow {
            rod_diameter,
            coil_diameter,
        })
        .collect();

        Self {
            density: 7.85,
            unit_constant: 100_000.0,
            coil_reference_length: 100.0,
            coil_table,
            quality_threshold: 7.0,
            quality_low: "1008".to_string(),
            quality_high: "1010".to_string(),
        }
    }
}

// ==========================================
// 工时拟合常数
// ==========================================

/// 剪切速度分档：直径 ≤ max_diameter 且 长度 ≤ max_length 时取 speed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuttingSpeedBucket {
    pub max_diameter: f64,
    pub max_length: f64,
    /// cm/s
    pub speed: f64,
}

/// 焊接工时拟合: coefficient · area^a · density^b · diameter^c
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeldingFit {
    pub coefficient: f64,
    pub area_exponent: f64,
    pub density_exponent: f64,
    pub diameter_exponent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationConfig {
    pub cutting_setup_s: f64,
    pub cutting_buckets: Vec<CuttingSpeedBucket>,
    /// 拉拔工时 = slope · 直径 + intercept（每根/每参考长度）
    pub drawing_slope_s_per_mm: f64,
    pub drawing_intercept_s: f64,
    pub welding_automatic: WeldingFit,
    pub welding_semi_automatic: WeldingFit,
    /// 自动焊网线适用上限
    pub automatic_max_length: f64,
    pub automatic_max_diameter: f64,
}

impl Default for DurationConfig {
    fn default() -> Self {
        let cutting_buckets = [
            (6.0, 300.0, 120.0),
            (6.0, 700.0, 150.0),
            (6.0, f64::MAX, 170.0),
            (9.0, 300.0, 90.0),
            (9.0, 700.0, 110.0),
            (9.0, f64::MAX, 125.0),
            (f64::MAX, 300.0, 60.0),
            (f64::MAX, 700.0, 75.0),
            (f64::MAX, f64::MAX, 85.0),
        ]
        .into_iter()
        .map(|(max_diameter, max_length, speed)| CuttingSpeedBucket {
            max_diameter,
            max_length,
            speed,
        })
        .collect();

        Self {
            cutting_setup_s: 1.5,
            cutting_buckets,
            drawing_slope_s_per_mm: 0.42,
            drawing_intercept_s: 0.9,
            welding_automatic: WeldingFit {
                coefficient: 14.2,
                area_exponent: 0.62,
                density_exponent: 0.35,
                diameter_exponent: 0.48,
            },
            welding_semi_automatic: WeldingFit {
                coefficient: 31.5,
                area_exponent: 0.71,
                density_exponent: 0.41,
                diameter_exponent: 0.55,
            },
            automatic_max_length: 600.0,
            automatic_max_diameter: 10.0,
        }
    }
}

// ==========================================
// EngineConfig - 引擎参数总集
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matching: MatchingConfig,
    pub allocation: AllocationConfig,
    pub standard: StandardSizeConfig,
    pub material: MaterialConfig,
    pub durations: DurationConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"matching": {"fuzzy_threshold": 0.9}}"#).unwrap();
        assert_eq!(cfg.matching.fuzzy_threshold, 0.9);
        assert_eq!(cfg.matching.tolerance, 0.01);
        assert_eq!(cfg.allocation.max_conflict_retries, 3);
    }

    #[test]
    fn test_coil_table_sorted() {
        let cfg = MaterialConfig::default();
        assert!(cfg
            .coil_table
            .windows(2)
            .all(|w| w[0].rod_diameter < w[1].rod_diameter));
    }
}
