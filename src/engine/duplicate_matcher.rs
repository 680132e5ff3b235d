// ==========================================
// 钢筋网片 ERP 集成层 - 重复匹配
// ==========================================
// 职责: 在目录快照上判定规格是否已存在
// 策略: 规范名称相等 / 规范化名称相等 / 结构相等 / 模糊相似，取并集
// 红线: 纯函数，不写库；命中多个编码时全部返回，交由人工复核
// ==========================================

use crate::config::MatchingConfig;
use crate::domain::product::{CatalogEntry, ProductSpec, RawSpecFields};
use crate::domain::types::ProductFamily;
use crate::engine::normalizer::{
    canonical_name, clean_for_fuzzy, display_name, normalize_str, normalize_type_code,
    parse_decimal,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// MatchStrategy - 命中策略
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "score")]
pub enum MatchStrategy {
    ExactName,
    NormalizedName,
    Structural,
    Fuzzy(f64),
}

/// 单个命中条目及其命中的全部策略
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchHit {
    pub entry: CatalogEntry,
    pub strategies: Vec<MatchStrategy>,
}

// ==========================================
// DuplicateMatcher
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct DuplicateMatcher {
    config: MatchingConfig,
}

impl DuplicateMatcher {
    pub fn new(config: MatchingConfig) -> Self {
        Self { config }
    }

    /// 是否存在任一命中
    pub fn exists_any(&self, spec: &ProductSpec, catalog: &[CatalogEntry]) -> bool {
        let probe = Probe::from_spec(spec);
        catalog
            .iter()
            .any(|entry| !self.strategies_for(&probe, spec, entry).is_empty())
    }

    /// 全部命中条目，按编码去重并升序排列
    pub fn find_all(&self, spec: &ProductSpec, catalog: &[CatalogEntry]) -> Vec<MatchHit> {
        let probe = Probe::from_spec(spec);
        let mut hits: BTreeMap<String, MatchHit> = BTreeMap::new();

        for entry in catalog {
            let strategies = self.strategies_for(&probe, spec, entry);
            if strategies.is_empty() {
                continue;
            }
            match hits.get_mut(&entry.code) {
                Some(hit) => {
                    for s in strategies {
                        if !hit.strategies.contains(&s) {
                            hit.strategies.push(s);
                        }
                    }
                }
                None => {
                    hits.insert(
                        entry.code.clone(),
                        MatchHit {
                            entry: entry.clone(),
                            strategies,
                        },
                    );
                }
            }
        }

        hits.into_values().collect()
    }

    fn strategies_for(
        &self,
        probe: &Probe,
        spec: &ProductSpec,
        entry: &CatalogEntry,
    ) -> Vec<MatchStrategy> {
        if entry.family != spec.family {
            return Vec::new();
        }

        let mut strategies = Vec::new();

        // 1. 规范名称
        if entry.canonical_name == probe.canonical {
            strategies.push(MatchStrategy::ExactName);
        }

        // 2. 规范化名称（规范名称或显示名称任一相等）
        if (!probe.normalized_canonical.is_empty()
            && normalize_str(&entry.canonical_name) == probe.normalized_canonical)
            || (!probe.normalized_display.is_empty()
                && normalize_str(&entry.display_name) == probe.normalized_display)
        {
            strategies.push(MatchStrategy::NormalizedName);
        }

        // 3. 结构相等
        if self.structural_eq(spec, &entry.fields) {
            strategies.push(MatchStrategy::Structural);
        }

        // 4. 模糊相似
        if let Some(score) = self.fuzzy_score(probe, entry) {
            if score >= self.config.fuzzy_threshold {
                strategies.push(MatchStrategy::Fuzzy(score));
            }
        }

        strategies
    }

    fn structural_eq(&self, spec: &ProductSpec, fields: &RawSpecFields) -> bool {
        let tol = self.config.tolerance;
        let near = |raw: Option<&String>, expected: f64| -> bool {
            raw.and_then(|r| parse_decimal(r))
                .map(|v| (v - expected).abs() <= tol)
                .unwrap_or(false)
        };

        match spec.family {
            ProductFamily::Mesh => {
                let spec_type = spec.type_code.as_deref().map(normalize_type_code);
                let entry_type = fields.type_code.as_deref().map(normalize_type_code);
                match (spec_type, entry_type) {
                    (Some(a), Some(b)) if !a.is_empty() && a == b => {}
                    _ => return false,
                }
                // 横向字段缺省时按纵向取值
                let entry_dw = fields.diameter_width.as_ref().or(fields.diameter_length.as_ref());
                near(fields.diameter_length.as_ref(), spec.diameter_length)
                    && near(entry_dw, spec.effective_diameter_width())
                    && near(fields.length.as_ref(), spec.length)
                    && near(fields.width.as_ref(), spec.effective_width())
            }
            ProductFamily::Rod => {
                near(fields.diameter_length.as_ref(), spec.diameter_length)
                    && near(fields.length.as_ref(), spec.length)
            }
            ProductFamily::WireCoil => near(fields.diameter_length.as_ref(), spec.diameter_length),
            ProductFamily::RawCoil => {
                let spec_quality = spec.quality.as_deref().map(normalize_str).unwrap_or_default();
                let entry_quality = fields.type_code.as_deref().map(normalize_str).unwrap_or_default();
                near(fields.diameter_length.as_ref(), spec.diameter_length)
                    && spec_quality == entry_quality
            }
        }
    }

    fn fuzzy_score(&self, probe: &Probe, entry: &CatalogEntry) -> Option<f64> {
        if probe.fuzzy_display.is_empty() {
            return None;
        }
        [&entry.display_name, &entry.canonical_name]
            .into_iter()
            .map(|name| clean_for_fuzzy(name))
            .filter(|cleaned| !cleaned.is_empty())
            .map(|cleaned| strsim::normalized_levenshtein(&probe.fuzzy_display, &cleaned))
            .fold(None, |best: Option<f64>, score| {
                Some(best.map_or(score, |b| b.max(score)))
            })
    }
}

/// 规格侧只计算一次的比较键
struct Probe {
    canonical: String,
    normalized_canonical: String,
    normalized_display: String,
    fuzzy_display: String,
}

impl Probe {
    fn from_spec(spec: &ProductSpec) -> Self {
        let canonical = canonical_name(spec);
        let display = display_name(spec);
        Self {
            normalized_canonical: normalize_str(&canonical),
            normalized_display: normalize_str(&display),
            fuzzy_display: clean_for_fuzzy(&display),
            canonical,
        }
    }
}
