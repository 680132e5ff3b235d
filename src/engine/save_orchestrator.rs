// ==========================================
// 钢筋网片 ERP 集成层 - 保存编排器
// ==========================================
// 状态机: ANALYZE → {NEW, EXISTING} → SAVE_PRODUCT → SAVE_COMPONENTS
//         → SAVE_BOM → COMMIT_SEQUENCE → DONE；FAILED 可由任意状态进入
// 红线:
//   - 单项失败只记入该项报告，不回滚同批次已保存的其他项
//   - 命中多个已有编码时全部保留，交由人工复核
//   - 共享子件只在本批次开始前不存在时才建档/写 BOM（扇入去重）
//   - 计数器每批次回写一次，在全部写入之后
// ==========================================

use crate::config::EngineConfig;
use crate::domain::bom::DerivedBom;
use crate::domain::product::{CatalogEntry, CatalogEntryDraft, ProductCode, ProductSpec};
use crate::domain::types::{ProductFamily, SaveState, SizeClass};
use crate::engine::bom_derivation::BomDerivationEngine;
use crate::engine::code_allocator::{BatchContext, CodeSequenceAllocator};
use crate::engine::code_format::{catalog_draft, size_class};
use crate::engine::duplicate_matcher::{DuplicateMatcher, MatchHit};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::normalizer::{display_name, normalize_type_code, spec_key};
use crate::engine::repositories::EngineRepositories;
use crate::engine::retry::{retry_read, Backoff};
use crate::repository::catalog_repo::CatalogQuery;
use crate::repository::error::{RepositoryError, StoreOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

// ==========================================
// 保存报告
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemOutcome {
    Saved,
    Existing,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub index: usize,
    /// 来源文件行号（按文件导入时）
    pub source_row: Option<usize>,
    pub display_name: String,
    pub code: Option<String>,
    pub outcome: ItemOutcome,
    pub final_state: SaveState,
    /// 经过的状态
    pub trail: Vec<SaveState>,
    /// 命中的全部已有编码（EXISTING）
    pub matched_codes: Vec<String>,
    pub created_components: Vec<String>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
}

impl ItemReport {
    fn new(index: usize, spec: &ProductSpec) -> Self {
        Self {
            index,
            source_row: None,
            display_name: display_name(spec),
            code: None,
            outcome: ItemOutcome::Failed,
            final_state: SaveState::Analyze,
            trail: vec![SaveState::Analyze],
            matched_codes: Vec::new(),
            created_components: Vec::new(),
            error_kind: None,
            error: None,
        }
    }

    fn enter(&mut self, state: SaveState) {
        self.final_state = state;
        self.trail.push(state);
    }

    fn fail(&mut self, err: &EngineError) {
        self.outcome = ItemOutcome::Failed;
        self.error_kind = Some(err.kind().to_string());
        self.error = Some(err.to_string());
        self.enter(SaveState::Failed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub scope: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemReport>,
    pub warnings: Vec<String>,
    pub counter_before: i64,
    pub counter_after: i64,
    pub counter_writes: u32,
}

impl BatchReport {
    pub fn count(&self, outcome: ItemOutcome) -> usize {
        self.items.iter().filter(|i| i.outcome == outcome).count()
    }
}

/// 创建目录条目的结果
enum CreateOutcome {
    Created,
    /// 同编码同规格已存在（并发写入或重试前已成功）
    AlreadyPresent,
    Conflict,
}

/// 批次内共享的可变状态
struct BatchState {
    ctx: BatchContext,
    /// 批次开始前目录中已存在的编码
    preexisting: HashSet<String>,
    /// 本批次新建的编码
    created: HashSet<String>,
    /// 本批次已保存的规格 → 编码
    saved: HashMap<String, ProductCode>,
    warnings: Vec<String>,
}

// ==========================================
// SaveOrchestrator
// ==========================================
pub struct SaveOrchestrator {
    repos: EngineRepositories,
    config: EngineConfig,
    matcher: DuplicateMatcher,
    allocator: CodeSequenceAllocator,
    bom: BomDerivationEngine,
}

impl SaveOrchestrator {
    pub fn new(repos: EngineRepositories, config: EngineConfig) -> Self {
        Self {
            matcher: DuplicateMatcher::new(config.matching.clone()),
            allocator: CodeSequenceAllocator::new(
                repos.clone(),
                config.allocation.clone(),
                config.standard.clone(),
            ),
            bom: BomDerivationEngine::from_config(&config),
            repos,
            config,
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::from_config(&self.config.allocation)
    }

    /// 保存一个批次；总能返回逐项报告
    /// 保存带来源行号的规格，报告中每项回填 source_row
    pub async fn save_rows(&self, rows: &[(usize, ProductSpec)], scope: &str) -> BatchReport {
        let specs: Vec<ProductSpec> = rows.iter().map(|(_, spec)| spec.clone()).collect();
        let mut report = self.save_batch(&specs, scope).await;
        for (item, (row, _)) in report.items.iter_mut().zip(rows) {
            item.source_row = Some(*row);
        }
        report
    }

    pub async fn save_batch(&self, specs: &[ProductSpec], scope: &str) -> BatchReport {
        let batch_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(batch_id = %batch_id, scope, items = specs.len(), "开始保存批次");

        let mut reports: Vec<ItemReport> = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| ItemReport::new(i, spec))
            .collect();
        let mut state = BatchState {
            ctx: BatchContext::new(scope),
            preexisting: HashSet::new(),
            created: HashSet::new(),
            saved: HashMap::new(),
            warnings: Vec::new(),
        };

        // ==========================================
        // 步骤1: ANALYZE - 读取目录快照并查重
        // ==========================================
        debug!("步骤1: 读取目录快照并查重");

        let snapshot = match self.load_catalog_snapshot().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "目录快照读取失败，整批标记失败");
                state.warnings.push(format!("目录快照读取失败: {}", e));
                for report in &mut reports {
                    report.fail(&e);
                }
                return self.finish(batch_id, scope, started_at, reports, state, 0).await;
            }
        };
        state.preexisting = snapshot.iter().map(|e| e.code.clone()).collect();

        let mut new_items = Vec::new();
        for (index, spec) in specs.iter().enumerate() {
            let report = &mut reports[index];
            if let Err(e) = validate_spec(spec) {
                warn!(index, error = %e, "规格校验失败");
                report.fail(&e);
                continue;
            }

            let hits = self.matcher.find_all(spec, &snapshot);
            if hits.is_empty() {
                report.enter(SaveState::New);
                new_items.push(index);
            } else {
                mark_existing(report, &hits, &mut state.warnings);
            }
        }

        info!(
            new_count = new_items.len(),
            existing_count = reports.iter().filter(|r| r.outcome == ItemOutcome::Existing).count(),
            "查重完成"
        );

        // ==========================================
        // 步骤2: 初始化分配上下文
        // ==========================================
        debug!("步骤2: 初始化分配上下文");
        if !new_items.is_empty() {
            if let Err(e) = self.allocator.initialize_batch(&mut state.ctx).await {
                warn!(error = %e, "分配上下文初始化失败，逐项重试");
                state.warnings.push(format!("分配上下文初始化失败: {}", e));
            }
        }
        let counter_before = state.ctx.start_value();

        // ==========================================
        // 步骤3: 逐项保存 NEW
        // ==========================================
        debug!("步骤3: 逐项保存新规格");
        for index in new_items {
            let spec = &specs[index];
            let report = &mut reports[index];

            let key = spec_key(spec);
            if let Some(code) = state.saved.get(&key) {
                // 同批次重复规格
                report.code = Some(code.to_string());
                report.matched_codes = vec![code.to_string()];
                report.outcome = ItemOutcome::Existing;
                report.enter(SaveState::Existing);
                continue;
            }

            match self.save_new_item(spec, report, &mut state).await {
                Ok(code) => {
                    info!(index, code = %code, "规格保存成功");
                    state.saved.insert(key, code.clone());
                    report.code = Some(code.into_string());
                    report.outcome = ItemOutcome::Saved;
                }
                Err(e) => {
                    warn!(index, state = %report.final_state, error = %e, "规格保存失败");
                    report.fail(&e);
                }
            }
        }

        self.finish(batch_id, scope, started_at, reports, state, counter_before)
            .await
    }

    /// 步骤4: 回写计数器并生成报告
    async fn finish(
        &self,
        batch_id: String,
        scope: &str,
        started_at: DateTime<Utc>,
        mut reports: Vec<ItemReport>,
        mut state: BatchState,
        counter_before: i64,
    ) -> BatchReport {
        debug!("步骤4: 回写序列计数器");
        let summary = self.allocator.commit_batch(&mut state.ctx).await;

        for report in &mut reports {
            match report.outcome {
                ItemOutcome::Saved => {
                    report.enter(SaveState::CommitSequence);
                    report.enter(SaveState::Done);
                }
                ItemOutcome::Existing => report.enter(SaveState::Done),
                ItemOutcome::Failed => {}
            }
        }

        let mut warnings = state.ctx.warnings().to_vec();
        warnings.append(&mut state.warnings);
        warnings.extend(summary.failures.iter().cloned());

        let report = BatchReport {
            batch_id,
            scope: scope.to_string(),
            started_at,
            finished_at: Utc::now(),
            items: reports,
            warnings,
            counter_before,
            counter_after: summary.final_value,
            counter_writes: summary.writes,
        };

        info!(
            batch_id = %report.batch_id,
            saved = report.count(ItemOutcome::Saved),
            existing = report.count(ItemOutcome::Existing),
            failed = report.count(ItemOutcome::Failed),
            counter_before = report.counter_before,
            counter_after = report.counter_after,
            "批次保存完成"
        );
        report
    }

    // ==========================================
    // 单项保存
    // ==========================================
    async fn save_new_item(
        &self,
        spec: &ProductSpec,
        report: &mut ItemReport,
        state: &mut BatchState,
    ) -> EngineResult<ProductCode> {
        let derived = self.bom.derive_bom(spec);
        let class = size_class(spec, &self.config.standard);

        // SAVE_PRODUCT
        report.enter(SaveState::SaveProduct);
        let code = self
            .save_product(spec, class, derived.unit_mass_kg, &mut state.ctx)
            .await?;
        state.created.insert(code.as_str().to_string());

        // SAVE_COMPONENTS
        report.enter(SaveState::SaveComponents);
        report.created_components = self.save_components(&derived, state).await?;

        // SAVE_BOM
        report.enter(SaveState::SaveBom);
        self.write_bom(code.as_str(), &derived).await?;

        Ok(code)
    }

    /// 创建产品条目；编码冲突时重新分配，有界重试
    async fn save_product(
        &self,
        spec: &ProductSpec,
        class: SizeClass,
        weight_kg: f64,
        ctx: &mut BatchContext,
    ) -> EngineResult<ProductCode> {
        let max_conflicts = self.config.allocation.max_conflict_retries;
        let mut code = self.allocator.next_code(ctx, spec).await?;
        let mut conflicts = 0;

        loop {
            let draft = catalog_draft(spec, &code, class, Some(weight_kg));
            match self.create_entry(&draft).await? {
                CreateOutcome::Created | CreateOutcome::AlreadyPresent => return Ok(code),
                CreateOutcome::Conflict => {
                    if class == SizeClass::Dimensional {
                        return Err(EngineError::CodeTaken {
                            code: code.into_string(),
                        });
                    }
                    conflicts += 1;
                    if conflicts > max_conflicts {
                        return Err(EngineError::AllocationExhausted {
                            code: code.into_string(),
                            attempts: conflicts,
                        });
                    }
                    code = self.allocator.reallocate(ctx, spec).await?;
                }
            }
        }
    }

    /// 建档子件（逐级），返回新建的子件编码
    async fn save_components(
        &self,
        derived: &DerivedBom,
        state: &mut BatchState,
    ) -> EngineResult<Vec<String>> {
        let mut created = Vec::new();
        let mut pending: Vec<(ProductCode, ProductSpec)> = derived
            .components
            .iter()
            .rev()
            .map(|line| (line.code.clone(), line.spec.clone()))
            .collect();

        while let Some((code, spec)) = pending.pop() {
            let code_str = code.as_str().to_string();
            if state.preexisting.contains(&code_str) || state.created.contains(&code_str) {
                debug!(code = %code, "子件已存在，跳过");
                continue;
            }

            let sub_bom = self.bom.derive_bom(&spec);
            let draft = catalog_draft(&spec, &code, SizeClass::Dimensional, Some(sub_bom.unit_mass_kg));
            match self.create_entry(&draft).await? {
                CreateOutcome::Created => {
                    state.created.insert(code_str.clone());
                    self.write_bom(&code_str, &sub_bom).await?;
                    created.push(code_str);
                    for line in sub_bom.components.iter().rev() {
                        pending.push((line.code.clone(), line.spec.clone()));
                    }
                }
                CreateOutcome::AlreadyPresent => {
                    // 批次开始后由他处建档，BOM 归建档方负责
                    state.created.insert(code_str);
                }
                CreateOutcome::Conflict => {
                    return Err(EngineError::CodeTaken { code: code_str });
                }
            }
        }

        Ok(created)
    }

    /// 幂等重写父件 BOM：先按父件删除，再逐行创建
    async fn write_bom(&self, parent_code: &str, derived: &DerivedBom) -> EngineResult<()> {
        let backoff = self.backoff();
        let removed = retry_read(&backoff, "bom.delete_by_parent", || {
            self.repos.bom.delete_by_parent(parent_code)
        })
        .await?;
        if removed > 0 {
            debug!(parent_code, removed, "已清除旧 BOM 行");
        }

        for draft in derived.to_line_drafts(parent_code) {
            let mut attempt = 0;
            loop {
                let outcome = match self.repos.bom.create(&draft).await {
                    Ok(outcome) => outcome,
                    Err(RepositoryError::Busy(msg)) => StoreOutcome::TransientError(msg),
                    Err(e) => return Err(e.into()),
                };
                match outcome {
                    StoreOutcome::Found(_) | StoreOutcome::Conflict(_) => break,
                    StoreOutcome::NotFound | StoreOutcome::TransientError(_) => {
                        attempt += 1;
                        if !backoff.allows(attempt) {
                            return Err(EngineError::TransientExhausted {
                                operation: "bom.create".to_string(),
                                attempts: attempt,
                                message: format!("{} → {}", parent_code, draft.item_code),
                            });
                        }
                        backoff.wait(attempt, "bom.create").await;
                        // 先查后建：上次写入可能已生效
                        let lines = retry_read(&backoff, "bom.list_by_parent", || {
                            self.repos.bom.list_by_parent(parent_code)
                        })
                        .await?;
                        if lines.iter().any(|l| l.seq_no == draft.seq_no && l.item_code == draft.item_code) {
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// 先查后建：瞬时错误重试前按编码复查
    async fn create_entry(&self, draft: &CatalogEntryDraft) -> EngineResult<CreateOutcome> {
        let backoff = self.backoff();
        let mut attempt = 0;

        loop {
            let outcome = match self.repos.catalog.create(draft).await {
                Ok(outcome) => outcome,
                Err(RepositoryError::Busy(msg)) => StoreOutcome::TransientError(msg),
                Err(e) => return Err(e.into()),
            };

            match outcome {
                StoreOutcome::Found(entry) => {
                    debug!(code = %entry.code, "目录条目已创建");
                    return Ok(CreateOutcome::Created);
                }
                StoreOutcome::Conflict(existing) => {
                    let existing = match existing {
                        Some(e) => Some(e),
                        None => self.find_by_code(&draft.code).await?,
                    };
                    return Ok(classify_existing(draft, existing.as_ref()));
                }
                StoreOutcome::NotFound | StoreOutcome::TransientError(_) => {
                    attempt += 1;
                    if !backoff.allows(attempt) {
                        return Err(EngineError::TransientExhausted {
                            operation: "catalog.create".to_string(),
                            attempts: attempt,
                            message: draft.code.clone(),
                        });
                    }
                    backoff.wait(attempt, "catalog.create").await;
                    if let Some(existing) = self.find_by_code(&draft.code).await? {
                        return Ok(classify_existing(draft, Some(&existing)));
                    }
                }
            }
        }
    }

    async fn find_by_code(&self, code: &str) -> EngineResult<Option<CatalogEntry>> {
        let query = CatalogQuery::by_code(code);
        let page = retry_read(&self.backoff(), "catalog.list", || self.repos.catalog.list(&query)).await?;
        Ok(page.entries.into_iter().next())
    }

    /// 分页读取完整目录快照（每批次重新读取，不跨批次缓存）
    async fn load_catalog_snapshot(&self) -> EngineResult<Vec<CatalogEntry>> {
        let backoff = self.backoff();
        let page_size = self.config.allocation.page_size.max(1);
        let mut entries = Vec::new();

        loop {
            let query = CatalogQuery {
                offset: entries.len(),
                limit: Some(page_size),
                ..Default::default()
            };
            let page = retry_read(&backoff, "catalog.list", || self.repos.catalog.list(&query)).await?;
            let fetched = page.entries.len();
            entries.extend(page.entries);
            if fetched == 0 || entries.len() >= page.total {
                break;
            }
        }

        debug!(entries = entries.len(), "目录快照读取完成");
        Ok(entries)
    }
}

fn classify_existing(draft: &CatalogEntryDraft, existing: Option<&CatalogEntry>) -> CreateOutcome {
    match existing {
        Some(e) if e.canonical_name == draft.canonical_name => CreateOutcome::AlreadyPresent,
        _ => CreateOutcome::Conflict,
    }
}

fn mark_existing(report: &mut ItemReport, hits: &[MatchHit], warnings: &mut Vec<String>) {
    report.matched_codes = hits.iter().map(|h| h.entry.code.clone()).collect();
    report.code = report.matched_codes.first().cloned();
    report.outcome = ItemOutcome::Existing;
    report.enter(SaveState::Existing);

    if hits.len() > 1 {
        let msg = format!(
            "第 {} 项命中多个已有编码: {}",
            report.index,
            report.matched_codes.join(", ")
        );
        warn!(index = report.index, matches = hits.len(), "{}", msg);
        warnings.push(msg);
    }
}

// ==========================================
// 规格校验
// ==========================================

/// 分配前校验规格完整性
pub fn validate_spec(spec: &ProductSpec) -> EngineResult<()> {
    let positive = |field: &str, value: f64| -> EngineResult<()> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(EngineError::validation(field, format!("必须为正数，实际 {}", value)))
        }
    };

    positive("diameter_length", spec.diameter_length)?;

    match spec.family {
        ProductFamily::Mesh => {
            let type_code = spec.type_code.as_deref().map(normalize_type_code).unwrap_or_default();
            if type_code.is_empty() {
                return Err(EngineError::validation("type_code", "网片型号不能为空"));
            }
            positive("diameter_width", spec.effective_diameter_width())?;
            positive("length", spec.length)?;
            positive("width", spec.effective_width())?;
            let (sl, sw) = spec.effective_spacing();
            positive("spacing_length", sl)?;
            positive("spacing_width", sw)?;
            for (field, count) in [
                ("rod_count_length", spec.rod_count_length),
                ("rod_count_width", spec.rod_count_width),
            ] {
                if count == Some(0) {
                    return Err(EngineError::validation(field, "指定根数必须大于 0"));
                }
            }
        }
        ProductFamily::Rod => positive("length", spec.length)?,
        ProductFamily::WireCoil => {}
        ProductFamily::RawCoil => {
            if spec.quality.as_deref().map(str::trim).unwrap_or("").is_empty() {
                return Err(EngineError::validation("quality", "盘条材质不能为空"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_incomplete_mesh() {
        let ok = ProductSpec::mesh("Q257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        assert!(validate_spec(&ok).is_ok());

        let mut no_type = ok.clone();
        no_type.type_code = Some("  ".to_string());
        assert!(matches!(
            validate_spec(&no_type),
            Err(EngineError::Validation { ref field, .. }) if field == "type_code"
        ));

        let mut no_width = ok.clone();
        no_width.width = None;
        assert!(validate_spec(&no_width).is_err());

        let zero_count = ok.clone().with_rod_counts(Some(0), None);
        assert!(validate_spec(&zero_count).is_err());

        assert!(validate_spec(&ProductSpec::rod(5.0, 0.0)).is_err());
        assert!(validate_spec(&ProductSpec::raw_coil(6.0, "")).is_err());
        assert!(validate_spec(&ProductSpec::wire_coil(5.5)).is_ok());
    }

    #[test]
    fn test_report_serializes() {
        let spec = ProductSpec::rod(5.0, 500.0);
        let mut item = ItemReport::new(0, &spec);
        item.fail(&EngineError::validation("length", "bad"));
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"FAILED\""));
        assert!(json.contains("VALIDATION_ERROR"));
    }
}
