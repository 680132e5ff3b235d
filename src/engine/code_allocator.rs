// ==========================================
// 钢筋网片 ERP 集成层 - 编码序列分配器
// ==========================================
// 职责: 批次内分配产品编码，批次结束后回写序列计数器
// 状态: BatchContext 每次保存一个，显式传入每个调用，绝不做全局单例
// 红线:
//   - 真实计数器值 = max(主计数器, 备份副本, 目录扫描到的最大序列号)
//   - 同一批次内同一规格始终得到同一编码
//   - 标准尺寸编码由直径 + 同直径零基计数确定，不消耗计数器
//   - 计数器写入失败不致命，下个批次的扫描会自愈
// ==========================================

use crate::config::{AllocationConfig, StandardSizeConfig};
use crate::domain::product::{ProductCode, ProductSpec};
use crate::domain::sequence::{SequenceCounter, SequenceKey};
use crate::domain::types::{ProductFamily, SizeClass};
use crate::engine::code_format::{
    custom_mesh_code, custom_mesh_prefix, diameter_code, dimensional_code, parse_custom_sequence,
    parse_standard_code, size_class, standard_mesh_code, MESH_SEQUENCE_FAMILY, CUSTOM_TYPE,
    STANDARD_TYPE,
};
use crate::engine::error::EngineResult;
use crate::engine::normalizer::spec_key;
use crate::engine::repositories::EngineRepositories;
use crate::engine::retry::{retry_read, Backoff};
use crate::repository::catalog_repo::{CatalogQuery, CatalogSort};
use crate::repository::error::StoreOutcome;
use crate::repository::sequence_repo::SequenceFilter;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, instrument, warn};

// ==========================================
// BatchContext - 批次分配上下文
// ==========================================
#[derive(Debug, Clone)]
pub struct BatchContext {
    scope: String,
    initialized: bool,
    committed: bool,
    catalog_max: i64,
    start_value: i64,
    working_value: i64,
    cache: HashMap<String, ProductCode>,
    standard_counts: HashMap<String, u32>,
    warnings: Vec<String>,
}

impl BatchContext {
    pub fn new(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            initialized: false,
            committed: false,
            catalog_max: 0,
            start_value: 0,
            working_value: 0,
            cache: HashMap::new(),
            standard_counts: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// 批次起始计数器值
    pub fn start_value(&self) -> i64 {
        self.start_value
    }

    /// 当前工作计数器值
    pub fn working_value(&self) -> i64 {
        self.working_value
    }

    /// 本批次已分配的编码（若有）
    pub fn cached_code(&self, spec: &ProductSpec) -> Option<&ProductCode> {
        self.cache.get(&spec_key(spec))
    }

    /// 数据不一致告警
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn sequence_key(&self) -> SequenceKey {
        SequenceKey::new(MESH_SEQUENCE_FAMILY, CUSTOM_TYPE, &self.scope)
    }
}

/// 计数器回写结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommitSummary {
    pub final_value: i64,
    pub writes: u32,
    pub failures: Vec<String>,
}

// ==========================================
// CodeSequenceAllocator
// ==========================================
pub struct CodeSequenceAllocator {
    repos: EngineRepositories,
    config: AllocationConfig,
    standard: StandardSizeConfig,
}

impl CodeSequenceAllocator {
    pub fn new(
        repos: EngineRepositories,
        config: AllocationConfig,
        standard: StandardSizeConfig,
    ) -> Self {
        Self {
            repos,
            config,
            standard,
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::from_config(&self.config)
    }

    // ==========================================
    // 批次初始化（幂等）
    // ==========================================

    /// 读取主/备计数器并扫描目录，工作计数器取三者最大值；重复调用直接返回首次结果
    #[instrument(skip(self, ctx), fields(scope = %ctx.scope))]
    pub async fn initialize_batch(&self, ctx: &mut BatchContext) -> EngineResult<i64> {
        if ctx.initialized {
            return Ok(ctx.start_value);
        }

        let key = ctx.sequence_key();
        let backoff = self.backoff();

        // 步骤1: 主计数器与备份副本
        let actual_filter = SequenceFilter::for_key(&key);
        let backup_filter = SequenceFilter::for_key(&key.backup());
        let actual_rows = retry_read(&backoff, "sequence.list", || {
            self.repos.sequence.list(&actual_filter)
        })
        .await?;
        let backup_rows = retry_read(&backoff, "sequence.list", || {
            self.repos.sequence.list(&backup_filter)
        })
        .await?;
        let actual = pick_counter(actual_rows);
        let backup = pick_counter(backup_rows);

        // 步骤2: 有界扫描目录（非标序列号 + 标准编码同直径计数）
        let catalog_max = self.scan_max_custom_sequence(&backoff).await?;
        let standard_counts = self.scan_standard_counts(&backoff).await?;

        // 步骤3: 取最大值并检查一致性
        let actual_value = actual.as_ref().map(|c| c.value).unwrap_or(0);
        let backup_value = backup.as_ref().map(|c| c.value).unwrap_or(0);
        let start = actual_value.max(backup_value).max(catalog_max);

        if actual_value != backup_value {
            let msg = format!(
                "计数器不一致 {}: 主={} 备={}，取较大值",
                key, actual_value, backup_value
            );
            warn!(actual = actual_value, backup = backup_value, "{}", msg);
            ctx.warnings.push(msg);
        }
        if catalog_max > actual_value.max(backup_value) {
            let msg = format!(
                "计数器落后于目录 {}: 计数器={} 目录最大序列={}",
                key,
                actual_value.max(backup_value),
                catalog_max
            );
            warn!(catalog_max, "{}", msg);
            ctx.warnings.push(msg);
        }

        ctx.catalog_max = catalog_max;
        ctx.start_value = start;
        ctx.working_value = start;
        ctx.standard_counts = standard_counts;
        ctx.initialized = true;

        info!(
            start,
            actual = actual_value,
            backup = backup_value,
            catalog_max,
            "批次分配上下文初始化完成"
        );
        Ok(start)
    }

    /// 分页扫描非标编码，返回最大序列号
    ///
    /// 直径码在序列号之前，按整串排序会让大直径的老编码挤掉小直径的新编码，
    /// 所以按末段序列号降序取前 scan_limit 条
    async fn scan_max_custom_sequence(&self, backoff: &Backoff) -> EngineResult<i64> {
        let mut max_seq = 0;
        let sort = CatalogSort::SequenceSuffixDesc;
        self.scan_prefix(backoff, &custom_mesh_prefix(), sort, |code| {
            if let Some(seq) = parse_custom_sequence(code) {
                max_seq = max_seq.max(seq);
            }
        })
        .await?;
        Ok(max_seq)
    }

    /// 分页扫描标准编码，返回各直径码下已有数量
    async fn scan_standard_counts(&self, backoff: &Backoff) -> EngineResult<HashMap<String, u32>> {
        let mut counts: HashMap<String, u32> = HashMap::new();
        let prefix = format!("{}.{}.", MESH_SEQUENCE_FAMILY, STANDARD_TYPE);
        self.scan_prefix(backoff, &prefix, CatalogSort::CodeDesc, |code| {
            if let Some((d4, _)) = parse_standard_code(code) {
                *counts.entry(d4).or_insert(0) += 1;
            }
        })
        .await?;
        Ok(counts)
    }

    async fn scan_prefix<F>(
        &self,
        backoff: &Backoff,
        prefix: &str,
        sort: CatalogSort,
        mut visit: F,
    ) -> EngineResult<()>
    where
        F: FnMut(&str),
    {
        let page_size = self.config.page_size.max(1);
        let mut offset = 0;
        while offset < self.config.scan_limit {
            let query = CatalogQuery {
                code_prefix: Some(prefix.to_string()),
                sort,
                offset,
                limit: Some(page_size.min(self.config.scan_limit - offset)),
                ..Default::default()
            };
            let page = retry_read(backoff, "catalog.list", || self.repos.catalog.list(&query)).await?;
            let fetched = page.entries.len();
            for entry in &page.entries {
                visit(&entry.code);
            }
            offset += fetched;
            if fetched == 0 || offset >= page.total {
                break;
            }
        }
        if offset >= self.config.scan_limit {
            debug!(prefix, scan_limit = self.config.scan_limit, "目录扫描达到上限");
        }
        Ok(())
    }

    // ==========================================
    // 编码分配
    // ==========================================

    /// 分配编码；同一批次内相同规格返回缓存结果
    pub async fn next_code(
        &self,
        ctx: &mut BatchContext,
        spec: &ProductSpec,
    ) -> EngineResult<ProductCode> {
        if !ctx.initialized {
            self.initialize_batch(ctx).await?;
        }

        let key = spec_key(spec);
        if let Some(code) = ctx.cache.get(&key) {
            return Ok(code.clone());
        }

        let code = self.issue(ctx, spec);
        debug!(code = %code, key = %key, "分配新编码");
        ctx.cache.insert(key, code.clone());
        Ok(code)
    }

    /// 冲突路径：丢弃缓存编码并发放下一个候选
    pub async fn reallocate(
        &self,
        ctx: &mut BatchContext,
        spec: &ProductSpec,
    ) -> EngineResult<ProductCode> {
        let evicted = ctx.cache.remove(&spec_key(spec));
        let code = self.next_code(ctx, spec).await?;
        info!(
            evicted = evicted.as_ref().map(|c| c.as_str()).unwrap_or(""),
            code = %code,
            "编码冲突，重新分配"
        );
        Ok(code)
    }

    fn issue(&self, ctx: &mut BatchContext, spec: &ProductSpec) -> ProductCode {
        if spec.family != ProductFamily::Mesh {
            // 半成品/原材料编码由尺寸派生，与计数器无关
            return dimensional_code(spec).unwrap_or_else(|| ProductCode::new(""));
        }

        match size_class(spec, &self.standard) {
            SizeClass::Standard => {
                let count = ctx
                    .standard_counts
                    .entry(diameter_code(spec.diameter_length))
                    .or_insert(0);
                let code = standard_mesh_code(spec.diameter_length, *count);
                *count += 1;
                code
            }
            _ => {
                ctx.working_value += 1;
                custom_mesh_code(spec.diameter_length, ctx.working_value)
            }
        }
    }

    // ==========================================
    // 计数器回写
    // ==========================================

    /// 批次写入完成后回写主计数器与备份副本（每批次一次，原地更新，只升不降）
    #[instrument(skip(self, ctx), fields(scope = %ctx.scope))]
    pub async fn commit_batch(&self, ctx: &mut BatchContext) -> CommitSummary {
        let mut summary = CommitSummary {
            final_value: ctx.working_value,
            ..Default::default()
        };
        if !ctx.initialized || ctx.committed {
            return summary;
        }
        ctx.committed = true;

        let key = ctx.sequence_key();
        for target_key in [key.clone(), key.backup()] {
            match self.write_counter(&target_key, ctx.working_value).await {
                Ok(written) => {
                    if written.wrote {
                        summary.writes += 1;
                    }
                    summary.final_value = summary.final_value.max(written.value);
                }
                Err(message) => {
                    warn!(key = %target_key, error = %message, "计数器回写失败，下个批次将由目录扫描自愈");
                    summary.failures.push(format!("{}: {}", target_key, message));
                }
            }
        }

        info!(
            final_value = summary.final_value,
            writes = summary.writes,
            failures = summary.failures.len(),
            "计数器回写完成"
        );
        summary
    }

    /// 写入单个计数器行
    ///
    /// 写前重读当前行：其他批次在本批次初始化之后推高的值不会被压回
    async fn write_counter(&self, key: &SequenceKey, value: i64) -> Result<CounterWrite, String> {
        let backoff = self.backoff();
        let filter = SequenceFilter::for_key(key);
        let mut attempt = 0;

        loop {
            let rows = retry_read(&backoff, "sequence.list", || self.repos.sequence.list(&filter))
                .await
                .map_err(|e| e.to_string())?;
            let current = pick_counter(rows);

            let outcome = match &current {
                Some(row) if row.value >= value => {
                    if row.value > value {
                        debug!(key = %key, stored = row.value, working = value, "计数器已被其他批次推高，跳过回写");
                    }
                    return Ok(CounterWrite {
                        wrote: false,
                        value: row.value,
                    });
                }
                Some(row) => self.repos.sequence.update_by_id(row.id, value).await,
                None if value == 0 => {
                    return Ok(CounterWrite {
                        wrote: false,
                        value: 0,
                    })
                }
                None => self.repos.sequence.create(key, value).await,
            }
            .map_err(|e| e.to_string())?;

            let retry_reason = match outcome {
                StoreOutcome::Found(_) => return Ok(CounterWrite { wrote: true, value }),
                // 行被管理员重置删除或被并发创建：重读后再判断
                StoreOutcome::NotFound => "计数器行已被删除".to_string(),
                StoreOutcome::Conflict(_) => "计数器行并发冲突".to_string(),
                StoreOutcome::TransientError(message) => message,
            };
            attempt += 1;
            if !backoff.allows(attempt) {
                return Err(retry_reason);
            }
            backoff.wait(attempt, "sequence.write").await;
        }
    }
}

/// 单行回写结果：是否写入，以及回写后库中的值
struct CounterWrite {
    wrote: bool,
    value: i64,
}

/// 同 key 多行时取值最大的一行
fn pick_counter(rows: Vec<SequenceCounter>) -> Option<SequenceCounter> {
    if rows.len() > 1 {
        warn!(rows = rows.len(), "同一计数器 key 存在多行");
    }
    rows.into_iter().max_by_key(|row| row.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;
    use crate::engine::code_format::catalog_draft;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn allocator() -> CodeSequenceAllocator {
        allocator_with(AllocationConfig::default())
    }

    fn allocator_with(config: AllocationConfig) -> CodeSequenceAllocator {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        let repos = EngineRepositories::from_connection(Arc::new(Mutex::new(conn)));
        CodeSequenceAllocator::new(repos, config, StandardSizeConfig::default())
    }

    fn custom(length: f64) -> ProductSpec {
        ProductSpec::mesh("Q257", 5.0, 5.0, length, 215.0, 15.0, 15.0)
    }

    #[tokio::test]
    async fn test_next_code_idempotent_within_batch() {
        let alloc = allocator();
        let mut ctx = BatchContext::new("GLOBAL");
        let a = alloc.next_code(&mut ctx, &custom(480.0)).await.unwrap();
        let b = alloc.next_code(&mut ctx, &custom(480.0)).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "CH.OZL.0500.0001");
        assert_eq!(ctx.working_value(), 1);
    }

    #[tokio::test]
    async fn test_sequence_strictly_increasing() {
        let alloc = allocator();
        let mut ctx = BatchContext::new("GLOBAL");
        let mut last = 0;
        for length in [410.0, 420.0, 430.0, 440.0] {
            let code = alloc.next_code(&mut ctx, &custom(length)).await.unwrap();
            let seq = parse_custom_sequence(code.as_str()).unwrap();
            assert!(seq > last);
            last = seq;
        }
    }

    #[tokio::test]
    async fn test_initialize_takes_max_of_sources_and_is_idempotent() {
        let alloc = allocator();
        let key = SequenceKey::new("CH", "OZL", "GLOBAL");
        alloc.repos.sequence.create(&key, 4).await.unwrap();
        alloc.repos.sequence.create(&key.backup(), 7).await.unwrap();
        let spec = custom(480.0);
        let draft = catalog_draft(&spec, &custom_mesh_code(5.0, 12), SizeClass::Custom, None);
        alloc.repos.catalog.create(&draft).await.unwrap();

        let mut ctx = BatchContext::new("GLOBAL");
        let first = alloc.initialize_batch(&mut ctx).await.unwrap();
        let second = alloc.initialize_batch(&mut ctx).await.unwrap();
        assert_eq!(first, 12);
        assert_eq!(first, second);
        assert_eq!(ctx.warnings().len(), 2);

        let code = alloc.next_code(&mut ctx, &custom(490.0)).await.unwrap();
        assert_eq!(code.as_str(), "CH.OZL.0500.0013");
    }

    #[tokio::test]
    async fn test_bounded_scan_finds_max_sequence_across_diameters() {
        let alloc = allocator_with(AllocationConfig {
            scan_limit: 2,
            page_size: 1,
            ..Default::default()
        });
        let spec = custom(480.0);
        for code in ["CH.OZL.1200.0001", "CH.OZL.1000.0002", "CH.OZL.0500.0009"] {
            let draft = catalog_draft(&spec, &ProductCode::new(code), SizeClass::Custom, None);
            alloc.repos.catalog.create(&draft).await.unwrap();
        }

        let mut ctx = BatchContext::new("GLOBAL");
        assert_eq!(alloc.initialize_batch(&mut ctx).await.unwrap(), 9);

        let spec = ProductSpec::mesh("Q257", 12.0, 12.0, 480.0, 215.0, 15.0, 15.0);
        let code = alloc.next_code(&mut ctx, &spec).await.unwrap();
        assert_eq!(code.as_str(), "CH.OZL.1200.0010");
    }

    #[tokio::test]
    async fn test_standard_code_uses_no_counter() {
        let alloc = allocator();
        let mut ctx = BatchContext::new("GLOBAL");
        let spec = ProductSpec::mesh("Q257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        let code = alloc.next_code(&mut ctx, &spec).await.unwrap();
        assert_eq!(code.as_str(), "CH.STD.0500.00");

        let other = ProductSpec::mesh("Q257", 5.0, 5.0, 500.0, 215.0, 15.0, 25.0);
        let code = alloc.next_code(&mut ctx, &other).await.unwrap();
        assert_eq!(code.as_str(), "CH.STD.0500.01");

        let summary = alloc.commit_batch(&mut ctx).await;
        assert_eq!(summary.writes, 0);
        let rows = alloc.repos.sequence.list(&SequenceFilter::default()).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_reallocate_moves_to_next_candidate() {
        let alloc = allocator();
        let mut ctx = BatchContext::new("GLOBAL");
        let first = alloc.next_code(&mut ctx, &custom(480.0)).await.unwrap();
        let second = alloc.reallocate(&mut ctx, &custom(480.0)).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(
            alloc.next_code(&mut ctx, &custom(480.0)).await.unwrap(),
            second
        );
    }

    #[tokio::test]
    async fn test_commit_updates_both_rows_in_place() {
        let alloc = allocator();
        let key = SequenceKey::new("CH", "OZL", "GLOBAL");
        alloc.repos.sequence.create(&key, 2).await.unwrap();

        let mut ctx = BatchContext::new("GLOBAL");
        alloc.next_code(&mut ctx, &custom(480.0)).await.unwrap();
        let summary = alloc.commit_batch(&mut ctx).await;
        assert_eq!(summary.final_value, 3);
        assert_eq!(summary.writes, 2);
        assert!(summary.failures.is_empty());

        // 再次提交不写
        assert_eq!(alloc.commit_batch(&mut ctx).await.writes, 0);

        let rows = alloc.repos.sequence.list(&SequenceFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.value == 3));
    }

    #[tokio::test]
    async fn test_commit_never_lowers_counter_raised_by_other_batch() {
        let alloc = allocator();
        let key = SequenceKey::new("CH", "OZL", "GLOBAL");
        let actual = alloc.repos.sequence.create(&key, 3).await.unwrap().found().unwrap();
        let backup = alloc.repos.sequence.create(&key.backup(), 3).await.unwrap().found().unwrap();

        let mut ctx = BatchContext::new("GLOBAL");
        assert_eq!(alloc.initialize_batch(&mut ctx).await.unwrap(), 3);

        // 另一个批次在本批次初始化之后提交到 10
        alloc.repos.sequence.update_by_id(actual.id, 10).await.unwrap();
        alloc.repos.sequence.update_by_id(backup.id, 10).await.unwrap();

        let code = alloc.next_code(&mut ctx, &custom(480.0)).await.unwrap();
        assert_eq!(code.as_str(), "CH.OZL.0500.0004");

        let summary = alloc.commit_batch(&mut ctx).await;
        assert_eq!(summary.writes, 0);
        assert_eq!(summary.final_value, 10);
        assert!(summary.failures.is_empty());

        let rows = alloc.repos.sequence.list(&SequenceFilter::default()).await.unwrap();
        let values: Vec<_> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![10, 10]);
    }

    #[tokio::test]
    async fn test_commit_recreates_row_deleted_after_initialize() {
        let alloc = allocator();
        let key = SequenceKey::new("CH", "OZL", "GLOBAL");
        alloc.repos.sequence.create(&key, 5).await.unwrap();
        alloc.repos.sequence.create(&key.backup(), 5).await.unwrap();

        let mut ctx = BatchContext::new("GLOBAL");
        alloc.next_code(&mut ctx, &custom(480.0)).await.unwrap();
        alloc.repos.sequence.admin_reset(&key).await.unwrap();

        let summary = alloc.commit_batch(&mut ctx).await;
        assert_eq!(summary.writes, 2);
        assert_eq!(summary.final_value, 6);
        let rows = alloc.repos.sequence.list(&SequenceFilter::for_key(&key)).await.unwrap();
        assert_eq!(rows[0].value, 6);
    }

    #[tokio::test]
    async fn test_dimensional_codes_shared() {
        let alloc = allocator();
        let mut ctx = BatchContext::new("GLOBAL");
        let a = alloc.next_code(&mut ctx, &ProductSpec::rod(5.0, 500.0)).await.unwrap();
        let b = alloc.next_code(&mut ctx, &ProductSpec::rod(5.0, 500.0)).await.unwrap();
        assert_eq!(a.as_str(), "YM.NCBK.0500.500");
        assert_eq!(a, b);
        assert_eq!(ctx.working_value(), 0);
    }
}
