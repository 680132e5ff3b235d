// ==========================================
// 故障注入测试
// ==========================================
// 测试目标: 编码冲突重分配、瞬时错误退避重试、先查后建、单项失败隔离
// 手段: 包装 SQLite 目录仓储，按编码注入冲突/瞬时错误
// ==========================================


use async_trait::async_trait;
use mesh_erp::domain::product::{CatalogEntry, CatalogEntryDraft};
use mesh_erp::domain::types::SaveState;
use mesh_erp::engine::{EngineRepositories, ItemOutcome};
use mesh_erp::repository::{CatalogPage, CatalogQuery, CatalogStore, RepositoryResult, StoreOutcome};
use std::sync::{Arc, Mutex};
use test_helpers::*;

const SCOPE: &str = "GLOBAL";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    /// 写入前由"其他客户端"抢先占用该编码（不同规格）
    ForeignWriter { times: usize },
    /// 写入已生效但响应丢失
    LostResponse { times: usize },
    /// 始终繁忙
    AlwaysBusy,
}

struct FaultyCatalog {
    inner: Arc<dyn CatalogStore>,
    code_prefix: String,
    fault: Fault,
    injected: Mutex<usize>,
}

impl FaultyCatalog {
    fn wrap(repos: &EngineRepositories, code_prefix: &str, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            inner: repos.catalog.clone(),
            code_prefix: code_prefix.to_string(),
            fault,
            injected: Mutex::new(0),
        })
    }

    /// 本次调用是否注入故障（锁不跨 await）
    fn should_inject(&self, draft: &CatalogEntryDraft) -> bool {
        if !draft.code.starts_with(&self.code_prefix) {
            return false;
        }
        let mut injected = self.injected.lock().unwrap();
        let limit = match self.fault {
            Fault::ForeignWriter { times } | Fault::LostResponse { times } => times,
            Fault::AlwaysBusy => usize::MAX,
        };
        if *injected < limit {
            *injected += 1;
            true
        } else {
            false
        }
    }

    fn injected(&self) -> usize {
        *self.injected.lock().unwrap()
    }
}

#[async_trait]
impl CatalogStore for FaultyCatalog {
    async fn list(&self, query: &CatalogQuery) -> RepositoryResult<CatalogPage> {
        self.inner.list(query).await
    }

    async fn create(
        &self,
        draft: &CatalogEntryDraft,
    ) -> RepositoryResult<StoreOutcome<CatalogEntry>> {
        if !self.should_inject(draft) {
            return self.inner.create(draft).await;
        }

        match self.fault {
            Fault::ForeignWriter { .. } => {
                let foreign = CatalogEntryDraft {
                    canonical_name: format!("FOREIGN {}", draft.code),
                    display_name: "其他客户端写入".to_string(),
                    ..draft.clone()
                };
                self.inner.create(&foreign).await?;
                self.inner.create(draft).await
            }
            Fault::LostResponse { .. } => {
                self.inner.create(draft).await?;
                Ok(StoreOutcome::TransientError("response lost".to_string()))
            }
            Fault::AlwaysBusy => Ok(StoreOutcome::TransientError("database busy".to_string())),
        }
    }

    async fn update_by_id(
        &self,
        id: i64,
        draft: &CatalogEntryDraft,
    ) -> RepositoryResult<StoreOutcome<CatalogEntry>> {
        self.inner.update_by_id(id, draft).await
    }

    async fn delete_by_id(&self, id: i64) -> RepositoryResult<StoreOutcome<()>> {
        self.inner.delete_by_id(id).await
    }

    async fn delete_by_codes(&self, codes: &[String]) -> RepositoryResult<usize> {
        self.inner.delete_by_codes(codes).await
    }
}

async fn entries_with_code(repos: &EngineRepositories, code: &str) -> Vec<CatalogEntry> {
    repos
        .catalog
        .list(&CatalogQuery::by_code(code))
        .await
        .unwrap()
        .entries
}

// ==========================================
// 编码冲突 → 重新分配
// ==========================================
#[tokio::test]
async fn test_code_taken_by_other_writer_is_reallocated() {
    let (_temp, db_path) = create_test_db().unwrap();
    let repos = create_repos(&db_path);
    let faulty = FaultyCatalog::wrap(&repos, "CH.OZL.", Fault::ForeignWriter { times: 1 });
    let orchestrator = create_orchestrator(repos.clone().with_catalog(faulty.clone()));

    let report = orchestrator.save_batch(&[custom_mesh_a()], SCOPE).await;

    let item = &report.items[0];
    assert_eq!(item.outcome, ItemOutcome::Saved);
    assert_eq!(item.code.as_deref(), Some("CH.OZL.0500.0002"));
    assert_eq!(faulty.injected(), 1);

    // 被占用的编码保留他人数据
    let taken = entries_with_code(&repos, "CH.OZL.0500.0001").await;
    assert_eq!(taken.len(), 1);
    assert!(taken[0].canonical_name.starts_with("FOREIGN"));

    assert_eq!(report.counter_after, 2);
}

#[tokio::test]
async fn test_conflict_retries_are_bounded() {
    let (_temp, db_path) = create_test_db().unwrap();
    let repos = create_repos(&db_path);
    let faulty = FaultyCatalog::wrap(&repos, "CH.OZL.", Fault::ForeignWriter { times: usize::MAX });
    let orchestrator = create_orchestrator(repos.clone().with_catalog(faulty.clone()));

    let report = orchestrator
        .save_batch(&[custom_mesh_a(), standard_mesh()], SCOPE)
        .await;

    let failed = &report.items[0];
    assert_eq!(failed.outcome, ItemOutcome::Failed);
    assert_eq!(failed.error_kind.as_deref(), Some("CONFLICT_ERROR"));
    assert_eq!(
        failed.trail,
        vec![
            SaveState::Analyze,
            SaveState::New,
            SaveState::SaveProduct,
            SaveState::Failed
        ]
    );
    // 首次 + max_conflict_retries 次重分配
    let max_retries = fast_config().allocation.max_conflict_retries as usize;
    assert_eq!(faulty.injected(), max_retries + 1);

    // 同批次其他项不受影响
    assert_eq!(report.items[1].outcome, ItemOutcome::Saved);
    assert_eq!(report.items[1].code.as_deref(), Some("CH.STD.0500.00"));
}

// ==========================================
// 瞬时错误 → 先查后建
// ==========================================
#[tokio::test]
async fn test_lost_response_does_not_duplicate_entry() {
    let (_temp, db_path) = create_test_db().unwrap();
    let repos = create_repos(&db_path);
    let faulty = FaultyCatalog::wrap(&repos, "CH.OZL.", Fault::LostResponse { times: 1 });
    let orchestrator = create_orchestrator(repos.clone().with_catalog(faulty));

    let report = orchestrator.save_batch(&[custom_mesh_a()], SCOPE).await;

    let item = &report.items[0];
    assert_eq!(item.outcome, ItemOutcome::Saved);
    assert_eq!(item.code.as_deref(), Some("CH.OZL.0500.0001"));
    assert_eq!(entries_with_code(&repos, "CH.OZL.0500.0001").await.len(), 1);

    // 网片 + 两种钢筋 + 盘条
    assert_eq!(catalog_total(&repos).await, 4);
    let lines = repos.bom.list_by_parent("CH.OZL.0500.0001").await.unwrap();
    assert_eq!(lines.len(), 3);
}

#[tokio::test]
async fn test_persistent_busy_fails_only_that_item() {
    let (_temp, db_path) = create_test_db().unwrap();
    let repos = create_repos(&db_path);
    let faulty = FaultyCatalog::wrap(&repos, "YM.NCBK.0500.300", Fault::AlwaysBusy);
    let orchestrator = create_orchestrator(repos.clone().with_catalog(faulty));

    let report = orchestrator
        .save_batch(&[custom_mesh_a(), standard_mesh()], SCOPE)
        .await;

    let failed = &report.items[0];
    assert_eq!(failed.outcome, ItemOutcome::Failed);
    assert_eq!(failed.error_kind.as_deref(), Some("TRANSIENT_IO_ERROR"));
    assert_eq!(failed.final_state, SaveState::Failed);
    assert!(failed.trail.contains(&SaveState::SaveComponents));

    // 已写入的产品条目不回滚
    assert_eq!(entries_with_code(&repos, "CH.OZL.0500.0001").await.len(), 1);

    assert_eq!(report.items[1].outcome, ItemOutcome::Saved);
    assert_eq!(report.count(ItemOutcome::Failed), 1);
}
