// ==========================================
// 钢筋网片 ERP 集成层 - 产品目录仓储
// ==========================================
// 红线: Repository 不含业务逻辑，只做数据 CRUD
// 接口: list（过滤/排序/分页，返回总数）、create（冲突信号）、
//       update-by-id、delete-by-id、按业务编码批量删除
// ==========================================

use crate::domain::product::{CatalogEntry, CatalogEntryDraft, RawSpecFields};
use crate::domain::types::{ProductFamily, SizeClass};
use crate::repository::error::{classify_write, RepositoryError, RepositoryResult, StoreOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

// ==========================================
// 查询参数
// ==========================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CatalogSort {
    #[default]
    CodeAsc,
    CodeDesc,
    /// 按编码末段数字（序列号）降序，与前缀中的直径码无关
    SequenceSuffixDesc,
    CreatedAtDesc,
}

impl CatalogSort {
    fn order_by(&self) -> &'static str {
        match self {
            CatalogSort::CodeAsc => "code ASC",
            CatalogSort::CodeDesc => "code DESC",
            // rtrim 去掉末尾数字后的长度 + 1 即末段起点
            CatalogSort::SequenceSuffixDesc => {
                "CAST(substr(code, length(rtrim(code, '0123456789')) + 1) AS INTEGER) DESC, code DESC"
            }
            CatalogSort::CreatedAtDesc => "created_at DESC, id DESC",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogQuery {
    pub family: Option<ProductFamily>,
    pub code: Option<String>,
    pub code_prefix: Option<String>,
    pub canonical_name: Option<String>,
    pub sort: CatalogSort,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl CatalogQuery {
    pub fn by_code(code: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            ..Default::default()
        }
    }

    pub fn by_prefix(code_prefix: &str) -> Self {
        Self {
            code_prefix: Some(code_prefix.to_string()),
            ..Default::default()
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub entries: Vec<CatalogEntry>,
    pub total: usize,
}

// ==========================================
// CatalogStore Trait
// ==========================================
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// 过滤/排序/分页查询
    async fn list(&self, query: &CatalogQuery) -> RepositoryResult<CatalogPage>;

    /// 创建条目；编码已存在时返回 Conflict(已存在条目)
    async fn create(&self, draft: &CatalogEntryDraft)
        -> RepositoryResult<StoreOutcome<CatalogEntry>>;

    async fn update_by_id(
        &self,
        id: i64,
        draft: &CatalogEntryDraft,
    ) -> RepositoryResult<StoreOutcome<CatalogEntry>>;

    async fn delete_by_id(&self, id: i64) -> RepositoryResult<StoreOutcome<()>>;

    /// 按业务编码批量删除，返回删除行数
    async fn delete_by_codes(&self, codes: &[String]) -> RepositoryResult<usize>;
}

// ==========================================
// SqliteCatalogRepository
// ==========================================
pub struct SqliteCatalogRepository {
    conn: Arc<Mutex<Connection>>,
}

const SELECT_COLUMNS: &str = r#"
    id, code, family, size_class, canonical_name, display_name,
    type_code, diameter_length, diameter_width, length, width, spacing,
    weight_kg, created_at, updated_at
"#;

impl SqliteCatalogRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
        let family_raw: String = row.get(2)?;
        Ok(CatalogEntry {
            id: row.get(0)?,
            code: row.get(1)?,
            family: ProductFamily::from_str_lenient(&family_raw).unwrap_or(ProductFamily::Mesh),
            size_class: SizeClass::from_db_str(&row.get::<_, String>(3)?),
            canonical_name: row.get(4)?,
            display_name: row.get(5)?,
            fields: RawSpecFields {
                type_code: row.get(6)?,
                diameter_length: row.get(7)?,
                diameter_width: row.get(8)?,
                length: row.get(9)?,
                width: row.get(10)?,
                spacing: row.get(11)?,
            },
            weight_kg: row.get(12)?,
            created_at: parse_ts(&row.get::<_, String>(13)?),
            updated_at: parse_ts(&row.get::<_, String>(14)?),
        })
    }

    fn find_by_code_locked(conn: &Connection, code: &str) -> rusqlite::Result<Option<CatalogEntry>> {
        conn.query_row(
            &format!("SELECT {} FROM catalog_entry WHERE code = ?1", SELECT_COLUMNS),
            params![code],
            Self::map_row,
        )
        .optional()
    }

    fn find_by_id_locked(conn: &Connection, id: i64) -> rusqlite::Result<Option<CatalogEntry>> {
        conn.query_row(
            &format!("SELECT {} FROM catalog_entry WHERE id = ?1", SELECT_COLUMNS),
            params![id],
            Self::map_row,
        )
        .optional()
    }

    /// 构造 WHERE 子句（参数化）
    fn build_filter(query: &CatalogQuery) -> (String, Vec<Value>) {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(family) = query.family {
            clauses.push("family = ?");
            values.push(Value::Text(family.to_db_str().to_string()));
        }
        if let Some(code) = &query.code {
            clauses.push("code = ?");
            values.push(Value::Text(code.clone()));
        }
        if let Some(prefix) = &query.code_prefix {
            clauses.push("substr(code, 1, length(?)) = ?");
            values.push(Value::Text(prefix.clone()));
            values.push(Value::Text(prefix.clone()));
        }
        if let Some(name) = &query.canonical_name {
            clauses.push("canonical_name = ?");
            values.push(Value::Text(name.clone()));
        }

        if clauses.is_empty() {
            (String::new(), values)
        } else {
            (format!("WHERE {}", clauses.join(" AND ")), values)
        }
    }
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

#[async_trait]
impl CatalogStore for SqliteCatalogRepository {
    async fn list(&self, query: &CatalogQuery) -> RepositoryResult<CatalogPage> {
        let conn = self.get_conn()?;
        let (where_sql, values) = Self::build_filter(query);

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM catalog_entry {}", where_sql),
            params_from_iter(values.iter()),
            |row| row.get(0),
        )?;

        // LIMIT -1 表示不限
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {} FROM catalog_entry {} ORDER BY {} LIMIT {} OFFSET {}",
            SELECT_COLUMNS,
            where_sql,
            query.sort.order_by(),
            limit,
            query.offset
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params_from_iter(values.iter()), Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(CatalogPage {
            entries,
            total: total.max(0) as usize,
        })
    }

    async fn create(
        &self,
        draft: &CatalogEntryDraft,
    ) -> RepositoryResult<StoreOutcome<CatalogEntry>> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();

        let result = conn.execute(
            r#"
            INSERT INTO catalog_entry (
                code, family, size_class, canonical_name, display_name,
                type_code, diameter_length, diameter_width, length, width, spacing,
                weight_kg, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)
            "#,
            params![
                draft.code,
                draft.family.to_db_str(),
                draft.size_class.to_db_str(),
                draft.canonical_name,
                draft.display_name,
                draft.fields.type_code,
                draft.fields.diameter_length,
                draft.fields.diameter_width,
                draft.fields.length,
                draft.fields.width,
                draft.fields.spacing,
                draft.weight_kg,
                now,
            ],
        );

        match classify_write(result)? {
            StoreOutcome::Found(_) => {
                let id = conn.last_insert_rowid();
                match Self::find_by_id_locked(&conn, id)? {
                    Some(entry) => Ok(StoreOutcome::Found(entry)),
                    None => Err(RepositoryError::InternalError(format!(
                        "新建目录条目读取失败: id={}",
                        id
                    ))),
                }
            }
            StoreOutcome::Conflict(_) => {
                let existing = Self::find_by_code_locked(&conn, &draft.code)?;
                Ok(StoreOutcome::Conflict(existing))
            }
            StoreOutcome::NotFound => Ok(StoreOutcome::NotFound),
            StoreOutcome::TransientError(msg) => Ok(StoreOutcome::TransientError(msg)),
        }
    }

    async fn update_by_id(
        &self,
        id: i64,
        draft: &CatalogEntryDraft,
    ) -> RepositoryResult<StoreOutcome<CatalogEntry>> {
        let conn = self.get_conn()?;
        let result = conn.execute(
            r#"
            UPDATE catalog_entry SET
                code = ?1, family = ?2, size_class = ?3, canonical_name = ?4,
                display_name = ?5, type_code = ?6, diameter_length = ?7,
                diameter_width = ?8, length = ?9, width = ?10, spacing = ?11,
                weight_kg = ?12, updated_at = ?13
            WHERE id = ?14
            "#,
            params![
                draft.code,
                draft.family.to_db_str(),
                draft.size_class.to_db_str(),
                draft.canonical_name,
                draft.display_name,
                draft.fields.type_code,
                draft.fields.diameter_length,
                draft.fields.diameter_width,
                draft.fields.length,
                draft.fields.width,
                draft.fields.spacing,
                draft.weight_kg,
                Utc::now().to_rfc3339(),
                id,
            ],
        );

        match classify_write(result)? {
            StoreOutcome::Found(0) => Ok(StoreOutcome::NotFound),
            StoreOutcome::Found(_) => Ok(Self::find_by_id_locked(&conn, id)?
                .map(StoreOutcome::Found)
                .unwrap_or(StoreOutcome::NotFound)),
            StoreOutcome::Conflict(_) => Ok(StoreOutcome::Conflict(Self::find_by_code_locked(
                &conn,
                &draft.code,
            )?)),
            StoreOutcome::NotFound => Ok(StoreOutcome::NotFound),
            StoreOutcome::TransientError(msg) => Ok(StoreOutcome::TransientError(msg)),
        }
    }

    async fn delete_by_id(&self, id: i64) -> RepositoryResult<StoreOutcome<()>> {
        let conn = self.get_conn()?;
        let result = conn.execute("DELETE FROM catalog_entry WHERE id = ?1", params![id]);
        Ok(match classify_write(result)? {
            StoreOutcome::Found(0) => StoreOutcome::NotFound,
            other => other.map(|_| ()),
        })
    }

    async fn delete_by_codes(&self, codes: &[String]) -> RepositoryResult<usize> {
        if codes.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM catalog_entry WHERE code = ?1")?;
            for code in codes {
                deleted += stmt.execute(params![code])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn repo() -> SqliteCatalogRepository {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        SqliteCatalogRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn draft(code: &str) -> CatalogEntryDraft {
        CatalogEntryDraft {
            code: code.to_string(),
            family: ProductFamily::Mesh,
            size_class: SizeClass::Custom,
            canonical_name: format!("NAME {}", code),
            display_name: format!("Display {}", code),
            fields: RawSpecFields {
                type_code: Some("Q257/257".to_string()),
                diameter_length: Some("5,0".to_string()),
                ..Default::default()
            },
            weight_kg: Some(12.5),
        }
    }

    #[tokio::test]
    async fn test_create_then_conflict_returns_existing() {
        let repo = repo();
        let created = repo.create(&draft("CH.OZL.0500.0001")).await.unwrap();
        let created = created.found().expect("应创建成功");
        assert_eq!(created.fields.diameter_length.as_deref(), Some("5,0"));

        let second = repo.create(&draft("CH.OZL.0500.0001")).await.unwrap();
        match second {
            StoreOutcome::Conflict(Some(existing)) => assert_eq!(existing.id, created.id),
            other => panic!("期望冲突, 实际 {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_list_filters_sorts_and_counts() {
        let repo = repo();
        for code in ["CH.OZL.0500.0001", "CH.OZL.0500.0003", "CH.STD.0500.00", "YM.NCBK.0500.500"] {
            repo.create(&draft(code)).await.unwrap();
        }

        let page = repo
            .list(&CatalogQuery {
                code_prefix: Some("CH.OZL.".to_string()),
                sort: CatalogSort::CodeDesc,
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].code, "CH.OZL.0500.0003");
    }

    #[tokio::test]
    async fn test_sequence_suffix_sort_ignores_diameter() {
        let repo = repo();
        for code in ["CH.OZL.1200.0001", "CH.OZL.1000.0002", "CH.OZL.0500.0009", "CH.OZL.0600.10000"] {
            repo.create(&draft(code)).await.unwrap();
        }

        let page = repo
            .list(&CatalogQuery {
                code_prefix: Some("CH.OZL.".to_string()),
                sort: CatalogSort::SequenceSuffixDesc,
                limit: Some(2),
                ..Default::default()
            })
            .await
            .unwrap();

        let codes: Vec<_> = page.entries.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["CH.OZL.0600.10000", "CH.OZL.0500.0009"]);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let repo = repo();
        let entry = repo.create(&draft("CH.OZL.0600.0001")).await.unwrap().found().unwrap();

        let mut changed = draft("CH.OZL.0600.0001");
        changed.display_name = "renamed".to_string();
        let updated = repo.update_by_id(entry.id, &changed).await.unwrap().found().unwrap();
        assert_eq!(updated.display_name, "renamed");

        assert_eq!(repo.update_by_id(9999, &changed).await.unwrap(), StoreOutcome::NotFound);
        assert_eq!(repo.delete_by_id(entry.id).await.unwrap(), StoreOutcome::Found(()));
        assert_eq!(repo.delete_by_id(entry.id).await.unwrap(), StoreOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_delete_by_codes() {
        let repo = repo();
        repo.create(&draft("A")).await.unwrap();
        repo.create(&draft("B")).await.unwrap();
        let deleted = repo
            .delete_by_codes(&["A".to_string(), "B".to_string(), "C".to_string()])
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(repo.list(&CatalogQuery::default()).await.unwrap().total, 0);
    }
}
