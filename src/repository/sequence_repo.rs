// ==========================================
// 钢筋网片 ERP 集成层 - 序列计数器仓储
// ==========================================
// 接口: 查询（过滤）、创建、按 id 原地更新；
//       仅管理员重置可删除，正常流程不删除、不重复插入同 scope 行
// ==========================================

use crate::domain::sequence::{SequenceCounter, SequenceKey};
use crate::repository::error::{classify_write, RepositoryError, RepositoryResult, StoreOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct SequenceFilter {
    pub family: Option<String>,
    pub subtype: Option<String>,
    pub scope: Option<String>,
}

impl SequenceFilter {
    pub fn for_key(key: &SequenceKey) -> Self {
        Self {
            family: Some(key.family.clone()),
            subtype: Some(key.subtype.clone()),
            scope: Some(key.scope.clone()),
        }
    }
}

#[async_trait]
pub trait SequenceCounterStore: Send + Sync {
    async fn list(&self, filter: &SequenceFilter) -> RepositoryResult<Vec<SequenceCounter>>;

    async fn create(
        &self,
        key: &SequenceKey,
        value: i64,
    ) -> RepositoryResult<StoreOutcome<SequenceCounter>>;

    async fn update_by_id(
        &self,
        id: i64,
        value: i64,
    ) -> RepositoryResult<StoreOutcome<SequenceCounter>>;

    /// 管理员重置：删除指定 key 的计数器行
    async fn admin_reset(&self, key: &SequenceKey) -> RepositoryResult<usize>;
}

pub struct SqliteSequenceCounterRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSequenceCounterRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<SequenceCounter> {
        Ok(SequenceCounter {
            id: row.get(0)?,
            key: SequenceKey {
                family: row.get(1)?,
                subtype: row.get(2)?,
                scope: row.get(3)?,
            },
            value: row.get(4)?,
            updated_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(5)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default(),
        })
    }

    fn find_locked(
        conn: &Connection,
        sql_where: &str,
        value: Value,
    ) -> rusqlite::Result<Option<SequenceCounter>> {
        conn.query_row(
            &format!(
                "SELECT id, family, subtype, scope, value, updated_at FROM sequence_counter WHERE {}",
                sql_where
            ),
            params![value],
            Self::map_row,
        )
        .optional()
    }
}

#[async_trait]
impl SequenceCounterStore for SqliteSequenceCounterRepository {
    async fn list(&self, filter: &SequenceFilter) -> RepositoryResult<Vec<SequenceCounter>> {
        let conn = self.get_conn()?;
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        for (column, value) in [
            ("family", &filter.family),
            ("subtype", &filter.subtype),
            ("scope", &filter.scope),
        ] {
            if let Some(v) = value {
                clauses.push(format!("{} = ?", column));
                values.push(Value::Text(v.clone()));
            }
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let mut stmt = conn.prepare(&format!(
            "SELECT id, family, subtype, scope, value, updated_at FROM sequence_counter {} ORDER BY id ASC",
            where_sql
        ))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    async fn create(
        &self,
        key: &SequenceKey,
        value: i64,
    ) -> RepositoryResult<StoreOutcome<SequenceCounter>> {
        let conn = self.get_conn()?;
        let result = conn.execute(
            "INSERT INTO sequence_counter (family, subtype, scope, value, updated_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key.family, key.subtype, key.scope, value, Utc::now().to_rfc3339()],
        );

        match classify_write(result)? {
            StoreOutcome::Found(_) => {
                let id = conn.last_insert_rowid();
                Ok(Self::find_locked(&conn, "id = ?1", Value::Integer(id))?
                    .map(StoreOutcome::Found)
                    .unwrap_or(StoreOutcome::NotFound))
            }
            StoreOutcome::Conflict(_) => {
                let existing = conn
                    .query_row(
                        "SELECT id, family, subtype, scope, value, updated_at FROM sequence_counter WHERE family = ?1 AND subtype = ?2 AND scope = ?3",
                        params![key.family, key.subtype, key.scope],
                        Self::map_row,
                    )
                    .optional()?;
                Ok(StoreOutcome::Conflict(existing))
            }
            StoreOutcome::NotFound => Ok(StoreOutcome::NotFound),
            StoreOutcome::TransientError(msg) => Ok(StoreOutcome::TransientError(msg)),
        }
    }

    async fn update_by_id(
        &self,
        id: i64,
        value: i64,
    ) -> RepositoryResult<StoreOutcome<SequenceCounter>> {
        let conn = self.get_conn()?;
        let result = conn.execute(
            "UPDATE sequence_counter SET value = ?1, updated_at = ?2 WHERE id = ?3",
            params![value, Utc::now().to_rfc3339(), id],
        );

        match classify_write(result)? {
            StoreOutcome::Found(0) => Ok(StoreOutcome::NotFound),
            StoreOutcome::Found(_) => Ok(Self::find_locked(&conn, "id = ?1", Value::Integer(id))?
                .map(StoreOutcome::Found)
                .unwrap_or(StoreOutcome::NotFound)),
            StoreOutcome::Conflict(_) => Ok(StoreOutcome::Conflict(None)),
            StoreOutcome::NotFound => Ok(StoreOutcome::NotFound),
            StoreOutcome::TransientError(msg) => Ok(StoreOutcome::TransientError(msg)),
        }
    }

    async fn admin_reset(&self, key: &SequenceKey) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM sequence_counter WHERE family = ?1 AND subtype = ?2 AND scope = ?3",
            params![key.family, key.subtype, key.scope],
        )?;
        tracing::warn!(key = %key, deleted, "序列计数器已被管理员重置");
        Ok(deleted)
    }
}
