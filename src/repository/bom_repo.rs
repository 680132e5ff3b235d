// ==========================================
// 钢筋网片 ERP 集成层 - BOM 行仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 接口: 按父件编码查询、创建、按父件批量删除、按类别整体清理
// ==========================================

use crate::domain::bom::{BomLine, BomLineDraft};
use crate::domain::types::{BomRole, QuantityUnit};
use crate::repository::error::{classify_write, RepositoryError, RepositoryResult, StoreOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait BomLineStore: Send + Sync {
    async fn list_by_parent(&self, parent_code: &str) -> RepositoryResult<Vec<BomLine>>;

    async fn create(&self, draft: &BomLineDraft) -> RepositoryResult<StoreOutcome<BomLine>>;

    /// 删除父件下全部 BOM 行
    async fn delete_by_parent(&self, parent_code: &str) -> RepositoryResult<usize>;

    /// 整类清理（全部物料行或全部工序行）
    async fn delete_by_role(&self, role: BomRole) -> RepositoryResult<usize>;
}

pub struct SqliteBomLineRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBomLineRepository {
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<BomLine> {
        Ok(BomLine {
            id: row.get(0)?,
            parent_code: row.get(1)?,
            item_code: row.get(2)?,
            role: BomRole::from_db_str(&row.get::<_, String>(3)?),
            quantity: row.get(4)?,
            unit: QuantityUnit::from_db_str(&row.get::<_, String>(5)?),
            duration_s: row.get(6)?,
            seq_no: row.get(7)?,
            created_at: DateTime::parse_from_rfc3339(&row.get::<_, String>(8)?)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_default(),
        })
    }
}

#[async_trait]
impl BomLineStore for SqliteBomLineRepository {
    async fn list_by_parent(&self, parent_code: &str) -> RepositoryResult<Vec<BomLine>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, parent_code, item_code, role, quantity, unit, duration_s, seq_no, created_at
            FROM bom_line
            WHERE parent_code = ?1
            ORDER BY seq_no ASC, id ASC
            "#,
        )?;
        let lines = stmt
            .query_map(params![parent_code], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(lines)
    }

    async fn create(&self, draft: &BomLineDraft) -> RepositoryResult<StoreOutcome<BomLine>> {
        let conn = self.get_conn()?;
        let now = Utc::now();
        let result = conn.execute(
            r#"
            INSERT INTO bom_line (
                parent_code, item_code, role, quantity, unit, duration_s, seq_no, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                draft.parent_code,
                draft.item_code,
                draft.role.to_db_str(),
                draft.quantity,
                draft.unit.to_db_str(),
                draft.duration_s,
                draft.seq_no,
                now.to_rfc3339(),
            ],
        );

        let id = conn.last_insert_rowid();
        Ok(classify_write(result)?.map(|_| BomLine {
            id,
            parent_code: draft.parent_code.clone(),
            item_code: draft.item_code.clone(),
            role: draft.role,
            quantity: draft.quantity,
            unit: draft.unit,
            duration_s: draft.duration_s,
            seq_no: draft.seq_no,
            created_at: now,
        }))
    }

    async fn delete_by_parent(&self, parent_code: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM bom_line WHERE parent_code = ?1", params![parent_code])?)
    }

    async fn delete_by_role(&self, role: BomRole) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM bom_line WHERE role = ?1", params![role.to_db_str()])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn repo() -> SqliteBomLineRepository {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        SqliteBomLineRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn line(parent: &str, item: &str, role: BomRole, seq_no: i32) -> BomLineDraft {
        BomLineDraft {
            parent_code: parent.to_string(),
            item_code: item.to_string(),
            role,
            quantity: 2.0,
            unit: QuantityUnit::Piece,
            duration_s: None,
            seq_no,
        }
    }

    #[tokio::test]
    async fn test_create_list_and_delete_by_parent() {
        let repo = repo();
        repo.create(&line("P1", "C2", BomRole::Component, 2)).await.unwrap();
        repo.create(&line("P1", "C1", BomRole::Component, 1)).await.unwrap();
        repo.create(&line("P2", "C1", BomRole::Component, 1)).await.unwrap();

        let lines = repo.list_by_parent("P1").await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].item_code, "C1");

        assert_eq!(repo.delete_by_parent("P1").await.unwrap(), 2);
        assert_eq!(repo.list_by_parent("P2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_role_purges_category() {
        let repo = repo();
        repo.create(&line("P1", "C1", BomRole::Component, 1)).await.unwrap();
        repo.create(&line("P1", "OP.CUT", BomRole::Operation, 2)).await.unwrap();

        assert_eq!(repo.delete_by_role(BomRole::Operation).await.unwrap(), 1);
        let remaining = repo.list_by_parent("P1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].role, BomRole::Component);
    }
}
