// ==========================================
// 钢筋网片 ERP 集成层 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// 约定: 每个参数分组以 JSON 存于一个 key，缺省字段回落到默认值
// ==========================================

use crate::config::engine_config::{
    AllocationConfig, DurationConfig, EngineConfig, MatchingConfig, MaterialConfig,
    StandardSizeConfig,
};
use crate::db::open_shared_connection;
use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// 配置键
// ==========================================
pub mod config_keys {
    pub const MATCHING: &str = "engine/matching";
    pub const ALLOCATION: &str = "engine/allocation";
    pub const STANDARD_SIZES: &str = "engine/standard_sizes";
    pub const MATERIAL: &str = "engine/material";
    pub const DURATIONS: &str = "engine/durations";
    /// 单独覆写模糊阈值（优先于 engine/matching 中的值）
    pub const FUZZY_THRESHOLD: &str = "fuzzy_threshold";
    /// 默认序列作用域
    pub const DEFAULT_SCOPE: &str = "default_scope";
}

/// 未配置时的序列作用域
pub const DEFAULT_SCOPE_VALUE: &str = "GLOBAL";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_shared_connection(db_path)?;
        Ok(Self { conn })
    }

    /// 从已有连接创建 ConfigManager
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 写入 global scope 配置值（UPSERT）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 读取 JSON 分组；格式错误时记录告警并使用默认值
    fn get_section<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T, Box<dyn Error>> {
        match self.get_config_value(key)? {
            Some(raw) => match serde_json::from_str::<T>(&raw) {
                Ok(v) => Ok(v),
                Err(e) => {
                    warn!(key, error = %e, "配置格式错误，使用默认值");
                    Ok(T::default())
                }
            },
            None => Ok(T::default()),
        }
    }

    /// 加载引擎参数总集
    pub fn load_engine_config(&self) -> Result<EngineConfig, Box<dyn Error>> {
        let mut matching: MatchingConfig = self.get_section(config_keys::MATCHING)?;
        if let Some(raw) = self.get_config_value(config_keys::FUZZY_THRESHOLD)? {
            match raw.trim().parse::<f64>() {
                Ok(v) if (0.0..=1.0).contains(&v) => matching.fuzzy_threshold = v,
                _ => warn!(value = %raw, "fuzzy_threshold 配置无效，忽略"),
            }
        }

        Ok(EngineConfig {
            matching,
            allocation: self.get_section::<AllocationConfig>(config_keys::ALLOCATION)?,
            standard: self.get_section::<StandardSizeConfig>(config_keys::STANDARD_SIZES)?,
            material: self.get_section::<MaterialConfig>(config_keys::MATERIAL)?,
            durations: self.get_section::<DurationConfig>(config_keys::DURATIONS)?,
        })
    }

    /// 获取默认序列作用域
    pub fn get_default_scope(&self) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(config_keys::DEFAULT_SCOPE)?
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SCOPE_VALUE.to_string()))
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }

    /// 从配置快照恢复配置（覆盖现有 global 配置）
    pub fn restore_config_from_snapshot(&self, snapshot_json: &str) -> Result<usize, Box<dyn Error>> {
        let config_map: HashMap<String, String> = serde_json::from_str(snapshot_json)?;

        let mut conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let tx = conn.transaction()?;

        let mut count = 0;
        for (key, value) in config_map.iter() {
            count += tx.execute(
                "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
                 ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
        }

        tx.commit()?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ensure_schema;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_defaults_when_empty() {
        let cfg = manager().load_engine_config().unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn test_fuzzy_threshold_override() {
        let mgr = manager();
        mgr.set_config_value(config_keys::FUZZY_THRESHOLD, "0.92").unwrap();
        mgr.set_config_value(config_keys::ALLOCATION, r#"{"max_conflict_retries": 5}"#)
            .unwrap();

        let cfg = mgr.load_engine_config().unwrap();
        assert_eq!(cfg.matching.fuzzy_threshold, 0.92);
        assert_eq!(cfg.allocation.max_conflict_retries, 5);
        assert_eq!(cfg.allocation.scan_limit, 5_000);
    }

    #[test]
    fn test_malformed_section_falls_back() {
        let mgr = manager();
        mgr.set_config_value(config_keys::MATERIAL, "not json").unwrap();
        mgr.set_config_value(config_keys::FUZZY_THRESHOLD, "1.7").unwrap();
        let cfg = mgr.load_engine_config().unwrap();
        assert_eq!(cfg.material, MaterialConfig::default());
        assert_eq!(cfg.matching.fuzzy_threshold, 0.80);
    }

    #[test]
    fn test_snapshot_roundtrip_and_scope() {
        let mgr = manager();
        assert_eq!(mgr.get_default_scope().unwrap(), DEFAULT_SCOPE_VALUE);
        mgr.set_config_value(config_keys::DEFAULT_SCOPE, "2026").unwrap();
        let snapshot = mgr.get_config_snapshot().unwrap();

        let other = manager();
        assert_eq!(other.restore_config_from_snapshot(&snapshot).unwrap(), 1);
        assert_eq!(other.get_default_scope().unwrap(), "2026");
    }
}
