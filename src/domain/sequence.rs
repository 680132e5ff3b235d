// ==========================================
// 钢筋网片 ERP 集成层 - 序列计数器领域模型
// ==========================================
// 计数器按 (family, subtype, scope) 唯一
// 主计数器 subtype = OZL，备份副本 subtype = OZL_BACKUP
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 备份副本 subtype 后缀
pub const BACKUP_SUFFIX: &str = "_BACKUP";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub family: String,
    pub subtype: String,
    pub scope: String,
}

impl SequenceKey {
    pub fn new(family: &str, subtype: &str, scope: &str) -> Self {
        Self {
            family: family.to_string(),
            subtype: subtype.to_string(),
            scope: scope.to_string(),
        }
    }

    /// 对应的备份副本 key
    pub fn backup(&self) -> Self {
        Self {
            family: self.family.clone(),
            subtype: format!("{}{}", self.subtype, BACKUP_SUFFIX),
            scope: self.scope.clone(),
        }
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.family, self.subtype, self.scope)
    }
}

// ==========================================
// SequenceCounter - 序列计数器行
// ==========================================
// 对齐: sequence_counter 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceCounter {
    pub id: i64,
    pub key: SequenceKey,
    pub value: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_key() {
        let key = SequenceKey::new("CH", "OZL", "2026");
        let backup = key.backup();
        assert_eq!(backup.subtype, "OZL_BACKUP");
        assert_eq!(backup.scope, "2026");
        assert_eq!(key.to_string(), "CH/OZL/2026");
    }
}
