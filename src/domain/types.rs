// ==========================================
// 钢筋网片 ERP 集成层 - 领域类型定义
// ==========================================
// 职责: 产品族、尺寸类别、BOM 行角色、保存状态等枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 产品族 (Product Family)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductFamily {
    Mesh,     // 焊接网片（成品）
    Rod,      // 定尺钢筋（半成品）
    WireCoil, // 冷拔钢丝盘条（半成品）
    RawCoil,  // 热轧盘条（原材料）
}

impl ProductFamily {
    /// 数据库存储值
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ProductFamily::Mesh => "MESH",
            ProductFamily::Rod => "ROD",
            ProductFamily::WireCoil => "WIRE",
            ProductFamily::RawCoil => "COIL",
        }
    }

    /// 宽松解析（兼容导入文件中的历史写法）
    pub fn from_str_lenient(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "MESH" | "CH" | "HASIR" | "网片" => Some(ProductFamily::Mesh),
            "ROD" | "NCBK" | "钢筋" => Some(ProductFamily::Rod),
            "WIRE" | "WIRE_COIL" | "WIRECOIL" | "NTEL" | "钢丝" => Some(ProductFamily::WireCoil),
            "COIL" | "RAW_COIL" | "FLM" | "盘条" => Some(ProductFamily::RawCoil),
            _ => None,
        }
    }

    /// 编码前缀
    pub fn code_prefix(&self) -> &'static str {
        match self {
            ProductFamily::Mesh => "CH",
            ProductFamily::Rod => "YM.NCBK",
            ProductFamily::WireCoil => "YM.NTEL",
            ProductFamily::RawCoil => "FLM",
        }
    }
}

impl fmt::Display for ProductFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 尺寸类别 (Size Class)
// ==========================================
// 标准尺寸: 按直径确定性编码，不消耗计数器
// 非标尺寸: 消耗产品族序列号
// 尺寸派生: 半成品/原材料编码直接由 (直径, 长度) 派生
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SizeClass {
    Standard,
    Custom,
    Dimensional,
}

impl SizeClass {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SizeClass::Standard => "STANDARD",
            SizeClass::Custom => "CUSTOM",
            SizeClass::Dimensional => "DIMENSIONAL",
        }
    }

    pub fn from_db_str(raw: &str) -> Self {
        match raw.trim() {
            "STANDARD" => SizeClass::Standard,
            "CUSTOM" => SizeClass::Custom,
            _ => SizeClass::Dimensional,
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// BOM 行角色
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BomRole {
    Component, // 物料消耗
    Operation, // 工序工时
}

impl BomRole {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            BomRole::Component => "COMPONENT",
            BomRole::Operation => "OPERATION",
        }
    }

    pub fn from_db_str(raw: &str) -> Self {
        match raw.trim() {
            "OPERATION" => BomRole::Operation,
            _ => BomRole::Component,
        }
    }
}

// ==========================================
// 数量单位
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuantityUnit {
    Piece,  // 根/件
    Kg,     // 千克
    Second, // 秒（工序）
}

impl QuantityUnit {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            QuantityUnit::Piece => "PCS",
            QuantityUnit::Kg => "KG",
            QuantityUnit::Second => "SEC",
        }
    }

    pub fn from_db_str(raw: &str) -> Self {
        match raw.trim() {
            "PCS" => QuantityUnit::Piece,
            "SEC" => QuantityUnit::Second,
            _ => QuantityUnit::Kg,
        }
    }
}

// ==========================================
// 焊接机型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeldingMachineClass {
    Automatic,     // 自动焊网线
    SemiAutomatic, // 半自动焊机
}

impl WeldingMachineClass {
    pub fn operation_code(&self) -> &'static str {
        match self {
            WeldingMachineClass::Automatic => "OP.WLD.AUTO",
            WeldingMachineClass::SemiAutomatic => "OP.WLD.SEMI",
        }
    }
}

// ==========================================
// 保存状态机 (Save State)
// ==========================================
// ANALYZE → {NEW, EXISTING} → SAVE_PRODUCT → SAVE_COMPONENTS → SAVE_BOM
//   → COMMIT_SEQUENCE → DONE；FAILED 可由任意状态进入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SaveState {
    Analyze,
    New,
    Existing,
    SaveProduct,
    SaveComponents,
    SaveBom,
    CommitSequence,
    Done,
    Failed,
}

impl SaveState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SaveState::Done | SaveState::Failed)
    }
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveState::Analyze => "ANALYZE",
            SaveState::New => "NEW",
            SaveState::Existing => "EXISTING",
            SaveState::SaveProduct => "SAVE_PRODUCT",
            SaveState::SaveComponents => "SAVE_COMPONENTS",
            SaveState::SaveBom => "SAVE_BOM",
            SaveState::CommitSequence => "COMMIT_SEQUENCE",
            SaveState::Done => "DONE",
            SaveState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_lenient_parse() {
        assert_eq!(ProductFamily::from_str_lenient(" mesh "), Some(ProductFamily::Mesh));
        assert_eq!(ProductFamily::from_str_lenient("FLM"), Some(ProductFamily::RawCoil));
        assert_eq!(ProductFamily::from_str_lenient("wire_coil"), Some(ProductFamily::WireCoil));
        assert_eq!(ProductFamily::from_str_lenient("plate"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SaveState::Done.is_terminal());
        assert!(SaveState::Failed.is_terminal());
        assert!(!SaveState::SaveBom.is_terminal());
    }
}
