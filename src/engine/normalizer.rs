// ==========================================
// 钢筋网片 ERP 集成层 - 产品标识规范化
// ==========================================
// 职责: 把历史上格式不统一的规格文本规范化为可比较的字符串
// 约定: 纯函数，不返回错误；缺失输入返回空串
// 覆盖: 小数逗号/点、尾随零 (5.0→5)、空白与标点、乘号 (x X × * → x)、
//       型号中冗余的配对直径后缀 (/NNN)、单值网孔间距 (15 → 15x15)
// ==========================================

use crate::domain::product::ProductSpec;
use crate::domain::types::ProductFamily;
use regex::{Captures, Regex};
use std::sync::OnceLock;

static DECIMAL_COMMA: OnceLock<Regex> = OnceLock::new();
static MULTIPLY_SEP: OnceLock<Regex> = OnceLock::new();
static TRAILING_ZEROS: OnceLock<Regex> = OnceLock::new();
static DANGLING_POINT: OnceLock<Regex> = OnceLock::new();
static PAIRED_SUFFIX: OnceLock<Regex> = OnceLock::new();
static UNIT_SUFFIX: OnceLock<Regex> = OnceLock::new();
static SINGLE_NUMBER: OnceLock<Regex> = OnceLock::new();
static SPLIT_TYPE_CODE: OnceLock<Regex> = OnceLock::new();

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("静态正则表达式"))
}

/// 模糊比较前丢弃的单位/冗余词
const FUZZY_NOISE_TOKENS: &[&str] = &["MM", "CM", "KG", "M", "Ø", "FI", "PHI", "ADET", "PCS"];

/// 模糊比较前纠正的常见笔误（希腊/西里尔字母 O 混入）
const FUZZY_TYPO_FIXES: &[(&str, &str)] = &[("Ο", "O"), ("О", "O")];

// ==========================================
// 通用规范化
// ==========================================

/// 规范化任意规格文本
pub fn normalize(text: Option<&str>) -> String {
    match text {
        Some(t) => normalize_str(t),
        None => String::new(),
    }
}

/// 规范化规格文本（非空引用版本）
pub fn normalize_str(text: &str) -> String {
    let mut s = text.trim().to_uppercase();
    if s.is_empty() {
        return s;
    }

    // 1. 小数逗号 → 小数点（逗号两侧须紧贴数字，"15, 25" 是列表分隔）
    s = regex(&DECIMAL_COMMA, r"(\d),(\d)")
        .replace_all(&s, "$1.$2")
        .into_owned();

    // 2. 乘号统一；"5X5X5" 相邻匹配共享数字，循环直到稳定
    let sep = regex(&MULTIPLY_SEP, r"(\d)\s*[X×\*]\s*(\d)");
    loop {
        let next = sep.replace_all(&s, "${1}x${2}").into_owned();
        if next == s {
            break;
        }
        s = next;
    }

    // 3. 尾随零
    s = strip_trailing_zeros(&s);

    // 4. 型号配对直径后缀
    s = regex(&PAIRED_SUFFIX, r"([A-Z]+\d+(?:\.\d+)?)\s*/\s*\d+(?:\.\d+)?")
        .replace_all(&s, "$1")
        .into_owned();

    // 5. 标点 → 空白，折叠空白
    let s: String = s
        .chars()
        .map(|c| match c {
            '-' | '_' | ';' | ':' | '(' | ')' | ',' | '[' | ']' | '"' | '\'' => ' ',
            other => other,
        })
        .collect();
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_trailing_zeros(s: &str) -> String {
    let stripped = regex(&TRAILING_ZEROS, r"(\d+)\.(\d*?)0+(\D|$)").replace_all(s, |caps: &Captures| {
        let frac = &caps[2];
        if frac.is_empty() {
            format!("{}{}", &caps[1], &caps[3])
        } else {
            format!("{}.{}{}", &caps[1], frac, &caps[3])
        }
    });
    regex(&DANGLING_POINT, r"(\d)\.(\D|$)")
        .replace_all(&stripped, "$1$2")
        .into_owned()
}

// ==========================================
// 字段级规范化
// ==========================================

/// 宽松解析数值: "5,0" / " 5.0mm " / "Ø5" → 5.0
pub fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .to_uppercase()
        .replace(',', ".")
        .trim_start_matches(['Ø', 'Φ'])
        .trim_end_matches("MM")
        .trim_end_matches("CM")
        .trim()
        .to_string();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 数值格式化: 保留两位小数并去掉尾随零 (5.0 → "5", 5.50 → "5.5")
pub fn format_decimal(value: f64) -> String {
    let s = format!("{:.2}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}

/// 数值文本规范化；无法解析时退回通用规范化
pub fn normalize_decimal(text: &str) -> String {
    match parse_decimal(text) {
        Some(v) => format_decimal(v),
        None => normalize_str(text),
    }
}

/// 型号规范化: "q 257 / 257" → "Q257"
pub fn normalize_type_code(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    normalize_str(&compact).replace(' ', "")
}

/// 网孔间距规范化: "15" → "15x15"，"15 X 25,0" → "15x25"
pub fn normalize_spacing(text: &str) -> String {
    let s = normalize_str(text).replace(' ', "");
    if regex(&SINGLE_NUMBER, r"^\d+(?:\.\d+)?$").is_match(&s) {
        format!("{}x{}", s, s)
    } else {
        s
    }
}

/// 解析网孔间距为 (纵, 横)
pub fn parse_spacing(text: &str) -> Option<(f64, f64)> {
    let s = normalize_spacing(text);
    let mut parts = s.split('x');
    let first = parse_decimal(parts.next()?)?;
    let second = parse_decimal(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((first, second))
}

/// 模糊比较前的清理: 去单位词、纠正笔误
pub fn clean_for_fuzzy(text: &str) -> String {
    let mut s = normalize_str(text);
    for (from, to) in FUZZY_TYPO_FIXES {
        s = s.replace(from, to);
    }
    // "Q 257" / "Q-257" → "Q257"
    let s = regex(&SPLIT_TYPE_CODE, r"\b([QRTK])\s+(\d)").replace_all(&s, "$1$2");
    let s = regex(&UNIT_SUFFIX, r"(\d)(MM|CM|KG)\b").replace_all(&s, "$1");
    s.split_whitespace()
        .map(|token| token.trim_start_matches('Ø'))
        .filter(|token| !token.is_empty() && !FUZZY_NOISE_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

// ==========================================
// 规格标识
// ==========================================

/// 规范名称（持久化在目录中，作为独立的查重依据）
pub fn canonical_name(spec: &ProductSpec) -> String {
    let d = format_decimal(spec.diameter_length);
    match spec.family {
        ProductFamily::Mesh => {
            let type_code = spec
                .type_code
                .as_deref()
                .map(normalize_type_code)
                .unwrap_or_default();
            let (sl, sw) = spec.effective_spacing();
            format!(
                "{} {}x{} {}x{} {}x{}",
                type_code,
                d,
                format_decimal(spec.effective_diameter_width()),
                format_decimal(spec.length),
                format_decimal(spec.effective_width()),
                format_decimal(sl),
                format_decimal(sw),
            )
        }
        ProductFamily::Rod => format!("NCBK {} {}", d, format_decimal(spec.length)),
        ProductFamily::WireCoil => format!("NTEL {}", d),
        ProductFamily::RawCoil => format!(
            "FLM {} {}",
            d,
            spec.quality.as_deref().map(normalize_str).unwrap_or_default()
        )
        .trim_end()
        .to_string(),
    }
}

/// 显示名称（未提供时为规范名称，型号保留原文）
pub fn display_name(spec: &ProductSpec) -> String {
    if let Some(name) = spec.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return name.to_string();
    }
    let canonical = canonical_name(spec);
    match (spec.family, spec.type_code.as_deref().map(str::trim)) {
        (ProductFamily::Mesh, Some(raw)) if !raw.is_empty() => {
            let dims = canonical.split_once(' ').map(|(_, rest)| rest).unwrap_or("");
            format!("{} {}", raw, dims).trim().to_string()
        }
        _ => canonical,
    }
}

/// 批次内分配缓存 key（相同规格必须得到同一 key）
pub fn spec_key(spec: &ProductSpec) -> String {
    let mut key = format!("{}|{}", spec.family.to_db_str(), canonical_name(spec));
    if spec.has_rod_count_override() {
        key.push_str(&format!(
            "|{}x{}",
            spec.rod_count_length.map(|v| v.to_string()).unwrap_or_default(),
            spec.rod_count_width.map(|v| v.to_string()).unwrap_or_default()
        ));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_variants_normalize_identically() {
        let a = normalize(Some("5,0"));
        let b = normalize(Some("5.0"));
        let c = normalize(Some("5"));
        let d = normalize(Some(" 5.00 "));
        assert_eq!(a, "5");
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(c, d);
    }

    #[test]
    fn test_spaced_comma_is_not_decimal_point() {
        assert_eq!(normalize(Some("5,0")), "5");
        assert_eq!(normalize(Some("15, 25")), "15 25");
        assert_eq!(normalize(Some("15 ,25")), "15 25");
        assert_eq!(normalize(Some("15,25")), "15.25");
    }

    #[test]
    fn test_absent_input_is_empty() {
        assert_eq!(normalize(None), "");
        assert_eq!(normalize(Some("   ")), "");
    }

    #[test]
    fn test_multiplicative_separators() {
        let expected = "500x215";
        for raw in ["500x215", "500 X 215", "500×215", "500*215", "500,0 x 215"] {
            assert_eq!(normalize(Some(raw)), expected, "raw={}", raw);
        }
        assert_eq!(normalize(Some("5X5X5")), "5x5x5");
    }

    #[test]
    fn test_keeps_meaningful_decimals() {
        assert_eq!(normalize(Some("5,50")), "5.5");
        assert_eq!(normalize(Some("10.05")), "10.05");
        assert_eq!(normalize(Some("6,5x6,50")), "6.5x6.5");
    }

    #[test]
    fn test_paired_diameter_suffix_stripped() {
        assert_eq!(normalize_type_code("Q257/257"), "Q257");
        assert_eq!(normalize_type_code("q 257 / 257"), "Q257");
        assert_eq!(normalize(Some("Q257/257 500x215")), "Q257 500x215");
    }

    #[test]
    fn test_punctuation_and_whitespace() {
        assert_eq!(normalize(Some("Q257 -  (500x215)")), "Q257 500x215");
    }

    #[test]
    fn test_single_spacing_implies_square() {
        assert_eq!(normalize_spacing("15"), "15x15");
        assert_eq!(normalize_spacing("15,0"), "15x15");
        assert_eq!(normalize_spacing("15 X 25"), "15x25");
        assert_eq!(parse_spacing("15"), Some((15.0, 15.0)));
        assert_eq!(parse_spacing("15*25"), Some((15.0, 25.0)));
        assert_eq!(parse_spacing("abc"), None);
    }

    #[test]
    fn test_parse_and_format_decimal() {
        assert_eq!(parse_decimal("5,0"), Some(5.0));
        assert_eq!(parse_decimal(" 6.5mm"), Some(6.5));
        assert_eq!(parse_decimal("Ø8"), Some(8.0));
        assert_eq!(parse_decimal("x"), None);
        assert_eq!(format_decimal(5.0), "5");
        assert_eq!(format_decimal(12.25), "12.25");
        assert_eq!(normalize_decimal("5,50"), "5.5");
    }

    #[test]
    fn test_clean_for_fuzzy_drops_units() {
        assert_eq!(clean_for_fuzzy("Q257 Ø5mm 500 CM"), "Q257 5 500");
        assert_eq!(clean_for_fuzzy("Q-257 5"), "Q257 5");
    }

    #[test]
    fn test_canonical_name_stable_across_encodings() {
        let a = ProductSpec::mesh("Q257/257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        let mut b = ProductSpec::mesh("q257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        b.spacing_width = None;
        assert_eq!(canonical_name(&a), "Q257 5x5 500x215 15x15");
        assert_eq!(canonical_name(&a), canonical_name(&b));
        assert_eq!(spec_key(&a), spec_key(&b));
    }

    #[test]
    fn test_display_name_keeps_raw_type_code() {
        let spec = ProductSpec::mesh("Q257/257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        assert_eq!(display_name(&spec), "Q257/257 5x5 500x215 15x15");
        let named = spec.with_display_name("  Panel A ");
        assert_eq!(display_name(&named), "Panel A");
    }

    #[test]
    fn test_spec_key_distinguishes_overrides() {
        let a = ProductSpec::mesh("Q257", 5.0, 5.0, 500.0, 215.0, 15.0, 15.0);
        let b = a.clone().with_rod_counts(Some(14), None);
        assert_ne!(spec_key(&a), spec_key(&b));
    }
}
