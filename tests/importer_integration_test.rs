// ==========================================
// 规格导入集成测试
// ==========================================
// 测试目标: CSV 文件 → 规格映射 → 保存批次
// ==========================================


use mesh_erp::domain::types::ProductFamily;
use mesh_erp::engine::ItemOutcome;
use mesh_erp::importer::{import_specs, ImportError};
use std::io::Write;
use test_helpers::*;

fn write_csv(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

#[test]
fn test_import_collects_row_errors() {
    let file = write_csv(&[
        "family,型号,纵筋直径,长度,宽度,网孔,材质",
        "CH,Q257/257,\"5,0\",500,215.0,15,",
        "NCBK,,6.5,300,,,",
        "CH,Q188,abc,500,215,15,",
        "FLM,,6,,,,1008",
    ]);

    let imported = import_specs(file.path()).unwrap();

    let rows: Vec<_> = imported.specs.iter().map(|(row, _)| *row).collect();
    assert_eq!(rows, vec![1, 2, 4]);
    assert_eq!(imported.specs[0].1.family, ProductFamily::Mesh);
    assert_eq!(imported.specs[1].1.family, ProductFamily::Rod);
    assert_eq!(imported.specs[2].1.quality.as_deref(), Some("1008"));

    assert_eq!(imported.errors.len(), 1);
    assert_eq!(imported.errors[0].row, 3);
}

#[test]
fn test_import_missing_file() {
    let result = import_specs("/nonexistent/specs.csv");
    assert!(matches!(result, Err(ImportError::FileNotFound(_))));
}

#[tokio::test]
async fn test_imported_specs_saved_end_to_end() {
    let (_temp, db_path) = create_test_db().unwrap();
    let repos = create_repos(&db_path);

    let file = write_csv(&[
        "型号,纵筋直径,长度,宽度,网孔",
        "Q257/257,\"5,0\",500,215,15",
        "R188,5,500,300,15x25",
    ]);
    let specs = import_specs(file.path()).unwrap().into_specs();
    assert_eq!(specs.len(), 2);

    let report = create_orchestrator(repos.clone())
        .save_batch(&specs, "GLOBAL")
        .await;

    assert_eq!(report.count(ItemOutcome::Saved), 2);
    assert_eq!(report.items[0].code.as_deref(), Some("CH.STD.0500.00"));
    assert_eq!(report.items[1].code.as_deref(), Some("CH.OZL.0500.0001"));

    // 标准网片与非标网片共用 500 长纵筋
    assert_eq!(catalog_total(&repos).await, 6);
}
