// ==========================================
// 钢筋网片 ERP 集成层 - 规格文件保存
// ==========================================
// 流程: 导入文件 → 保存可映射的行 → 报告附带无法映射的行
// 无法映射的行不进入保存批次，但计入失败
// ==========================================

use std::path::Path;

use serde::Serialize;
use tracing::warn;

use crate::app::AppState;
use crate::engine::{BatchReport, ItemOutcome};
use crate::importer::{import_specs, ImportResult, RowError};

/// 文件保存报告：批次报告 + 导入阶段的行错误
#[derive(Debug, Clone, Serialize)]
pub struct FileSaveReport {
    #[serde(flatten)]
    pub report: BatchReport,
    pub row_errors: Vec<RowError>,
}

impl FileSaveReport {
    /// 任一保存项失败或存在无法映射的行
    pub fn failed(&self) -> bool {
        !self.row_errors.is_empty() || self.report.count(ItemOutcome::Failed) > 0
    }
}

impl AppState {
    pub async fn save_file<P: AsRef<Path>>(
        &self,
        file_path: P,
        scope: &str,
    ) -> ImportResult<FileSaveReport> {
        let imported = import_specs(file_path)?;
        for row_error in &imported.errors {
            warn!(row = row_error.row, error = %row_error.message, "无法映射的行，不参与保存");
        }

        let report = self
            .save_orchestrator()
            .save_rows(&imported.specs, scope)
            .await;
        Ok(FileSaveReport {
            report,
            row_errors: imported.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn state() -> (NamedTempFile, AppState) {
        let temp = NamedTempFile::new().unwrap();
        let state = AppState::new(temp.path().to_string_lossy().to_string()).unwrap();
        (temp, state)
    }

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    #[tokio::test]
    async fn test_unmappable_row_reported_and_counted_as_failure() {
        let (_db, state) = state();
        let file = write_csv(&[
            "型号,纵筋直径,长度,宽度,网孔",
            "Q257/257,\"5,0\",500,215,15",
            "Q188,abc,500,215,15",
            "R188,5,500,300,15x25",
        ]);

        let saved = state.save_file(file.path(), "GLOBAL").await.unwrap();

        assert_eq!(saved.report.count(ItemOutcome::Saved), 2);
        let rows: Vec<_> = saved.report.items.iter().map(|i| i.source_row).collect();
        assert_eq!(rows, vec![Some(1), Some(3)]);
        let indexes: Vec<_> = saved.report.items.iter().map(|i| i.index).collect();
        assert_eq!(indexes, vec![0, 1]);

        assert_eq!(saved.row_errors.len(), 1);
        assert_eq!(saved.row_errors[0].row, 2);
        assert!(saved.failed());

        let json = serde_json::to_value(&saved).unwrap();
        assert_eq!(json["row_errors"][0]["row"], 2);
        assert_eq!(json["items"][1]["source_row"], 3);
        assert!(json["batch_id"].is_string());
    }

    #[tokio::test]
    async fn test_clean_file_not_failed() {
        let (_db, state) = state();
        let file = write_csv(&["型号,纵筋直径,长度,宽度,网孔", "R188,5,500,300,15x25"]);

        let saved = state.save_file(file.path(), "GLOBAL").await.unwrap();

        assert!(saved.row_errors.is_empty());
        assert!(!saved.failed());
        assert_eq!(saved.report.items[0].code.as_deref(), Some("CH.OZL.0500.0001"));
    }
}
