// ==========================================
// 钢筋网片 ERP 集成层 - 命令行入口
// ==========================================
// 用法:
//   mesh-erp save <file> [scope]          导入规格文件并保存（输出批次报告 JSON）
//                                         有失败项或无法映射的行时退出码 2
//   mesh-erp bom <file>                   仅推导 BOM，不写库
//   mesh-erp reset-sequence <family> <subtype> <scope>
//                                         管理员重置序列计数器（主/备两行）
//   mesh-erp config-snapshot              输出配置快照 JSON
//   mesh-erp config-restore <file>        从快照文件恢复配置
//   mesh-erp config-set <key> <value>     写入单个配置项
// 数据库: 环境变量 MESH_ERP_DB_PATH，缺省为用户数据目录
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use mesh_erp::app::{get_default_db_path, AppState};
use mesh_erp::domain::sequence::SequenceKey;
use mesh_erp::engine::validate_spec;
use mesh_erp::importer::import_specs;
use serde_json::json;

const USAGE: &str = "用法: mesh-erp <save <file> [scope] | bom <file> | reset-sequence <family> <subtype> <scope> | config-snapshot | config-restore <file> | config-set <key> <value>>";

#[tokio::main]
async fn main() -> Result<()> {
    mesh_erp::logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("");

    tracing::info!("{} v{}", mesh_erp::APP_NAME, mesh_erp::VERSION);
    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(|e| anyhow!(e))?;

    match command {
        "save" => {
            let file = arg(&args, 1, "file")?;
            let scope = args
                .get(2)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| state.default_scope());
            let saved = state
                .save_file(file, &scope)
                .await
                .with_context(|| format!("读取规格文件失败: {}", file))?;
            println!("{}", serde_json::to_string_pretty(&saved)?);
            if saved.failed() {
                std::process::exit(2);
            }
        }
        "bom" => {
            let file = arg(&args, 1, "file")?;
            let imported = import_specs(file).with_context(|| format!("读取规格文件失败: {}", file))?;
            let engine = state.bom_engine();
            let mut output = Vec::new();
            for (row, spec) in &imported.specs {
                match validate_spec(spec) {
                    Ok(()) => output.push(json!({ "row": row, "bom": engine.derive_bom(spec) })),
                    Err(e) => output.push(json!({ "row": row, "error": e.to_string() })),
                }
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({ "items": output, "row_errors": imported.errors }))?
            );
        }
        "reset-sequence" => {
            let family = arg(&args, 1, "family")?;
            let subtype = arg(&args, 2, "subtype")?;
            let scope = arg(&args, 3, "scope")?;
            let key = SequenceKey::new(family, subtype, scope);
            let mut removed = state.repos.sequence.admin_reset(&key).await?;
            removed += state.repos.sequence.admin_reset(&key.backup()).await?;
            println!("{}", json!({ "key": key.to_string(), "removed": removed }));
        }
        "config-snapshot" => {
            let snapshot = state
                .config_manager
                .get_config_snapshot()
                .map_err(|e| anyhow!(e.to_string()))?;
            println!("{}", snapshot);
        }
        "config-restore" => {
            let file = arg(&args, 1, "file")?;
            let snapshot = std::fs::read_to_string(file)
                .with_context(|| format!("读取快照文件失败: {}", file))?;
            let count = state
                .config_manager
                .restore_config_from_snapshot(&snapshot)
                .map_err(|e| anyhow!(e.to_string()))?;
            println!("{}", json!({ "restored": count }));
        }
        "config-set" => {
            let key = arg(&args, 1, "key")?;
            let value = arg(&args, 2, "value")?;
            state
                .config_manager
                .set_config_value(key, value)
                .map_err(|e| anyhow!(e.to_string()))?;
            println!("{}", json!({ "key": key, "value": value }));
        }
        _ => bail!("{}", USAGE),
    }

    Ok(())
}

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("缺少参数 <{}>\n{}", name, USAGE))
}
