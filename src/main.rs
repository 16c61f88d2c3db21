// ==========================================
// 批量物料导入系统 - 命令行入口
// ==========================================
// 用法:
//   bulk-item-import [--db <path>] <command>
//   bulk-item-import import items.csv --map qty="On Hand"
// ==========================================

use anyhow::{Context, Result};
use bulk_item_import::api::ImportApi;
use bulk_item_import::logging;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(name = "bulk-item-import")]
#[command(about = "批量导入物料 / 价格 / 库存对账（CSV）")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// 数据库文件路径（默认: BULK_ITEM_IMPORT_DB_PATH 或用户数据目录）
    #[arg(long, global = true, value_name = "DB_PATH")]
    db: Option<String>,

    /// 以 JSON 输出结果
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 列出文件表头
    Columns { file: String },

    /// 预览自动识别的列映射
    Mapping { file: String },

    /// 预览导入计划（不写入）
    Preview { file: String },

    /// 执行导入
    Import {
        file: String,

        /// 手工列映射，格式 field=column，可重复
        #[arg(long = "map", value_name = "FIELD=COLUMN", value_parser = parse_mapping)]
        mappings: Vec<(String, String)>,
    },

    /// 查看最近的导入日志
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// 导入配置
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// 显示当前导入配置
    Show,
    /// 设置配置项，例如 import/default_warehouse "Stores - AC"
    Set { key: String, value: String },
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    let (field, column) = raw
        .split_once('=')
        .ok_or_else(|| format!("映射格式应为 field=column: {}", raw))?;
    let (field, column) = (field.trim(), column.trim());
    if field.is_empty() || column.is_empty() {
        return Err(format!("映射格式应为 field=column: {}", raw));
    }
    Ok((field.to_string(), column.to_string()))
}

/// 获取默认数据库路径
fn get_default_db_path() -> String {
    // 允许通过环境变量显式指定 DB 路径（便于调试/测试/CI）
    if let Ok(path) = std::env::var("BULK_ITEM_IMPORT_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./bulk_item_import.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("bulk-item-import");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("bulk_item_import.db");
        }
    }
    path.to_string_lossy().to_string()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// 执行命令；返回进程退出码（导入存在行错误时为 2）
async fn run(args: Args) -> Result<i32> {
    let db_path = args.db.clone().unwrap_or_else(get_default_db_path);
    tracing::debug!(db_path = %db_path, "使用数据库");
    let api = ImportApi::new(db_path);

    match args.command {
        Command::Columns { file } => {
            let columns = api.detect_columns(&file).await?;
            if args.json {
                print_json(&columns)?;
            } else {
                for (idx, column) in columns.iter().enumerate() {
                    println!("{:>3}  {}", idx, column);
                }
            }
        }
        Command::Mapping { file } => {
            let preview = api.preview_mapping(&file).await?;
            if args.json {
                print_json(&preview)?;
            } else {
                for entry in &preview.mapping {
                    println!("{:<20} <- {}", entry.field, entry.column);
                }
                if !preview.unmapped_columns.is_empty() {
                    println!("未映射列: {}", preview.unmapped_columns.join(", "));
                }
                if !preview.missing_required.is_empty() {
                    println!("缺少必填字段: {}", preview.missing_required.join(", "));
                }
            }
        }
        Command::Preview { file } => {
            let preview = api.preview_import(&file).await?;
            if args.json {
                print_json(&preview)?;
            } else {
                println!("数据行: {}", preview.total_rows);
                for action in &preview.actions {
                    println!("  {}", action);
                }
                for note in &preview.notes {
                    println!("注意: {}", note);
                }
                for error in &preview.row_errors {
                    println!("错误: {}", error);
                }
            }
        }
        Command::Import { file, mappings } => {
            let response = if mappings.is_empty() {
                api.import_csv(&file).await?
            } else {
                api.import_csv_with_mapping(&file, &mappings).await?
            };
            if args.json {
                print_json(&response.result)?;
            } else {
                println!("{}", response.log_text);
            }
            if response.result.has_errors() {
                return Ok(2);
            }
        }
        Command::History { limit } => {
            let batches = api.recent_import_logs(limit).await?;
            if args.json {
                print_json(&batches)?;
            } else {
                for batch in &batches {
                    println!(
                        "{}  {}  {}  行数={} 新建物料={} 更新物料={} 错误行={}",
                        batch.imported_at.format("%Y-%m-%d %H:%M:%S"),
                        batch.batch_id,
                        batch.file_name,
                        batch.total_rows,
                        batch.created_items,
                        batch.updated_items,
                        batch.error_rows
                    );
                }
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let snapshot = api.get_import_config_snapshot()?;
                let value: serde_json::Value =
                    serde_json::from_str(&snapshot).context("配置快照解析失败")?;
                print_json(&value)?;
            }
            ConfigAction::Set { key, value } => {
                api.set_import_config(&key, &value)?;
                println!("已设置 {} = {}", key, value);
            }
        },
    }

    Ok(0)
}

#[tokio::main]
async fn main() {
    logging::init();

    let args = Args::parse();
    match run(args).await {
        Ok(code) => process::exit(code),
        Err(error) => {
            eprintln!("错误: {:#}", error);
            process::exit(1);
        }
    }
}
