// ==========================================
// 导入 API 端到端测试
// ==========================================
// 模拟 CLI 调用 API 的完整流程（文件路径 → 结果）
// ==========================================


use bulk_item_import::api::{ApiError, ImportApi};
use bulk_item_import::config::config_keys;
use test_helpers::{create_test_db, write_csv};

const CSV: &str = "Item Code,Item Name,Rate,Qty,Warehouse\n\
                   ITM-1,Widget,10.00,5,WH-1\n\
                   ITM-2,Gadget,oops,1,WH-1\n";

#[tokio::test]
async fn test_import_api_full_flow() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let (_dir, path) = write_csv("items.csv", CSV).expect("写入测试文件失败");
    let file = path.to_str().unwrap();
    let api = ImportApi::new(db_path.clone());

    // 步骤 1: 表头
    let columns = api.detect_columns(file).await.expect("读取表头失败");
    assert_eq!(columns.len(), 5);

    // 步骤 2: 映射预览
    let preview = api.preview_mapping(file).await.expect("映射预览失败");
    assert!(preview.missing_required.is_empty());
    assert!(preview.unmapped_columns.is_empty());
    assert_eq!(preview.mapping[0].field, "item_code");

    // 步骤 3: 计划预览
    let plan = api.preview_import(file).await.expect("计划预览失败");
    assert_eq!(plan.total_rows, 2);
    assert_eq!(plan.summary.item_creates, 1);
    assert_eq!(plan.row_errors.len(), 1);
    assert_eq!(plan.row_errors[0].row_number, 3);

    // 步骤 4: 导入
    let response = api.import_csv(file).await.expect("导入失败");
    assert_eq!(response.result.created_items, 1);
    assert_eq!(response.result.stock_reconciliations, 1);
    assert_eq!(response.result.errors.len(), 1);
    assert!(response.log_text.contains("Summary"));

    // 步骤 5: 导入日志
    let logs = api.recent_import_logs(10).await.expect("查询导入日志失败");
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].batch_id, response.result.batch_id);
}

#[tokio::test]
async fn test_import_with_manual_mapping() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let csv = "Part No,Item Name,On Hand,Warehouse\nITM-1,Widget,4,WH-1\n";
    let (_dir, path) = write_csv("stock.csv", csv).expect("写入测试文件失败");
    let file = path.to_str().unwrap();
    let api = ImportApi::new(db_path);

    // 自动识别不到物料编码列
    let err = api.import_csv(file).await.unwrap_err();
    assert!(matches!(err, ApiError::ImportAborted(_)));

    let overrides = vec![
        ("item_code".to_string(), "Part No".to_string()),
        ("qty".to_string(), "On Hand".to_string()),
    ];
    let response = api
        .import_csv_with_mapping(file, &overrides)
        .await
        .expect("导入失败");
    assert_eq!(response.result.created_items, 1);
    assert_eq!(response.result.stock_reconciliations, 1);

    let unknown = vec![("weight".to_string(), "Part No".to_string())];
    let err = api.import_csv_with_mapping(file, &unknown).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
}

#[tokio::test]
async fn test_config_changes_apply_to_next_import() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let csv = "Item Code,Item Name,Qty\nITM-1,Widget,3\n";
    let (_dir, path) = write_csv("items.csv", csv).expect("写入测试文件失败");
    let file = path.to_str().unwrap();
    let api = ImportApi::new(db_path);

    // 未配置默认仓库：数量被忽略
    let response = api.import_csv(file).await.expect("导入失败");
    assert_eq!(response.result.stock_reconciliations, 0);

    api.set_import_config(config_keys::DEFAULT_WAREHOUSE, "Stores")
        .expect("设置配置失败");
    let response = api.import_csv(file).await.expect("导入失败");
    assert_eq!(response.result.stock_reconciliations, 1);
    assert_eq!(response.result.unchanged, 1);

    let snapshot = api.get_import_config_snapshot().unwrap();
    assert!(snapshot.contains("Stores"));
}

#[tokio::test]
async fn test_invalid_config_is_rejected_and_restored() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let api = ImportApi::new(db_path);

    let err = api
        .set_import_config(config_keys::UPDATE_EXISTING, "sometimes")
        .unwrap_err();
    assert!(matches!(err, ApiError::ConfigError(_)));

    let err = api.set_import_config("import/unknown", "1").unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    // 非法值未残留
    let (_dir, path) = write_csv("items.csv", "Item Code,Item Name\nITM-1,Widget\n").unwrap();
    let response = api.import_csv(path.to_str().unwrap()).await.expect("导入失败");
    assert_eq!(response.result.created_items, 1);
}

#[tokio::test]
async fn test_non_csv_and_missing_file() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let api = ImportApi::new(db_path);

    let err = api.import_csv("items.xlsx").await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));

    let err = api.import_csv("/nonexistent/items.csv").await.unwrap_err();
    assert!(matches!(err, ApiError::MalformedInput { .. }));

    let err = api.recent_import_logs(0).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidInput(_)));
}
