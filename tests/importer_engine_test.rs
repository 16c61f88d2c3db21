// ==========================================
// 批量物料导入系统 - 导入引擎集成测试
// ==========================================
// 覆盖: 端到端导入 / 幂等 / 后行覆盖 / 部分失败 / 依赖跳过 / 整批中止
// ==========================================


use bulk_item_import::config::ImportSettings;
use bulk_item_import::domain::action::{Action, ActionOp, SkipReason};
use bulk_item_import::domain::import::RowErrorReason;
use bulk_item_import::domain::record::{Record, RecordKey};
use bulk_item_import::domain::types::{AccountRootType, RecordKind, SemanticField};
use bulk_item_import::importer::{BulkItemImporter, ColumnDetector, CsvUpload, SynonymColumnDetector};
use bulk_item_import::repository::{RecordStore, SqliteRecordStore};
use rusqlite::Connection;
use test_helpers::{build_importer, create_test_db, seed_account, upload};

const E2E_CSV: &str = "Item Code,Item Name,Rate,Qty,Warehouse\nITM-1,Widget,10.00,5,WH-1\n";

async fn get(store: &SqliteRecordStore, key: RecordKey) -> Option<Record> {
    store.get(&key).await.expect("读取记录失败")
}

// ==========================================
// 端到端
// ==========================================

#[tokio::test]
async fn test_e2e_single_row_creates_item_price_and_stock() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let result = importer.import_csv(&upload(E2E_CSV)).await.expect("导入失败");

    assert_eq!(result.total_rows, 1);
    assert_eq!(result.created_items, 1);
    assert_eq!(result.created_prices, 1);
    assert_eq!(result.stock_reconciliations, 1);
    assert_eq!(result.updated_items, 0);
    assert_eq!(result.updated_prices, 0);
    assert_eq!(result.unchanged, 0);
    assert!(result.errors.is_empty(), "不应有行错误: {:?}", result.errors);

    let store = importer.store();
    match get(store, RecordKey::item("ITM-1")).await {
        Some(Record::Item(item)) => {
            assert_eq!(item.item_name, "Widget");
            assert_eq!(item.item_group, "All Item Groups");
            assert_eq!(item.stock_uom, "Nos");
            assert!(item.is_stock_item);
        }
        other => panic!("物料未写入: {:?}", other),
    }
    match get(store, RecordKey::item_price("Standard Selling", "ITM-1")).await {
        Some(Record::ItemPrice(price)) => assert_eq!(price.price_list_rate, 10.0),
        other => panic!("价格未写入: {:?}", other),
    }
    match get(store, RecordKey::stock("WH-1", "ITM-1")).await {
        Some(Record::Stock(stock)) => {
            assert_eq!(stock.qty, 5.0);
            assert_eq!(stock.valuation_rate, 0.0);
        }
        other => panic!("库存未写入: {:?}", other),
    }
    assert_eq!(store.count_reconciliation_lines("ITM-1").unwrap(), 1);
}

// ==========================================
// 幂等
// ==========================================

#[tokio::test]
async fn test_second_import_of_same_file_is_noop() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    importer.import_csv(&upload(E2E_CSV)).await.expect("首次导入失败");
    let second = importer.import_csv(&upload(E2E_CSV)).await.expect("二次导入失败");

    assert_eq!(second.created_items, 0);
    assert_eq!(second.updated_items, 0);
    assert_eq!(second.created_prices, 0);
    assert_eq!(second.updated_prices, 0);
    assert_eq!(second.stock_reconciliations, 0);
    assert_eq!(second.unchanged, 3);
    assert!(second.errors.is_empty());

    // 未变化的库存不再过账
    assert_eq!(importer.store().count_reconciliation_lines("ITM-1").unwrap(), 1);
}

#[tokio::test]
async fn test_changed_values_produce_updates() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());
    importer.import_csv(&upload(E2E_CSV)).await.expect("首次导入失败");

    let changed = "Item Code,Item Name,Rate,Qty,Warehouse\nITM-1,Widget,12.50,7,WH-1\n";
    let result = importer.import_csv(&upload(changed)).await.expect("导入失败");

    assert_eq!(result.updated_items, 0);
    assert_eq!(result.updated_prices, 1);
    assert_eq!(result.stock_reconciliations, 1);
    assert_eq!(result.unchanged, 1);

    let store = importer.store();
    match get(store, RecordKey::stock("WH-1", "ITM-1")).await {
        Some(Record::Stock(stock)) => assert_eq!(stock.qty, 7.0),
        other => panic!("库存读取失败: {:?}", other),
    }
    assert_eq!(store.count_reconciliation_lines("ITM-1").unwrap(), 2);
}

#[tokio::test]
async fn test_update_existing_disabled_leaves_records() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    build_importer(&db_path, ImportSettings::default())
        .import_csv(&upload("Item Code,Item Name\nITM-1,Widget\n"))
        .await
        .expect("首次导入失败");

    let settings = ImportSettings {
        update_existing: false,
        ..ImportSettings::default()
    };
    let importer = build_importer(&db_path, settings);
    let result = importer
        .import_csv(&upload("Item Code,Item Name\nITM-1,Gizmo\nITM-2,Gadget\n"))
        .await
        .expect("导入失败");

    assert_eq!(result.updated_items, 0);
    assert_eq!(result.created_items, 1);
    // 有差异的记录单独计数，不算作未变化
    assert_eq!(result.unchanged, 0);
    assert_eq!(result.skipped_updates, 1);
    assert!(result.render_log().contains("禁止更新而跳过: 1"));
    match get(importer.store(), RecordKey::item("ITM-1")).await {
        Some(Record::Item(item)) => assert_eq!(item.item_name, "Widget"),
        other => panic!("物料读取失败: {:?}", other),
    }

    // 值一致的记录仍计入未变化
    let result = importer
        .import_csv(&upload("Item Code,Item Name\nITM-2,Gadget\n"))
        .await
        .expect("导入失败");
    assert_eq!(result.unchanged, 1);
    assert_eq!(result.skipped_updates, 0);
}

// ==========================================
// 后行覆盖
// ==========================================

#[tokio::test]
async fn test_duplicate_item_code_later_row_wins() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code,Item Name,Brand,Rate\nITM-1,First,Acme,1\nITM-1,Second,,2\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");

    assert_eq!(result.total_rows, 2);
    assert_eq!(result.created_items, 1);
    assert_eq!(result.created_prices, 1);
    assert!(result.errors.is_empty());
    assert_eq!(result.notes.len(), 2, "物料与价格各一条重复提示");

    let store = importer.store();
    match get(store, RecordKey::item("ITM-1")).await {
        Some(Record::Item(item)) => {
            assert_eq!(item.item_name, "Second");
            // 后行为空的字段不覆盖前行
            assert_eq!(item.brand.as_deref(), Some("Acme"));
        }
        other => panic!("物料读取失败: {:?}", other),
    }
    match get(store, RecordKey::item_price("Standard Selling", "ITM-1")).await {
        Some(Record::ItemPrice(price)) => assert_eq!(price.price_list_rate, 2.0),
        other => panic!("价格读取失败: {:?}", other),
    }
}

// ==========================================
// 部分失败
// ==========================================

#[tokio::test]
async fn test_bad_rate_fails_only_its_row() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code,Item Name,Rate\n\
               ITM-1,Widget,1\n\
               ITM-2,Gadget,abc\n\
               ITM-3,Gizmo,3\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入不应整批失败");

    assert_eq!(result.created_items, 2);
    assert_eq!(result.created_prices, 2);
    assert_eq!(result.errors.len(), 1);

    let error = &result.errors[0];
    assert_eq!(error.row_number, 3);
    assert_eq!(error.item_code.as_deref(), Some("ITM-2"));
    assert!(matches!(
        error.reason,
        RowErrorReason::InvalidNumber { field: SemanticField::Rate, .. }
    ));
    assert!(get(importer.store(), RecordKey::item("ITM-2")).await.is_none());
}

#[tokio::test]
async fn test_errors_are_ordered_by_row() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code,Item Name,Qty,Warehouse\n\
               ,NoCode,1,WH-1\n\
               ITM-1,Widget,-2,WH-1\n\
               ITM-2,Gadget,4,WH-1\n\
               ITM-9,,5,WH-1\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");

    let rows: Vec<usize> = result.errors.iter().map(|e| e.row_number).collect();
    assert_eq!(rows, vec![2, 3, 5]);
    assert_eq!(result.errors[0].reason, RowErrorReason::MissingItemCode);
    assert!(matches!(result.errors[1].reason, RowErrorReason::NegativeValue { .. }));
    assert_eq!(result.errors[2].reason, RowErrorReason::ItemNotFound);
    assert_eq!(result.created_items, 1);
    assert_eq!(result.stock_reconciliations, 1);
}

#[tokio::test]
async fn test_invalid_row_appears_as_skip_in_plan() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code,Item Name,Rate\n\
               ITM-1,Widget,1\n\
               ITM-2,Gadget,abc\n\
               ,NoCode,2\n";
    let plan = importer.preview_import(&upload(csv)).await.expect("预览失败");

    let skipped: Vec<&Action> = plan
        .actions
        .iter()
        .filter(|a| a.op == ActionOp::Skip(SkipReason::InvalidRow))
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].target, RecordKey::item("ITM-2"));
    assert_eq!(skipped[0].row_number, 3);

    // Item 动作仍全部排在 Price 之前
    let first_dependent = plan
        .actions
        .iter()
        .position(|a| a.kind() != RecordKind::Item)
        .expect("应有价格动作");
    assert!(plan.actions[first_dependent..].iter().all(|a| a.kind() != RecordKind::Item));

    assert_eq!(plan.summary().rejected, 1);
    assert_eq!(plan.row_errors.len(), 2);

    // 执行时不重复记错
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");
    assert_eq!(result.errors.len(), 2);
    assert_eq!(result.unchanged, 0);
}

// ==========================================
// 依赖跳过
// ==========================================

#[tokio::test]
async fn test_price_after_invalid_item_row_is_dependency_failed() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code,Item Name,Rate,Disabled\n\
               ITM-1,Widget,,maybe\n\
               ITM-1,,5,\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");

    assert_eq!(result.created_items, 0);
    assert_eq!(result.created_prices, 0);
    assert_eq!(result.errors.len(), 2);
    assert!(matches!(result.errors[0].reason, RowErrorReason::InvalidFlag { .. }));
    assert_eq!(result.errors[1].row_number, 3);
    assert!(result.errors[1].is_dependency_failure());

    let price = RecordKey::item_price("Standard Selling", "ITM-1");
    assert!(get(importer.store(), price).await.is_none());
}

#[tokio::test]
async fn test_rejected_new_item_skips_its_price_and_stock() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    // 新物料缺少名称
    let csv = "Item Code,Item Group,Rate,Qty,Warehouse\nITM-1,Tools,5,1,WH-1\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");

    assert_eq!(result.applied_count(), 0);
    assert_eq!(result.errors.len(), 3);
    assert_eq!(
        result.errors[0].reason,
        RowErrorReason::MissingRequiredForNew {
            field: SemanticField::ItemName
        }
    );
    assert!(result.errors[1..].iter().all(|e| e.is_dependency_failure()));
}

#[tokio::test]
async fn test_failed_item_create_skips_dependents() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    // ITM-2 与 ITM-1 条码重复，写入时违反唯一约束
    let csv = "Item Code,Item Name,Barcode,Rate\n\
               ITM-1,Widget,B-1,1\n\
               ITM-2,Gadget,B-1,2\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");

    assert_eq!(result.created_items, 1);
    assert_eq!(result.created_prices, 1);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.row_number == 3));
    assert!(matches!(result.errors[0].reason, RowErrorReason::ApplyFailed(_)));
    assert_eq!(result.errors[1].reason, RowErrorReason::DependencyFailed);

    let price = RecordKey::item_price("Standard Selling", "ITM-2");
    assert!(get(importer.store(), price).await.is_none());
}

// ==========================================
// 整批中止 / 输入格式错误
// ==========================================

#[tokio::test]
async fn test_malformed_input_is_rejected() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let empty = importer.import_csv(&upload("")).await.unwrap_err();
    assert!(empty.is_malformed_input());

    let binary = CsvUpload::new("items.csv", vec![0xff, 0xfe, 0x00, 0x41]);
    let err = importer.import_csv(&binary).await.unwrap_err();
    assert!(err.is_malformed_input());

    let logs = importer.store().recent_import_logs(10).await.unwrap();
    assert!(logs.is_empty(), "格式错误不应写入导入日志");
}

#[tokio::test]
async fn test_missing_item_code_column_aborts() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let err = importer
        .import_csv(&upload("Name,Rate\nWidget,1\n"))
        .await
        .unwrap_err();
    assert!(err.is_aborted());
    assert!(err.to_string().contains("item_code"));
}

#[tokio::test]
async fn test_invalid_difference_account_aborts_before_rows() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let settings = ImportSettings {
        default_company: Some("AC".to_string()),
        difference_account: Some("Stock Adjustment - AC".to_string()),
        ..ImportSettings::default()
    };

    // 科目不存在
    let err = build_importer(&db_path, settings.clone())
        .import_csv(&upload(E2E_CSV))
        .await
        .unwrap_err();
    assert!(err.is_aborted());

    // 损益类科目
    seed_account(&db_path, "Stock Adjustment - AC", "AC", AccountRootType::Income, false);
    let importer = build_importer(&db_path, settings.clone());
    assert!(importer.import_csv(&upload(E2E_CSV)).await.unwrap_err().is_aborted());
    assert!(get(importer.store(), RecordKey::item("ITM-1")).await.is_none());

    // 资产类科目可用
    seed_account(&db_path, "Stock Adjustment - AC", "AC", AccountRootType::Asset, false);
    let result = build_importer(&db_path, settings)
        .import_csv(&upload(E2E_CSV))
        .await
        .expect("导入失败");
    assert_eq!(result.stock_reconciliations, 1);

    let conn = Connection::open(&db_path).unwrap();
    let (account, company): (String, String) = conn
        .query_row(
            "SELECT difference_account, company FROM stock_reconciliation WHERE batch_id = ?1",
            rusqlite::params![result.batch_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(account, "Stock Adjustment - AC");
    assert_eq!(company, "AC");
}

#[tokio::test]
async fn test_each_stock_line_posts_its_own_document() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code,Item Name,Qty,Warehouse\n\
               ITM-1,Widget,1,WH-1\n\
               ITM-2,Gadget,2,WH-1\n\
               ITM-3,Gizmo,3,WH-1\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");
    assert_eq!(result.stock_reconciliations, 3);

    let conn = Connection::open(&db_path).unwrap();
    let documents: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM stock_reconciliation WHERE batch_id = ?1",
            rusqlite::params![result.batch_id],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(documents, 3);
}

// ==========================================
// 读取 / 列映射 / 预览
// ==========================================

#[tokio::test]
async fn test_semicolon_file_with_bom() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "\u{feff}SKU;Item Name;Price\nITM-1;\"Widget; large\";3,5\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    let store = importer.store();
    match get(store, RecordKey::item("ITM-1")).await {
        Some(Record::Item(item)) => assert_eq!(item.item_name, "Widget; large"),
        other => panic!("物料读取失败: {:?}", other),
    }
    match get(store, RecordKey::item_price("Standard Selling", "ITM-1")).await {
        Some(Record::ItemPrice(price)) => assert_eq!(price.price_list_rate, 3.5),
        other => panic!("价格读取失败: {:?}", other),
    }
}

#[tokio::test]
async fn test_quoted_thousands_in_comma_file() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code,Item Name,Rate\nITM-1,Widget,\"1,234\"\nITM-2,Gadget,\"1,234,567\"\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");
    assert!(result.errors.is_empty(), "{:?}", result.errors);
    assert_eq!(result.created_prices, 2);

    let store = importer.store();
    match get(store, RecordKey::item_price("Standard Selling", "ITM-1")).await {
        Some(Record::ItemPrice(price)) => assert_eq!(price.price_list_rate, 1234.0),
        other => panic!("价格读取失败: {:?}", other),
    }
    match get(store, RecordKey::item_price("Standard Selling", "ITM-2")).await {
        Some(Record::ItemPrice(price)) => assert_eq!(price.price_list_rate, 1234567.0),
        other => panic!("价格读取失败: {:?}", other),
    }
}

#[tokio::test]
async fn test_decimal_comma_in_semicolon_file() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code;Item Name;Rate;Qty;Warehouse\nITM-1;Widget;10,5;1,200;WH-1\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");
    assert!(result.errors.is_empty(), "{:?}", result.errors);

    let store = importer.store();
    match get(store, RecordKey::item_price("Standard Selling", "ITM-1")).await {
        Some(Record::ItemPrice(price)) => assert_eq!(price.price_list_rate, 10.5),
        other => panic!("价格读取失败: {:?}", other),
    }
    // 合法千分位仍按千分位
    match get(store, RecordKey::stock("WH-1", "ITM-1")).await {
        Some(Record::Stock(stock)) => assert_eq!(stock.qty, 1200.0),
        other => panic!("库存读取失败: {:?}", other),
    }
}

#[tokio::test]
async fn test_detection_is_deterministic() {
    let header: Vec<String> = ["SKU", "Item Code", "Name", "Qty", "Opening Qty"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let first = SynonymColumnDetector.detect(&header);
    let second = SynonymColumnDetector.detect(&header);
    assert_eq!(first, second);

    // 左侧列优先
    assert_eq!(first.column_name(SemanticField::ItemCode), Some("SKU"));
    assert_eq!(first.column_name(SemanticField::Quantity), Some("Qty"));

    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());
    let csv = format!("{}\nITM-1,X,Widget,1,2\n", header.join(","));
    assert_eq!(importer.preview_mapping(&upload(&csv)).unwrap(), first);
}

#[tokio::test]
async fn test_preview_does_not_write() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let plan = importer.preview_import(&upload(E2E_CSV)).await.expect("预览失败");
    let summary = plan.summary();
    assert_eq!(summary.item_creates, 1);
    assert_eq!(summary.price_creates, 1);
    assert_eq!(summary.stock_writes, 1);
    assert!(plan.actions[0].is_create());

    assert!(get(importer.store(), RecordKey::item("ITM-1")).await.is_none());
    assert!(importer.store().recent_import_logs(5).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_manual_mapping_overrides_detection() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Part No,Title,On Hand,Location\nITM-1,Widget,4,WH-1\n";
    let file = upload(csv);
    let header = importer.detect_columns(&file).unwrap().columns;
    let mapping = bulk_item_import::domain::import::ColumnMapping::from_columns(
        &header,
        vec![
            (SemanticField::ItemCode, "Part No"),
            (SemanticField::ItemName, "Title"),
            (SemanticField::Quantity, "On Hand"),
            (SemanticField::Warehouse, "Location"),
        ],
    )
    .unwrap();

    let result = importer
        .import_csv_with_mapping(&file, mapping)
        .await
        .expect("导入失败");
    assert_eq!(result.created_items, 1);
    assert_eq!(result.stock_reconciliations, 1);
}

// ==========================================
// 导入日志
// ==========================================

#[tokio::test]
async fn test_import_log_is_persisted() {
    let (_temp_file, db_path) = create_test_db().expect("创建测试数据库失败");
    let importer = build_importer(&db_path, ImportSettings::default());

    let csv = "Item Code,Item Name,Rate\nITM-1,Widget,1\nITM-2,Gadget,x\n";
    let result = importer.import_csv(&upload(csv)).await.expect("导入失败");

    let logs = importer.store().recent_import_logs(5).await.unwrap();
    assert_eq!(logs.len(), 1);
    let batch = &logs[0];
    assert_eq!(batch.batch_id, result.batch_id);
    assert_eq!(batch.file_name, "items.csv");
    assert_eq!(batch.created_items, 1);
    assert_eq!(batch.error_rows, 1);
    assert!(batch.log_text.contains("Errors"));
    assert!(batch.errors_json.is_some());
}
