// ==========================================
// 批量物料导入系统 - 对账引擎
// ==========================================
// 阶段 3: NormalizedRecordIntent → 有序 Action
// 规则:
// - 同一自然键的多行按源顺序合并，冲突字段后行优先
// - 记录不存在 → Create；字段全部一致 → Skip；否则 Update（仅变化字段）
// - 全部 Item 动作排在 Price / Stock 动作之前
// - 物料不可用时 Price / Stock 动作标记为 Skip，不尝试写入
// ==========================================

use crate::config::ImportSettings;
use crate::domain::action::{Action, ActionOp, SkipReason};
use crate::domain::import::{ItemIntent, NormalizedRecordIntent, PriceIntent, RowErrorReason, StockIntent};
use crate::domain::record::{
    FieldDiff, FieldValue, ItemPriceRecord, ItemRecord, Record, RecordKey, StockLevelRecord,
};
use crate::domain::types::SemanticField;
use crate::repository::record_store::RecordStore;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument, warn};

// ==========================================
// 合并后的意图组（同一自然键）
// ==========================================
struct IntentGroup<T> {
    intent: T,
    source_rows: Vec<usize>,
}

/// 按自然键合并，保持首次出现顺序
struct Folded<T> {
    groups: Vec<IntentGroup<T>>,
    index: HashMap<RecordKey, usize>,
}

impl<T> Folded<T> {
    fn new() -> Self {
        Self {
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push(&mut self, key: RecordKey, row_number: usize, intent: T, merge: impl FnOnce(&mut T, &T)) {
        match self.index.get(&key) {
            Some(&pos) => {
                let group = &mut self.groups[pos];
                merge(&mut group.intent, &intent);
                group.source_rows.push(row_number);
            }
            None => {
                self.index.insert(key, self.groups.len());
                self.groups.push(IntentGroup {
                    intent,
                    source_rows: vec![row_number],
                });
            }
        }
    }
}

/// Price / Stock 共用排序
enum DependentIntent {
    Price(IntentGroup<PriceIntent>),
    Stock(IntentGroup<StockIntent>),
}

impl DependentIntent {
    fn first_row(&self) -> usize {
        let rows = match self {
            DependentIntent::Price(g) => &g.source_rows,
            DependentIntent::Stock(g) => &g.source_rows,
        };
        rows.first().copied().unwrap_or(0)
    }
}

/// 对账输出
#[derive(Debug, Default)]
pub struct PlanOutcome {
    pub actions: Vec<Action>,
    pub notes: Vec<String>,
}

// ==========================================
// ReconciliationEngine
// ==========================================
pub struct ReconciliationEngine<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    settings: &'a ImportSettings,
}

impl<'a, S: RecordStore + ?Sized> ReconciliationEngine<'a, S> {
    pub fn new(store: &'a S, settings: &'a ImportSettings) -> Self {
        Self { store, settings }
    }

    /// 生成动作计划
    ///
    /// # 参数
    /// - intents: 源顺序的意图
    /// - invalid_codes: 校验阶段失败行中可识别的物料编码
    #[instrument(skip_all, fields(intents = intents.len()))]
    pub async fn plan(
        &self,
        intents: Vec<NormalizedRecordIntent>,
        invalid_codes: &BTreeSet<String>,
    ) -> PlanOutcome {
        let mut items: Folded<ItemIntent> = Folded::new();
        let mut prices: Folded<PriceIntent> = Folded::new();
        let mut stocks: Folded<StockIntent> = Folded::new();

        for intent in intents {
            let key = intent.key();
            let row_number = intent.row_number();
            match intent {
                NormalizedRecordIntent::Item(i) => items.push(key, row_number, i, |a, b| a.merge_from(b)),
                NormalizedRecordIntent::Price(p) => prices.push(key, row_number, p, |a, b| a.merge_from(b)),
                NormalizedRecordIntent::Stock(s) => stocks.push(key, row_number, s, |a, b| a.merge_from(b)),
            }
        }

        let mut outcome = PlanOutcome::default();
        let mut created: BTreeSet<String> = BTreeSet::new();
        let mut failed: BTreeSet<String> = invalid_codes.clone();
        let mut existing: HashMap<String, bool> = HashMap::new();

        // ===== 物料 =====
        for group in items.groups {
            let code = group.intent.item_code.clone();
            note_duplicates(&mut outcome.notes, &RecordKey::item(&code), &group.source_rows);

            let op = match self.store.get(&RecordKey::item(&code)).await {
                Err(e) => {
                    warn!(item_code = %code, error = %e, "读取物料失败");
                    failed.insert(code.clone());
                    ActionOp::Skip(SkipReason::Rejected(RowErrorReason::LookupFailed(e.to_string())))
                }
                Ok(None) => {
                    existing.insert(code.clone(), false);
                    match self.new_item(&group.intent) {
                        Ok(record) => {
                            created.insert(code.clone());
                            ActionOp::Create(Record::Item(record))
                        }
                        Err(reason) => {
                            failed.insert(code.clone());
                            ActionOp::Skip(SkipReason::Rejected(reason))
                        }
                    }
                }
                Ok(Some(record)) => {
                    existing.insert(code.clone(), true);
                    let mut diff = FieldDiff::new();
                    for (field, value) in group.intent.provided_fields() {
                        let current = record.field(field).unwrap_or(FieldValue::Empty);
                        diff.record(field, current, value);
                    }
                    self.decide_update(diff)
                }
            };

            outcome.actions.push(Action {
                target: RecordKey::item(&code),
                row_number: group.intent.row_number,
                source_rows: group.source_rows,
                depends_on: None,
                op,
            });
        }

        // ===== 价格 / 库存（按首次出现行排序）=====
        let mut dependents: Vec<DependentIntent> = prices
            .groups
            .into_iter()
            .map(DependentIntent::Price)
            .chain(stocks.groups.into_iter().map(DependentIntent::Stock))
            .collect();
        dependents.sort_by_key(|d| d.first_row());

        for dependent in dependents {
            let (target, row_number, source_rows) = match &dependent {
                DependentIntent::Price(g) => (
                    RecordKey::item_price(&g.intent.price_list, &g.intent.item_code),
                    g.intent.row_number,
                    g.source_rows.clone(),
                ),
                DependentIntent::Stock(g) => (
                    RecordKey::stock(&g.intent.warehouse, &g.intent.item_code),
                    g.intent.row_number,
                    g.source_rows.clone(),
                ),
            };
            let code = target.item_code().to_string();
            note_duplicates(&mut outcome.notes, &target, &source_rows);

            let depends_on = if created.contains(&code) {
                Some(code.clone())
            } else {
                None
            };

            let op = match self
                .item_available(&code, &created, &failed, &mut existing)
                .await
            {
                Err(reason) => {
                    debug!(key = %target, reason = %reason, "依赖物料不可用，跳过");
                    ActionOp::Skip(SkipReason::Rejected(reason))
                }
                Ok(()) => match self.store.get(&target).await {
                    Err(e) => {
                        warn!(key = %target, error = %e, "读取已有记录失败");
                        ActionOp::Skip(SkipReason::Rejected(RowErrorReason::LookupFailed(e.to_string())))
                    }
                    Ok(current) => match &dependent {
                        DependentIntent::Price(g) => self.plan_price(&g.intent, current),
                        DependentIntent::Stock(g) => self.plan_stock(&g.intent, current),
                    },
                },
            };

            outcome.actions.push(Action {
                target,
                row_number,
                source_rows,
                depends_on,
                op,
            });
        }

        debug!(actions = outcome.actions.len(), "对账完成");
        outcome
    }

    /// 物料是否可被价格/库存引用
    async fn item_available(
        &self,
        code: &str,
        created: &BTreeSet<String>,
        failed: &BTreeSet<String>,
        existing: &mut HashMap<String, bool>,
    ) -> Result<(), RowErrorReason> {
        if created.contains(code) {
            return Ok(());
        }

        let exists = match existing.get(code) {
            Some(&exists) => exists,
            None => {
                let exists = self
                    .store
                    .get(&RecordKey::item(code))
                    .await
                    .map_err(|e| RowErrorReason::LookupFailed(e.to_string()))?
                    .is_some();
                existing.insert(code.to_string(), exists);
                exists
            }
        };

        if exists {
            Ok(())
        } else if failed.contains(code) {
            Err(RowErrorReason::DependencyFailed)
        } else {
            Err(RowErrorReason::ItemNotFound)
        }
    }

    /// 新建物料载荷（名称 / 物料组 / 单位 必填，后两者可取默认值）
    fn new_item(&self, intent: &ItemIntent) -> Result<ItemRecord, RowErrorReason> {
        let required = |value: &Option<String>, default: &Option<String>, field| {
            value
                .clone()
                .or_else(|| default.clone())
                .ok_or(RowErrorReason::MissingRequiredForNew { field })
        };

        Ok(ItemRecord {
            item_code: intent.item_code.clone(),
            item_name: required(&intent.item_name, &None, SemanticField::ItemName)?,
            item_group: required(
                &intent.item_group,
                &self.settings.default_item_group,
                SemanticField::ItemGroup,
            )?,
            stock_uom: required(
                &intent.stock_uom,
                &self.settings.default_stock_uom,
                SemanticField::StockUom,
            )?,
            description: intent.description.clone(),
            gst_hsn_code: intent.gst_hsn_code.clone(),
            barcode: intent.barcode.clone(),
            brand: intent.brand.clone(),
            manufacturer: intent.manufacturer.clone(),
            disabled: intent.disabled.unwrap_or(false),
            is_stock_item: intent.is_stock_item.unwrap_or(true),
            item_tax_template: intent.item_tax_template.clone(),
        })
    }

    fn plan_price(&self, intent: &PriceIntent, current: Option<Record>) -> ActionOp {
        match current {
            None => ActionOp::Create(Record::ItemPrice(ItemPriceRecord {
                price_list: intent.price_list.clone(),
                item_code: intent.item_code.clone(),
                currency: intent.currency.clone(),
                price_list_rate: intent.rate,
            })),
            Some(record) => {
                let mut diff = FieldDiff::new();
                diff.record(
                    SemanticField::Rate,
                    record.field(SemanticField::Rate).unwrap_or(FieldValue::Empty),
                    FieldValue::Number(intent.rate),
                );
                if let Some(currency) = &intent.currency {
                    diff.record(
                        SemanticField::Currency,
                        record.field(SemanticField::Currency).unwrap_or(FieldValue::Empty),
                        FieldValue::Text(currency.clone()),
                    );
                }
                self.decide_update(diff)
            }
        }
    }

    fn plan_stock(&self, intent: &StockIntent, current: Option<Record>) -> ActionOp {
        match current {
            None => ActionOp::Create(Record::Stock(StockLevelRecord {
                warehouse: intent.warehouse.clone(),
                item_code: intent.item_code.clone(),
                qty: intent.qty,
                valuation_rate: intent.valuation_rate.unwrap_or(0.0),
            })),
            Some(record) => {
                let mut diff = FieldDiff::new();
                diff.record(
                    SemanticField::Quantity,
                    record.field(SemanticField::Quantity).unwrap_or(FieldValue::Empty),
                    FieldValue::Number(intent.qty),
                );
                if let Some(rate) = intent.valuation_rate {
                    diff.record(
                        SemanticField::ValuationRate,
                        record.field(SemanticField::ValuationRate).unwrap_or(FieldValue::Empty),
                        FieldValue::Number(rate),
                    );
                }
                self.decide_update(diff)
            }
        }
    }

    fn decide_update(&self, diff: FieldDiff) -> ActionOp {
        if diff.is_empty() {
            ActionOp::Skip(SkipReason::Unchanged)
        } else if !self.settings.update_existing {
            ActionOp::Skip(SkipReason::UpdateDisabled)
        } else {
            ActionOp::Update(diff)
        }
    }
}

fn note_duplicates(notes: &mut Vec<String>, key: &RecordKey, rows: &[usize]) {
    if rows.len() > 1 {
        let rows: Vec<String> = rows.iter().map(|r| r.to_string()).collect();
        notes.push(format!("{} 出现在多行 ({})，冲突字段以后行为准", key, rows.join(", ")));
    }
}
