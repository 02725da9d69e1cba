use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexMap;

use crate::error::EngineError;
use crate::models::{ChargeRecord, InvoiceLineItem, UnitPrice};

/// 将已勾选的费用记录转换为发票明细行
///
/// merge_by_name = false: 一笔费用一行, 数量1, 单价=金额
/// merge_by_name = true:  按费用名称合并 (区分大小写, 名称不同即不同费用,
/// 宁可多一行也不误并); 各来源金额一致时单价取公共值, 否则置 Mixed
///
/// 同一输入必然产出同一结果: 分组顺序取名称首次出现的顺序,
/// 溯源集合按插入顺序去重
pub fn aggregate(
    records: &[&ChargeRecord],
    counterparty_id: i64,
    counterparty_name: &str,
    merge_by_name: bool,
) -> Result<Vec<InvoiceLineItem>, EngineError> {
    // 抬头校验: 任何一笔费用归属不符, 整体拒绝, 防止串开
    for r in records {
        if r.counterparty_id != counterparty_id || r.counterparty_name != counterparty_name {
            return Err(EngineError::CounterpartyMismatch {
                expected: counterparty_name.to_string(),
                found: r.counterparty_name.clone(),
            });
        }
    }

    // 币种校验: 一张发票一个币种, 混合币种无法相加
    if let Some(first) = records.first() {
        if let Some(other) = records.iter().find(|r| r.currency != first.currency) {
            return Err(EngineError::Validation(format!(
                "勾选费用币种不一致: {} 与 {}",
                first.currency, other.currency
            )));
        }
    }

    if !merge_by_name {
        return Ok(records.iter().map(|r| InvoiceLineItem::from_charge(r)).collect());
    }

    // 保序分组
    let mut groups: IndexMap<&str, Vec<&ChargeRecord>> = IndexMap::new();
    for r in records {
        groups.entry(r.fee_name.as_str()).or_default().push(r);
    }

    let mut items = Vec::with_capacity(groups.len());
    for (fee_name, members) in groups {
        let total: BigDecimal = members.iter().map(|m| &m.amount).fold(BigDecimal::zero(), |acc, a| acc + a);
        let uniform = members.iter().all(|m| m.amount == members[0].amount);
        let unit_price = if uniform {
            UnitPrice::Uniform(members[0].amount.clone())
        } else {
            UnitPrice::Mixed
        };

        let mut item = InvoiceLineItem::manual(
            fee_name.to_string(),
            members.len() as u32,
            BigDecimal::zero(),
            members[0].currency.clone(),
        );
        item.is_derived = true;
        item.unit_price = unit_price;
        item.final_amount = total.clone();
        item.amount = total;
        for m in &members {
            item.source_charge_ids.insert(m.id);
            item.source_shipment_ids.insert(m.shipment_id);
            item.source_shipment_numbers.insert(m.shipment_number.clone());
            if let Some(cn) = m.container_number.as_ref().filter(|c| !c.is_empty()) {
                item.source_container_numbers.insert(cn.clone());
            }
        }
        items.push(item);
    }
    Ok(items)
}
