use bigdecimal::{BigDecimal, Zero};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use super::ChargeRecord;
use crate::error::EngineError;

/// 单价: 合并行的各来源金额一致时为 Uniform, 不一致时为 Mixed
/// untagged 序列化: Uniform 输出数值, Mixed 输出 null —
/// 避免用魔法数字当哨兵被误拿去做运算
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitPrice {
    Uniform(BigDecimal),
    Mixed,
}

impl UnitPrice {
    pub fn as_uniform(&self) -> Option<&BigDecimal> {
        match self {
            UnitPrice::Uniform(p) => Some(p),
            UnitPrice::Mixed => None,
        }
    }

    pub fn is_mixed(&self) -> bool {
        matches!(self, UnitPrice::Mixed)
    }
}

/// 发票明细行
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLineItem {
    pub description: String,
    /// 数量, 最小为1
    pub quantity: u32,
    pub unit_price: UnitPrice,
    pub currency: String,
    /// unit_price 为 Mixed 时, amount 是外部给定的合计值, 不得按数量反算
    pub amount: BigDecimal,
    /// 税率 (百分比)
    pub tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    /// 折扣率 (百分比)
    pub discount_percent: BigDecimal,
    /// 固定折扣额, 负值表示附加费, 不做钳制
    pub discount_amount: BigDecimal,
    pub final_amount: BigDecimal,
    /// 溯源 (保序去重)
    #[serde(default)]
    pub source_charge_ids: IndexSet<i64>,
    #[serde(default)]
    pub source_shipment_ids: IndexSet<i64>,
    #[serde(default)]
    pub source_shipment_numbers: IndexSet<String>,
    #[serde(default)]
    pub source_container_numbers: IndexSet<String>,
    /// true = 由费用记录聚合产生, 摘要/金额/币种锁定不可编辑
    #[serde(default)]
    pub is_derived: bool,
}

/// 明细行编辑请求 (None = 不改)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItemEdit {
    pub description: Option<String>,
    pub quantity: Option<u32>,
    pub unit_price: Option<BigDecimal>,
    pub tax_rate: Option<BigDecimal>,
    pub discount_percent: Option<BigDecimal>,
    pub discount_amount: Option<BigDecimal>,
}

impl InvoiceLineItem {
    /// 手工录入行 (全字段可编辑)
    pub fn manual(description: String, quantity: u32, unit_price: BigDecimal, currency: String) -> Self {
        let amount = &unit_price * BigDecimal::from(quantity.max(1));
        Self {
            description,
            quantity: quantity.max(1),
            unit_price: UnitPrice::Uniform(unit_price),
            currency,
            final_amount: amount.clone(),
            amount,
            tax_rate: BigDecimal::zero(),
            tax_amount: BigDecimal::zero(),
            discount_percent: BigDecimal::zero(),
            discount_amount: BigDecimal::zero(),
            source_charge_ids: IndexSet::new(),
            source_shipment_ids: IndexSet::new(),
            source_shipment_numbers: IndexSet::new(),
            source_container_numbers: IndexSet::new(),
            is_derived: false,
        }
    }

    /// 由单条费用记录一比一生成 (数量恒为1, 单价=金额)
    pub fn from_charge(charge: &ChargeRecord) -> Self {
        let mut item = Self::manual(
            charge.fee_name.clone(),
            1,
            charge.amount.clone(),
            charge.currency.clone(),
        );
        item.is_derived = true;
        item.source_charge_ids.insert(charge.id);
        item.source_shipment_ids.insert(charge.shipment_id);
        item.source_shipment_numbers.insert(charge.shipment_number.clone());
        if let Some(cn) = charge.container_number.as_ref().filter(|c| !c.is_empty()) {
            item.source_container_numbers.insert(cn.clone());
        }
        item
    }

    /// 应用编辑: 聚合行的摘要/单价锁定, 仅数量/税/折扣可改;
    /// 金额字段由调用方通过 calculator 重算
    pub fn apply_edit(&mut self, edit: LineItemEdit) -> Result<(), EngineError> {
        if self.is_derived && (edit.description.is_some() || edit.unit_price.is_some()) {
            return Err(EngineError::Validation(
                "聚合产生的明细行不允许修改摘要或单价".to_string(),
            ));
        }
        if let Some(desc) = edit.description {
            self.description = desc;
        }
        if let Some(qty) = edit.quantity {
            if qty < 1 {
                return Err(EngineError::Validation("数量必须大于等于1".to_string()));
            }
            self.quantity = qty;
        }
        if let Some(price) = edit.unit_price {
            self.unit_price = UnitPrice::Uniform(price);
        }
        if let Some(rate) = edit.tax_rate {
            self.tax_rate = rate;
        }
        if let Some(pct) = edit.discount_percent {
            self.discount_percent = pct;
        }
        if let Some(fixed) = edit.discount_amount {
            self.discount_amount = fixed;
        }
        Ok(())
    }
}
