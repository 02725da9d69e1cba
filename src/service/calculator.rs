use bigdecimal::{BigDecimal, RoundingMode, Zero};

use crate::models::{DocumentTotals, InvoiceLineItem, UnitPrice};

/// 单行计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct LineComputation {
    pub amount: BigDecimal,
    pub tax_amount: BigDecimal,
    /// 实际折扣 = 固定折扣 + (金额+税额)×折扣率, 负值原样保留 (附加费)
    pub discount: BigDecimal,
    pub final_amount: BigDecimal,
}

fn percent(value: &BigDecimal, rate: &BigDecimal) -> BigDecimal {
    (value * rate) / BigDecimal::from(100)
}

/// 单行金额计算
/// amount: Uniform 时按数量×单价, Mixed 时沿用外部给定的合计值
pub fn compute_line(item: &InvoiceLineItem) -> LineComputation {
    let amount = match &item.unit_price {
        UnitPrice::Uniform(price) => price * BigDecimal::from(item.quantity),
        UnitPrice::Mixed => item.amount.clone(),
    };
    let tax_amount = percent(&amount, &item.tax_rate);
    let taxed = &amount + &tax_amount;
    let discount = &item.discount_amount + percent(&taxed, &item.discount_percent);
    let final_amount = &taxed - &discount;
    LineComputation {
        amount,
        tax_amount,
        discount,
        final_amount,
    }
}

/// 重算并回填单行的金额字段 (编辑数量/税率/折扣之后调用)
pub fn recompute_line(item: &mut InvoiceLineItem) {
    let c = compute_line(item);
    item.amount = c.amount;
    item.tax_amount = c.tax_amount;
    item.final_amount = c.final_amount;
}

/// 汇总整张单据: 十进制逐项累加, 不引入二进制浮点漂移
pub fn compute_totals(items: &[InvoiceLineItem]) -> DocumentTotals {
    let mut subtotal = BigDecimal::zero();
    let mut tax_amount = BigDecimal::zero();
    let mut discount_amount = BigDecimal::zero();
    for item in items {
        let c = compute_line(item);
        subtotal += c.amount;
        tax_amount += c.tax_amount;
        discount_amount += c.discount;
    }
    let total_amount = &subtotal + &tax_amount - &discount_amount;
    DocumentTotals {
        subtotal,
        tax_amount,
        discount_amount,
        total_amount,
    }
}

/// 展示口径: 保留2位小数, 四舍五入
pub fn scale2(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(2, RoundingMode::HalfUp)
}
