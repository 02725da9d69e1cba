use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 对账单行 - 从上传文件解析出的一笔候选费用
/// 仅在一次导入周期内存在, 确认/取消后即丢弃
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalReconciliationRecord {
    pub fee_name: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub container_number: Option<String>,
    /// 对账单上打印的运单号, 不一定与系统内编号一致
    pub shipment_number: Option<String>,
    #[serde(default)]
    pub remark: String,

    // 匹配结果 (派生字段, 非权威)
    #[serde(default)]
    pub is_matched: bool,
    #[serde(default)]
    pub matched_charge_id: Option<i64>,
    #[serde(default)]
    pub matched_shipment_id: Option<i64>,
    #[serde(default)]
    pub matched_container_number: Option<String>,
    /// 疑似已被之前的发票消费, 不可再选
    #[serde(default)]
    pub already_invoiced: bool,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

fn default_selected() -> bool {
    true
}

impl ExternalReconciliationRecord {
    /// 匹配键: 优先箱号, 无箱号时退回运单号
    pub fn container_key(&self) -> Option<&str> {
        self.container_number
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| {
                self.shipment_number
                    .as_deref()
                    .filter(|s| !s.trim().is_empty())
            })
    }

    /// 可参与导入: 勾选且未被判定为已开票
    pub fn is_eligible(&self) -> bool {
        self.selected && !self.already_invoiced
    }
}

/// 解析协作方的输出: 对账单行 + 抬头提示信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedStatement {
    pub items: Vec<ExternalReconciliationRecord>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub external_invoice_numbers: Vec<String>,
}
