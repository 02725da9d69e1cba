use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// 收付方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 应收 (向客户开票)
    Receivable,
    /// 应付 (供应商账单)
    Payable,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Receivable => "receivable",
            Direction::Payable => "payable",
        }
    }
}

/// 审核状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// 开票状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Open,
    Invoiced,
}

/// 费用记录 - 挂在单个运单下的一笔应收/应付
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChargeRecord {
    pub id: i64,
    pub fee_name: String,
    pub category: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub shipment_id: i64,
    pub shipment_number: String,
    pub container_number: Option<String>,
    pub counterparty_id: i64,
    pub counterparty_name: String,
    pub direction: Direction,
    /// None = 历史数据, 未走审核流, 视同已审核
    pub approval_status: Option<ApprovalStatus>,
    pub invoice_status: InvoiceStatus,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default)]
    pub is_supplementary: bool,
}

impl ChargeRecord {
    /// 分组键: 优先箱号, 无箱号时退回运单号
    pub fn container_key(&self) -> &str {
        self.container_number
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.shipment_number)
    }

    /// 是否可参与开票聚合 (已开票/已驳回的费用不可再选)
    pub fn is_aggregable(&self) -> bool {
        matches!(self.approval_status, None | Some(ApprovalStatus::Approved))
            && self.invoice_status == InvoiceStatus::Open
    }
}
