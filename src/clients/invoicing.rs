use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{DocumentTotals, InvoiceDocument, InvoiceLineItem};

/// 开票服务的明细行线格式: 溯源集合压平为单值字段
/// (多来源合并行不唯一时置空, 核销依赖 additionalChargeIds 兜底)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadItem {
    pub description: String,
    pub quantity: u32,
    /// 合并来源金额不一致时为 null
    pub unit_price: Option<BigDecimal>,
    pub currency: String,
    pub amount: BigDecimal,
    pub tax_rate: BigDecimal,
    pub tax_amount: BigDecimal,
    pub discount_percent: BigDecimal,
    pub discount_amount: BigDecimal,
    pub final_amount: BigDecimal,
    pub shipment_id: Option<i64>,
    pub shipment_number: Option<String>,
    pub charge_id: Option<i64>,
    pub container_number: Option<String>,
}

impl PayloadItem {
    fn from_item(item: &InvoiceLineItem) -> Self {
        fn only<T: Clone>(set: &indexmap::IndexSet<T>) -> Option<T>
        where
            T: std::hash::Hash + Eq,
        {
            if set.len() == 1 {
                set.first().cloned()
            } else {
                None
            }
        }
        Self {
            description: item.description.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price.as_uniform().cloned(),
            currency: item.currency.clone(),
            amount: item.amount.clone(),
            tax_rate: item.tax_rate.clone(),
            tax_amount: item.tax_amount.clone(),
            discount_percent: item.discount_percent.clone(),
            discount_amount: item.discount_amount.clone(),
            final_amount: item.final_amount.clone(),
            shipment_id: only(&item.source_shipment_ids),
            shipment_number: only(&item.source_shipment_numbers),
            charge_id: only(&item.source_charge_ids),
            container_number: only(&item.source_container_numbers),
        }
    }
}

/// 提交给开票服务的完整载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePayload {
    #[serde(rename = "type")]
    pub doc_type: String,
    pub date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub counterparty_id: i64,
    pub counterparty_name: String,
    pub shipment_ids: Vec<i64>,
    pub shipment_numbers: Vec<String>,
    pub container_numbers: Vec<String>,
    pub currency: String,
    pub exchange_rate: BigDecimal,
    pub language: String,
    pub template_id: Option<String>,
    pub items: Vec<PayloadItem>,
    pub additional_charge_ids: Vec<i64>,
    #[serde(flatten)]
    pub totals: DocumentTotals,
}

impl InvoicePayload {
    pub fn from_document(doc: &InvoiceDocument) -> Self {
        Self {
            doc_type: doc.doc_type.clone(),
            date: doc.date,
            due_date: doc.due_date,
            counterparty_id: doc.counterparty_id,
            counterparty_name: doc.counterparty_name.clone(),
            shipment_ids: doc.shipment_ids.clone(),
            shipment_numbers: doc.shipment_numbers.clone(),
            container_numbers: doc.container_numbers.clone(),
            currency: doc.currency.clone(),
            exchange_rate: doc.exchange_rate.clone(),
            language: doc.language.clone(),
            template_id: doc.template_id.clone(),
            items: doc.items.iter().map(PayloadItem::from_item).collect(),
            additional_charge_ids: doc.additional_charge_ids.clone(),
            totals: doc.totals.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceResponse {
    invoice_id: i64,
}

/// 开票协作服务
/// 契约: 接受整单载荷; update 为整体替换而非逐行修补;
/// 成功后由服务端将 sourceCharge/additional 费用标记为已核销
#[async_trait]
pub trait InvoicingService: Send + Sync {
    async fn create(&self, payload: &InvoicePayload) -> Result<i64, EngineError>;
    async fn update(&self, invoice_id: i64, payload: &InvoicePayload) -> Result<i64, EngineError>;
}

/// HTTP 实现
pub struct HttpInvoicingClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpInvoicingClient {
    pub fn new(base_url: String, http: reqwest::Client) -> Self {
        Self { base_url, http }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<i64, EngineError> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            // 开票失败原样透出, 不做重试; 选择/明细留在会话里等待重新提交
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::Submit(body));
        }
        let out: InvoiceResponse = resp.json().await?;
        Ok(out.invoice_id)
    }
}

#[async_trait]
impl InvoicingService for HttpInvoicingClient {
    async fn create(&self, payload: &InvoicePayload) -> Result<i64, EngineError> {
        let url = format!("{}/api/invoices", self.base_url);
        self.send(self.http.post(&url).json(payload)).await
    }

    async fn update(&self, invoice_id: i64, payload: &InvoicePayload) -> Result<i64, EngineError> {
        let url = format!("{}/api/invoices/{}", self.base_url, invoice_id);
        self.send(self.http.put(&url).json(payload)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitPrice;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn merged_item_flattens_to_null_singulars() {
        let mut item = InvoiceLineItem::manual("Handling Fee".to_string(), 2, dec("0"), "EUR".to_string());
        item.unit_price = UnitPrice::Mixed;
        item.amount = dec("120.00");
        item.source_charge_ids.extend([1, 2]);
        item.source_shipment_ids.extend([10, 20]);
        item.source_shipment_numbers.insert("SH001".to_string());
        item.source_shipment_numbers.insert("SH002".to_string());

        let wire = PayloadItem::from_item(&item);
        // 多来源 -> 单值字段置空; Mixed -> unitPrice 为 null
        assert_eq!(wire.unit_price, None);
        assert_eq!(wire.charge_id, None);
        assert_eq!(wire.shipment_id, None);
        assert_eq!(wire.amount, dec("120.00"));

        let json = serde_json::to_value(&wire).unwrap();
        assert!(json.get("unitPrice").unwrap().is_null());
    }

    #[test]
    fn single_source_item_keeps_linkage() {
        let mut item = InvoiceLineItem::manual("THC".to_string(), 1, dec("50.00"), "EUR".to_string());
        item.source_charge_ids.insert(7);
        item.source_shipment_ids.insert(70);
        item.source_shipment_numbers.insert("SH007".to_string());
        item.source_container_numbers.insert("ABCD1234567".to_string());

        let wire = PayloadItem::from_item(&item);
        assert_eq!(wire.charge_id, Some(7));
        assert_eq!(wire.shipment_id, Some(70));
        assert_eq!(wire.container_number.as_deref(), Some("ABCD1234567"));
        assert_eq!(wire.unit_price, Some(dec("50.00")));
    }
}
