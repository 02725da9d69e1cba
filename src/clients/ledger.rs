use async_trait::async_trait;

use crate::error::EngineError;
use crate::models::{ChargeRecord, Direction};

/// 费用台账协作服务
/// 契约: 已核销 (invoiced) 的费用一经标记, 后续调用必不再返回
#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn list_open_charges(
        &self,
        counterparty_id: i64,
        direction: Direction,
    ) -> Result<Vec<ChargeRecord>, EngineError>;
}

/// HTTP 实现
pub struct HttpLedgerClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpLedgerClient {
    pub fn new(base_url: String, http: reqwest::Client) -> Self {
        Self { base_url, http }
    }
}

#[async_trait]
impl LedgerService for HttpLedgerClient {
    async fn list_open_charges(
        &self,
        counterparty_id: i64,
        direction: Direction,
    ) -> Result<Vec<ChargeRecord>, EngineError> {
        let url = format!("{}/api/charges/open", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("counterpartyId", counterparty_id.to_string()),
                ("direction", direction.as_str().to_string()),
                ("excludeInvoiced", "true".to_string()),
            ])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }
        let charges: Vec<ChargeRecord> = resp.json().await?;
        tracing::debug!(
            "台账返回 {} 条未开票费用 (往来单位 {}, {})",
            charges.len(),
            counterparty_id,
            direction.as_str()
        );
        Ok(charges)
    }
}
