use async_trait::async_trait;
use serde_json::json;

use crate::error::EngineError;
use crate::models::ParsedStatement;

/// 对账单解析协作服务: 文件上传/识别在别处完成,
/// 这里只凭文件令牌换取结构化结果
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, file_token: &str) -> Result<ParsedStatement, EngineError>;
}

/// HTTP 实现
pub struct HttpParserClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpParserClient {
    pub fn new(base_url: String, http: reqwest::Client) -> Self {
        Self { base_url, http }
    }
}

#[async_trait]
impl DocumentParser for HttpParserClient {
    async fn parse(&self, file_token: &str) -> Result<ParsedStatement, EngineError> {
        let url = format!("{}/api/parse", self.base_url);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "fileToken": file_token }))
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
        let parsed: ParsedStatement = resp.json().await?;
        tracing::debug!("对账单解析出 {} 行", parsed.items.len());
        Ok(parsed)
    }
}
