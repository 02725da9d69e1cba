use serde::{Deserialize, Serialize};

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub collaborators: CollaboratorConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 三个外部协作服务的地址
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorConfig {
    pub ledger_url: String,
    pub parser_url: String,
    pub invoicing_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// 台账无过滤词时的展示窗口 (仅展示, 不限制可选范围)
    pub ledger_window: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
                port: std::env::var("SERVER_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(8080),
            },
            collaborators: CollaboratorConfig {
                ledger_url: std::env::var("LEDGER_SERVICE_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8081".to_string()),
                parser_url: std::env::var("PARSER_SERVICE_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8082".to_string()),
                invoicing_url: std::env::var("INVOICING_SERVICE_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8083".to_string()),
            },
            display: DisplayConfig {
                ledger_window: std::env::var("LEDGER_DISPLAY_WINDOW")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(200),
            },
        }
    }
}
