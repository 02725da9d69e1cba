use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use dashmap::DashMap;
use fee_recon_rust::api::{self, AppState};
use fee_recon_rust::clients::{HttpInvoicingClient, HttpLedgerClient, HttpParserClient};
use fee_recon_rust::AppConfig;
use tower::ServiceBuilder;
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::from_env();
    info!("Starting server with config: {:?}", config);

    // 协作服务客户端 (台账/解析/开票)
    let http = reqwest::Client::new();
    let state = AppState {
        sessions: Arc::new(DashMap::new()),
        ledger: Arc::new(HttpLedgerClient::new(config.collaborators.ledger_url.clone(), http.clone())),
        parser: Arc::new(HttpParserClient::new(config.collaborators.parser_url.clone(), http.clone())),
        invoicing: Arc::new(HttpInvoicingClient::new(config.collaborators.invoicing_url.clone(), http)),
        ledger_window: config.display.ledger_window,
    };

    // 构建路由
    let session_routes = Router::new()
        .route("/api/session", post(api::create_session))
        .route("/api/session/:id/counterparty", put(api::set_counterparty))
        .route("/api/session/:id/ledger/load", post(api::load_ledger))
        .route("/api/session/:id/ledger/toggle", post(api::toggle_charge))
        .route("/api/session/:id/ledger/toggle-container", post(api::toggle_container))
        .route("/api/session/:id/ledger/filter", post(api::set_filter))
        .route("/api/session/:id/import/parse", post(api::parse_import))
        .route("/api/session/:id/import/toggle", post(api::toggle_import))
        .route("/api/session/:id/import/apply", post(api::apply_import))
        .route("/api/session/:id/import/cancel", post(api::cancel_import))
        .route("/api/session/:id/items", post(api::add_item))
        .route(
            "/api/session/:id/items/:index",
            put(api::edit_item).delete(api::remove_item),
        )
        .route("/api/session/:id/compose", post(api::compose))
        .route("/api/session/:id/export.csv", get(api::export_items))
        .route("/api/session/:id/submit", post(api::submit));

    let app = Router::new()
        .route("/health", get(api::health_check))
        .merge(session_routes)
        .layer(ServiceBuilder::new())
        .with_state(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/session                          - 创建开票会话");
    info!("  POST /api/session/:id/ledger/load          - 拉取未开票费用");
    info!("  POST /api/session/:id/import/parse         - 对账单解析并匹配");
    info!("  POST /api/session/:id/submit               - 提交发票");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
