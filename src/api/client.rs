//! 后端 HTTP 客户端

use crate::api::types::*;
use crate::config::BackendConfig;
use crate::error::{AppError, Result};
use crate::models::{ConnectionDetails, ConnectionParams, SendOutcome};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// ERP 连接 / 邮件发送后端
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

/// 非 2xx 响应体中的错误字段
#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 连接 ERP 并拉取逾期发票
    pub async fn connect(&self, params: &ConnectionParams) -> Result<ConnectResponse> {
        self.post("/api/odoo/connect", params).await
    }

    /// 通知后端释放连接; 响应体忽略
    pub async fn disconnect(&self, connection_id: &str) -> Result<()> {
        let _: serde_json::Value = self
            .post("/api/odoo/disconnect", &DisconnectRequest { connection_id })
            .await?;
        Ok(())
    }

    /// 用已有连接重新拉取发票
    pub async fn refresh(
        &self,
        connection_id: &str,
        details: &ConnectionDetails,
        password: Option<&str>,
    ) -> Result<InvoiceListResponse> {
        let body = RefreshRequest {
            connection_id,
            details,
            password,
        };
        self.post("/api/odoo/refresh", &body).await
    }

    /// 批量发送催款邮件
    pub async fn send_emails(&self, request: &SendEmailsRequest) -> Result<SendOutcome> {
        debug!(
            "发送邮件请求: {} 个客户, {} 张发票",
            request.selected_clients.len(),
            request.invoice_data.len()
        );
        self.post("/api/email/send", request).await
    }

    /// 发送测试邮件以验证 SMTP 配置
    pub async fn test_email(&self, request: &TestEmailRequest) -> Result<AckResponse> {
        self.post("/api/email/test", request).await
    }

    /// 读取定时报表配置; 后端未配置时返回默认值
    pub async fn automated_reports_config(&self) -> Result<AutomatedReportsConfig> {
        let envelope: ReportsConfigEnvelope = self.get("/api/automated-reports/config").await?;
        if !envelope.success {
            return Err(AppError::Backend {
                status: 200,
                message: envelope
                    .error
                    .unwrap_or_else(|| "Failed to load automated report config".to_string()),
            });
        }
        Ok(envelope
            .config
            .and_then(|root| root.automated_reports)
            .unwrap_or_default())
    }

    pub async fn save_automated_reports_config(
        &self,
        config: &AutomatedReportsConfig,
    ) -> Result<AckResponse> {
        self.post(
            "/api/automated-reports/config",
            &ReportsConfigUpdate { updates: config },
        )
        .await
    }

    /// 立即生成并发送一份测试报表
    pub async fn test_automated_report(&self) -> Result<ReportTestResponse> {
        self.post("/api/automated-reports/test", &serde_json::json!({}))
            .await
    }

    async fn get<R: DeserializeOwned>(&self, endpoint: &str) -> Result<R> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.get(&url).send().await?;
        Self::handle_response(response).await
    }

    async fn post<T, R>(&self, endpoint: &str, body: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self.client.post(&url).json(body).send().await?;
        Self::handle_response(response).await
    }

    async fn handle_response<R: DeserializeOwned>(response: Response) -> Result<R> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16()));

        warn!("后端返回错误 {}: {}", status, message);
        Err(AppError::Backend {
            status: status.as_u16(),
            message,
        })
    }
}
