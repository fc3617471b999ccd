//! 后端 API 请求 / 响应体

use crate::models::{ConnectionDetails, Invoice, TemplateChoice};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// POST /api/odoo/connect 响应
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResponse {
    pub connection_id: String,
    #[serde(default)]
    pub overdue_invoices: Vec<Invoice>,
    #[serde(default)]
    pub clients_missing_email: Vec<Invoice>,
}

/// POST /api/odoo/refresh 响应
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListResponse {
    #[serde(default)]
    pub overdue_invoices: Vec<Invoice>,
    #[serde(default)]
    pub clients_missing_email: Vec<Invoice>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectRequest<'a> {
    pub connection_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest<'a> {
    pub connection_id: &'a str,
    #[serde(flatten)]
    pub details: &'a ConnectionDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<&'a str>,
}

/// POST /api/email/send 请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendEmailsRequest {
    pub connection_id: String,
    pub selected_clients: Vec<String>,
    pub email_configs: IndexMap<String, ClientEmailPayload>,
    pub global_email_config: GlobalEmailPayload,
    /// 看板上的发票快照, 后端无需再查 ERP
    pub invoice_data: Vec<Invoice>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientEmailPayload {
    pub recipient_email: String,
    pub subject: String,
    pub body: String,
    pub cc: String,
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentPayload {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: usize,
    /// base64
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalEmailPayload {
    pub template: TemplateChoice,
    pub cc_list: String,
    pub enable_pdf_attachment: bool,
    pub sender_email: String,
    pub sender_password: String,
    pub smtp_server: String,
    pub smtp_port: u16,
}

/// POST /api/email/test 请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestEmailRequest {
    pub sender_email: String,
    pub sender_password: String,
    pub smtp_server: String,
    pub smtp_port: u16,
    pub test_email: String,
}

/// 通用应答
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AckResponse {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// 定时报表配置 (后端按 snake_case 存储)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomatedReportsConfig {
    pub enabled: bool,
    pub recipient_email: String,
    /// HH:MM
    pub report_time: String,
    pub check_interval: String,
    pub email_template: String,
    #[serde(skip_serializing)]
    pub last_sent: Option<String>,
    pub odoo_connection: ReportConnection,
    pub email_settings: ReportEmailSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConnection {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportEmailSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub sender_email: String,
    pub sender_password: String,
}

impl Default for AutomatedReportsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            recipient_email: String::new(),
            report_time: "09:00".to_string(),
            check_interval: "hourly".to_string(),
            email_template: "daily_summary".to_string(),
            last_sent: None,
            odoo_connection: ReportConnection::default(),
            email_settings: ReportEmailSettings::default(),
        }
    }
}

impl Default for ReportEmailSettings {
    fn default() -> Self {
        Self {
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            sender_email: String::new(),
            sender_password: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ReportsConfigEnvelope {
    pub success: bool,
    pub config: Option<ReportsConfigRoot>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ReportsConfigRoot {
    pub automated_reports: Option<AutomatedReportsConfig>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ReportsConfigUpdate<'a> {
    pub updates: &'a AutomatedReportsConfig,
}

/// POST /api/automated-reports/test 响应
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReportTestResponse {
    pub success: bool,
    pub message: Option<String>,
    pub report_summary: Option<ReportSummary>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportSummary {
    pub total_invoices: usize,
    pub total_amount: f64,
    pub total_clients: usize,
}
