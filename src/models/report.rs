use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

/// 单个客户的逾期汇总 (报表中的中度 / 严重逾期表)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSummary {
    pub client_name: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub invoice_count: usize,
    pub max_days: u32,
}

/// 优先跟进客户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityClient {
    pub client_name: String,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub max_days_overdue: u32,
    /// 保留一位小数
    pub avg_days_overdue: f64,
    pub invoice_count: usize,
    pub priority_score: f64,
}

/// 报表数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub total_invoices: usize,
    pub total_amount: BigDecimal,
    /// 出现次数最多的币种, 总额按该币种标注
    pub primary_currency: String,
    pub total_clients: usize,
    pub moderate_clients: Vec<ClientSummary>,
    pub severe_clients: Vec<ClientSummary>,
    pub top_clients: Vec<PriorityClient>,
}

/// 报表产物格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Pdf,
    Text,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Pdf => "pdf",
            ReportFormat::Text => "txt",
        }
    }
}
