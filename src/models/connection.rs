use super::Invoice;
use serde::{Deserialize, Serialize};

/// ERP 连接参数 (含密码, 只在会话内存中保留)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionParams {
    pub url: String,
    pub database: String,
    pub username: String,
    pub password: String,
}

/// 可持久化的连接信息 (不含密码)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDetails {
    pub url: String,
    pub database: String,
    pub username: String,
}

impl From<&ConnectionParams> for ConnectionDetails {
    fn from(params: &ConnectionParams) -> Self {
        Self {
            url: params.url.clone(),
            database: params.database.clone(),
            username: params.username.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// 连接状态
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub connection_id: Option<String>,
    pub details: Option<ConnectionDetails>,
    /// 本次会话输入的密码; 重启后为空
    pub password: Option<String>,
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            connection_id: None,
            details: None,
            password: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::disconnected()
    }
}

/// 本地持久化的连接快照, 仅在已连接时存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSnapshot {
    pub is_connected: bool,
    pub connection_id: String,
    pub connection_details: ConnectionDetails,
    #[serde(default)]
    pub overdue_invoices: Vec<Invoice>,
    #[serde(default)]
    pub clients_missing_email: Vec<Invoice>,
}
