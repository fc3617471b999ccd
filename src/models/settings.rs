use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// 用户设置 (持久化到本地)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub email_config: EmailConfig,
    pub currency: DisplayCurrency,
    pub security: SecuritySettings,
}

/// 发件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmailConfig {
    pub sender_email: String,
    pub sender_password: String,
    /// 逗号分隔的抄送列表
    pub cc_list: String,
    pub smtp_server: String,
    #[serde(deserialize_with = "port_from_number_or_text")]
    pub smtp_port: u16,
    pub default_sender_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecuritySettings {
    /// 分钟
    pub session_timeout: u32,
    #[serde(rename = "enable2FA")]
    pub enable_2fa: bool,
    /// 天
    pub data_retention: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            email_config: EmailConfig::default(),
            currency: DisplayCurrency::Original,
            security: SecuritySettings::default(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            sender_email: String::new(),
            sender_password: String::new(),
            cc_list: String::new(),
            smtp_server: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            default_sender_name: String::new(),
        }
    }
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            session_timeout: 60,
            enable_2fa: false,
            data_retention: 90,
        }
    }
}

fn port_from_number_or_text<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let port = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    Ok(port.unwrap_or(587))
}

/// 展示币种: 具体币种代码, 或 `ORIGINAL` (按发票原币展示, 不做换算)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DisplayCurrency {
    Original,
    Code(String),
}

impl DisplayCurrency {
    pub const ORIGINAL: &'static str = "ORIGINAL";

    pub fn code(code: impl Into<String>) -> Self {
        Self::from(code.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            DisplayCurrency::Original => Self::ORIGINAL,
            DisplayCurrency::Code(code) => code,
        }
    }

    pub fn is_original(&self) -> bool {
        matches!(self, DisplayCurrency::Original)
    }
}

impl From<String> for DisplayCurrency {
    fn from(value: String) -> Self {
        let value = value.trim().to_uppercase();
        if value.is_empty() || value == Self::ORIGINAL {
            DisplayCurrency::Original
        } else {
            DisplayCurrency::Code(value)
        }
    }
}

impl From<DisplayCurrency> for String {
    fn from(value: DisplayCurrency) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DisplayCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 发件配置的局部更新 (浅合并)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailConfigUpdate {
    pub sender_email: Option<String>,
    pub sender_password: Option<String>,
    pub cc_list: Option<String>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<u16>,
    pub default_sender_name: Option<String>,
}

impl EmailConfigUpdate {
    pub fn apply_to(self, config: &mut EmailConfig) {
        if let Some(v) = self.sender_email {
            config.sender_email = v;
        }
        if let Some(v) = self.sender_password {
            config.sender_password = v;
        }
        if let Some(v) = self.cc_list {
            config.cc_list = v;
        }
        if let Some(v) = self.smtp_server {
            config.smtp_server = v;
        }
        if let Some(v) = self.smtp_port {
            config.smtp_port = v;
        }
        if let Some(v) = self.default_sender_name {
            config.default_sender_name = v;
        }
    }
}

/// 安全设置的局部更新
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySettingsUpdate {
    pub session_timeout: Option<u32>,
    #[serde(rename = "enable2FA")]
    pub enable_2fa: Option<bool>,
    pub data_retention: Option<u32>,
}

impl SecuritySettingsUpdate {
    pub fn apply_to(self, security: &mut SecuritySettings) {
        if let Some(v) = self.session_timeout {
            security.session_timeout = v;
        }
        if let Some(v) = self.enable_2fa {
            security.enable_2fa = v;
        }
        if let Some(v) = self.data_retention {
            security.data_retention = v;
        }
    }
}
