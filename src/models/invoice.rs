use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// 未设置币种时的默认币种
pub const DEFAULT_CURRENCY: &str = "AED";

/// 逾期发票 (来自 ERP, 只读)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub invoice_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub days_overdue: u32,
    #[serde(with = "amount_serde")]
    pub amount_due: BigDecimal,
    /// 币种代码, 后端字段名沿用 `currency_symbol`
    #[serde(
        rename = "currency_symbol",
        default = "default_currency",
        deserialize_with = "lenient_currency"
    )]
    pub currency: String,
    pub client_name: String,
    #[serde(default, deserialize_with = "lenient_email")]
    pub client_email: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub origin: String,
}

impl Invoice {
    pub fn severity(&self) -> SeverityBucket {
        SeverityBucket::from_days(self.days_overdue)
    }
}

/// 逾期严重程度分档
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityBucket {
    /// <= 15 天
    Recent,
    /// 16..=30 天
    Moderate,
    /// > 30 天
    Severe,
}

impl SeverityBucket {
    pub const RECENT_MAX_DAYS: u32 = 15;
    pub const MODERATE_MAX_DAYS: u32 = 30;

    pub fn from_days(days_overdue: u32) -> Self {
        if days_overdue <= Self::RECENT_MAX_DAYS {
            SeverityBucket::Recent
        } else if days_overdue <= Self::MODERATE_MAX_DAYS {
            SeverityBucket::Moderate
        } else {
            SeverityBucket::Severe
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SeverityBucket::Recent => "Recent",
            SeverityBucket::Moderate => "Moderate",
            SeverityBucket::Severe => "Severe",
        }
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

// ERP 对空字段返回 false / null / "", 统一视为缺失
fn non_empty_text(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn lenient_email<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(non_empty_text(Option::<Value>::deserialize(deserializer)?))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(non_empty_text(Option::<Value>::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_currency<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(non_empty_text(Option::<Value>::deserialize(deserializer)?).unwrap_or_else(default_currency))
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(non_empty_text(Option::<Value>::deserialize(deserializer)?)
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()))
}

/// 金额序列化: 写出为 JSON 数字, 读入时接受数字或字符串
pub mod amount_serde {
    use bigdecimal::{BigDecimal, ToPrimitive};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(serde_json::Number),
        Text(String),
    }

    pub fn serialize<S>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value.to_f64() {
            Some(f) if f.is_finite() => serializer.serialize_f64(f),
            _ => serializer.serialize_str(&value.to_string()),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigDecimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = match RawAmount::deserialize(deserializer)? {
            RawAmount::Number(n) => n.to_string(),
            RawAmount::Text(s) => s.trim().to_string(),
        };
        BigDecimal::from_str(&text).map_err(D::Error::custom)
    }
}
