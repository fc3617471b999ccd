use crate::models::{DisplayCurrency, Invoice, SeverityBucket, DEFAULT_CURRENCY};
use crate::service::CurrencyService;
use bigdecimal::{BigDecimal, Zero};
use indexmap::{IndexMap, IndexSet};

/// 客户名 -> 该客户的发票 (保持首次出现顺序)
pub type ClientGroups = IndexMap<String, Vec<Invoice>>;

/// 按客户分组
pub fn group_by_client(invoices: &[Invoice]) -> ClientGroups {
    let mut groups = ClientGroups::new();
    for invoice in invoices {
        groups
            .entry(invoice.client_name.clone())
            .or_insert_with(Vec::new)
            .push(invoice.clone());
    }
    groups
}

/// 三档分桶结果
#[derive(Debug, Clone, PartialEq)]
pub struct SeverityBuckets<T> {
    pub recent: Vec<T>,
    pub moderate: Vec<T>,
    pub severe: Vec<T>,
}

impl<T> SeverityBuckets<T> {
    pub fn get(&self, bucket: SeverityBucket) -> &[T] {
        match bucket {
            SeverityBucket::Recent => &self.recent,
            SeverityBucket::Moderate => &self.moderate,
            SeverityBucket::Severe => &self.severe,
        }
    }

    fn push(&mut self, bucket: SeverityBucket, item: T) {
        match bucket {
            SeverityBucket::Recent => self.recent.push(item),
            SeverityBucket::Moderate => self.moderate.push(item),
            SeverityBucket::Severe => self.severe.push(item),
        }
    }

    pub fn len(&self) -> usize {
        self.recent.len() + self.moderate.len() + self.severe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for SeverityBuckets<T> {
    fn default() -> Self {
        Self {
            recent: Vec::new(),
            moderate: Vec::new(),
            severe: Vec::new(),
        }
    }
}

/// 发票级分桶 (看板列表)
pub fn bucket_by_severity(invoices: &[Invoice]) -> SeverityBuckets<&Invoice> {
    let mut buckets = SeverityBuckets::default();
    for invoice in invoices {
        buckets.push(invoice.severity(), invoice);
    }
    buckets
}

/// 客户级分桶: 以客户所有发票中的最大逾期天数定档.
/// `name_filter` 非空时只保留名称包含该文本的客户 (不区分大小写).
pub fn bucket_clients(groups: &ClientGroups, name_filter: &str) -> SeverityBuckets<String> {
    let needle = name_filter.trim().to_lowercase();
    let mut buckets = SeverityBuckets::default();
    for (client_name, invoices) in groups {
        if !needle.is_empty() && !client_name.to_lowercase().contains(&needle) {
            continue;
        }
        let bucket = SeverityBucket::from_days(max_days_overdue(invoices));
        buckets.push(bucket, client_name.clone());
    }
    buckets
}

pub fn max_days_overdue(invoices: &[Invoice]) -> u32 {
    invoices.iter().map(|inv| inv.days_overdue).max().unwrap_or(0)
}

pub fn avg_days_overdue(invoices: &[Invoice]) -> f64 {
    if invoices.is_empty() {
        return 0.0;
    }
    let total: u64 = invoices.iter().map(|inv| u64::from(inv.days_overdue)).sum();
    total as f64 / invoices.len() as f64
}

pub fn sum_amounts<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> BigDecimal {
    invoices
        .into_iter()
        .fold(BigDecimal::zero(), |acc, inv| acc + &inv.amount_due)
}

/// 出现次数最多的币种.
/// 计数相同时, 计数表中靠后的币种胜出.
pub fn plurality_currency<'a>(invoices: impl IntoIterator<Item = &'a Invoice>) -> Option<String> {
    let mut tally: IndexMap<&str, usize> = IndexMap::new();
    for invoice in invoices {
        *tally.entry(invoice.currency.as_str()).or_insert(0) += 1;
    }

    tally
        .into_iter()
        .reduce(|best, candidate| if best.1 > candidate.1 { best } else { candidate })
        .map(|(code, _)| code.to_string())
}

/// 看板汇总
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStats {
    pub count: usize,
    /// 各原币金额直接相加
    pub total_amount: BigDecimal,
    /// 按主币种换算到展示币种后的总额
    pub total_amount_converted: BigDecimal,
    pub source_currency: String,
    pub display_currency: DisplayCurrency,
    pub formatted_total: String,
    pub avg_days_overdue: f64,
    pub unique_client_count: usize,
}

/// 汇总统计; 空列表返回 None
pub fn summary_stats(
    invoices: &[Invoice],
    display: &DisplayCurrency,
    currency: &CurrencyService,
) -> Option<SummaryStats> {
    if invoices.is_empty() {
        return None;
    }

    let total_amount = sum_amounts(invoices);
    let source_currency =
        plurality_currency(invoices).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let total_amount_converted = currency.convert(&total_amount, &source_currency, display.as_str());
    let formatted_total =
        currency.format_amount(&total_amount_converted, display.as_str(), Some(&source_currency));
    let unique_client_count = invoices
        .iter()
        .map(|inv| inv.client_name.as_str())
        .collect::<IndexSet<_>>()
        .len();

    Some(SummaryStats {
        count: invoices.len(),
        total_amount,
        total_amount_converted,
        source_currency,
        display_currency: display.clone(),
        formatted_total,
        avg_days_overdue: avg_days_overdue(invoices),
        unique_client_count,
    })
}

/// 单客户统计
#[derive(Debug, Clone, PartialEq)]
pub struct ClientStats {
    pub client_name: String,
    pub invoice_count: usize,
    pub total_amount: BigDecimal,
    pub converted_amount: BigDecimal,
    pub max_days: u32,
    pub avg_days: f64,
    pub has_email: bool,
    /// 该客户发票中最常见的币种
    pub source_currency: String,
    pub formatted_amount: String,
    pub severity: SeverityBucket,
}

pub fn client_stats(
    client_name: &str,
    invoices: &[Invoice],
    display: &DisplayCurrency,
    currency: &CurrencyService,
) -> Option<ClientStats> {
    if invoices.is_empty() {
        return None;
    }

    let total_amount = sum_amounts(invoices);
    let source_currency =
        plurality_currency(invoices).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let converted_amount = currency.convert(&total_amount, &source_currency, display.as_str());
    let formatted_amount =
        currency.format_amount(&converted_amount, display.as_str(), Some(&source_currency));
    let max_days = max_days_overdue(invoices);

    Some(ClientStats {
        client_name: client_name.to_string(),
        invoice_count: invoices.len(),
        total_amount,
        converted_amount,
        max_days,
        avg_days: avg_days_overdue(invoices),
        has_email: invoices.iter().any(|inv| inv.client_email.is_some()),
        source_currency,
        formatted_amount,
        severity: SeverityBucket::from_days(max_days),
    })
}

/// 单张发票按展示币种格式化 (从发票自身币种换算)
pub fn format_invoice_amount(
    invoice: &Invoice,
    display: &DisplayCurrency,
    currency: &CurrencyService,
) -> String {
    currency.display_amount(&invoice.amount_due, &invoice.currency, display)
}
