use crate::error::Result;
use crate::models::{DisplayCurrency, Invoice, TemplateTier, DEFAULT_CURRENCY};
use crate::service::aggregation::{format_invoice_amount, plurality_currency};
use crate::service::CurrencyService;
use bigdecimal::BigDecimal;
use serde::Serialize;
use tera::{Context, Tera};

// 编译期嵌入模板, 保证运行时可用
const INITIAL_TEMPLATE: &str = include_str!("../../templates/initial.tera");
const SECOND_TEMPLATE: &str = include_str!("../../templates/second.tera");
const FINAL_TEMPLATE: &str = include_str!("../../templates/final.tera");
const INVOICE_TABLE_TEMPLATE: &str = include_str!("../../templates/invoice_table.tera");

/// 渲染后的邮件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// 一封催款邮件的输入
#[derive(Debug, Clone, Copy)]
pub struct ReminderMessage<'a> {
    pub client_name: &'a str,
    pub invoices: &'a [Invoice],
    /// 客户各发票原币金额之和
    pub total_amount: &'a BigDecimal,
    /// 作为要求的付款期限写入正文
    pub max_days: u32,
}

#[derive(Serialize)]
struct TableRow {
    reference: String,
    date: String,
    due_date: String,
    origin: String,
    amount: String,
}

/// 催款邮件模板渲染器
pub struct TemplateRenderer {
    tera: Tera,
    currency: CurrencyService,
}

impl TemplateRenderer {
    pub fn new(currency: CurrencyService) -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("invoice_table", INVOICE_TABLE_TEMPLATE),
            (TemplateTier::Initial.as_str(), INITIAL_TEMPLATE),
            (TemplateTier::Second.as_str(), SECOND_TEMPLATE),
            (TemplateTier::Final.as_str(), FINAL_TEMPLATE),
        ])?;
        Ok(Self { tera, currency })
    }

    pub fn currency(&self) -> &CurrencyService {
        &self.currency
    }

    /// 按档位渲染主题与正文. 三档主题相同, 正文均附带发票明细表.
    pub fn render(
        &self,
        message: &ReminderMessage<'_>,
        tier: TemplateTier,
        display: &DisplayCurrency,
    ) -> Result<RenderedEmail> {
        let source_currency =
            plurality_currency(message.invoices).unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let formatted_total = self.currency.display_amount(message.total_amount, &source_currency, display);

        let rows: Vec<TableRow> = message
            .invoices
            .iter()
            .map(|inv| TableRow {
                reference: inv.invoice_number.clone(),
                date: inv
                    .invoice_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default(),
                due_date: inv.due_date.format("%Y-%m-%d").to_string(),
                origin: inv.origin.clone(),
                amount: format_invoice_amount(inv, display, &self.currency),
            })
            .collect();

        let mut context = Context::new();
        context.insert("client_name", message.client_name);
        context.insert("formatted_total", &formatted_total);
        context.insert("max_days", &message.max_days);
        context.insert("rows", &rows);

        let body = self.tera.render(tier.as_str(), &context)?;

        Ok(RenderedEmail {
            subject: format!("Invoice notice - outstanding balance of {}", formatted_total),
            body: body.trim_end().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::aggregation::{max_days_overdue, sum_amounts, tests::invoice};

    fn render(invoices: &[Invoice], tier: TemplateTier, display: &DisplayCurrency) -> RenderedEmail {
        let renderer = TemplateRenderer::new(CurrencyService::new()).unwrap();
        let total = sum_amounts(invoices);
        let message = ReminderMessage {
            client_name: &invoices[0].client_name,
            invoices,
            total_amount: &total,
            max_days: max_days_overdue(invoices),
        };
        renderer.render(&message, tier, display).unwrap()
    }

    #[test]
    fn subject_is_identical_across_tiers() {
        let invoices = vec![invoice(1, "Acme", 40, "100", "AED")];
        let display = DisplayCurrency::code("USD");

        let subjects: Vec<String> = [TemplateTier::Initial, TemplateTier::Second, TemplateTier::Final]
            .into_iter()
            .map(|tier| render(&invoices, tier, &display).subject)
            .collect();

        assert!(subjects.iter().all(|s| s == "Invoice notice - outstanding balance of $27.2"));
    }

    #[test]
    fn bodies_escalate_and_interpolate() {
        let invoices = vec![
            invoice(1, "Acme", 12, "1000", "SAR"),
            invoice(2, "Acme", 45, "500", "SAR"),
        ];
        let display = DisplayCurrency::Original;

        let initial = render(&invoices, TemplateTier::Initial, &display).body;
        let second = render(&invoices, TemplateTier::Second, &display).body;
        let last = render(&invoices, TemplateTier::Final, &display).body;

        assert!(initial.starts_with("Dear Acme,"));
        assert!(initial.contains("outstanding balance of ر.س1,500 on your account"));
        assert!(initial.contains("within the next 45 days"));
        assert!(initial.ends_with("Thank you for your cooperation."));
        assert!(second.contains("This is a follow-up regarding our previous message"));
        assert!(last.contains("This is our final reminder"));
        assert!(last.contains("overdue for 45 days"));
        assert_ne!(initial, second);
        assert_ne!(second, last);
    }

    #[test]
    fn invoice_table_lists_rows_and_duplicate_footer() {
        let invoices = vec![
            invoice(1, "Acme", 12, "1000", "AED"),
            invoice(2, "Acme", 45, "500", "USD"),
        ];
        let body = render(&invoices, TemplateTier::Initial, &DisplayCurrency::code("AED")).body;

        assert!(body.contains("<td style=\"padding: 8px; border: 1px solid #ddd; text-align: left;\">INV/2024/0001</td>"));
        assert!(body.contains("INV/2024/0002"));
        assert!(body.contains("S00002"));
        assert!(body.contains("2024-02-01"));
        // 单张发票从自身币种换算: 500 USD -> 1838.24 AED
        assert!(body.contains("د.إ1,838.24"));
        assert!(body.contains(">Total Due</td>"));
        assert!(body.contains(">Total Overdue</td>"));
        assert_eq!(body.matches("<tr>").count(), 2);
    }
}
