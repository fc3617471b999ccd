//! 逾期发票汇总报表: PDF 为主, 失败时退化为纯文本; 另附 CSV 明细导出

use crate::error::{AppError, Result};
use crate::models::{
    ClientSummary, Invoice, PriorityClient, ReportData, ReportFormat, SeverityBucket,
    DEFAULT_CURRENCY,
};
use crate::service::aggregation::{
    avg_days_overdue, group_by_client, max_days_overdue, plurality_currency, sum_amounts,
    ClientGroups,
};
use crate::service::currency::format_number;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::NaiveDateTime;
use printpdf::{
    BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
    Rgb,
};
use std::cmp::Ordering;
use std::fmt::Write as _;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const REPORT_TITLE: &str = "OVERDUE INVOICES REPORT";
pub const REPORT_FOOTER: &str =
    "This report was generated automatically by the Odoo Invoice Follow-Up Manager.";
/// 优先跟进客户数量
pub const TOP_CLIENT_LIMIT: usize = 3;

// ---- 报表数据 ----

impl ReportData {
    pub fn from_invoices(invoices: &[Invoice]) -> Self {
        let groups = group_by_client(invoices);

        Self {
            total_invoices: invoices.len(),
            total_amount: sum_amounts(invoices),
            primary_currency: plurality_currency(invoices)
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            total_clients: groups.len(),
            moderate_clients: client_summaries(&groups, SeverityBucket::Moderate),
            severe_clients: client_summaries(&groups, SeverityBucket::Severe),
            top_clients: prioritize_clients(&groups, TOP_CLIENT_LIMIT),
        }
    }
}

fn client_currency(invoices: &[Invoice]) -> String {
    plurality_currency(invoices).unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
}

/// 指定严重程度的客户汇总, 按金额降序
pub fn client_summaries(groups: &ClientGroups, bucket: SeverityBucket) -> Vec<ClientSummary> {
    let mut summaries: Vec<ClientSummary> = groups
        .iter()
        .filter(|(_, invoices)| SeverityBucket::from_days(max_days_overdue(invoices)) == bucket)
        .map(|(client_name, invoices)| ClientSummary {
            client_name: client_name.clone(),
            total_amount: sum_amounts(invoices),
            currency: client_currency(invoices),
            invoice_count: invoices.len(),
            max_days: max_days_overdue(invoices),
        })
        .collect();

    summaries.sort_by(|a, b| b.total_amount.cmp(&a.total_amount));
    summaries
}

/// 优先级 = 0.6 * 最大逾期天数 + 0.3 * 平均逾期天数 + 0.1 * (总额 / 1000)
pub fn priority_score(max_days: u32, avg_days: f64, total_amount: &BigDecimal) -> f64 {
    let amount = total_amount.to_f64().unwrap_or(0.0);
    f64::from(max_days) * 0.6 + avg_days * 0.3 + amount / 1000.0 * 0.1
}

/// 按优先级降序取前 `limit` 个客户; 分数相同保持原顺序
pub fn prioritize_clients(groups: &ClientGroups, limit: usize) -> Vec<PriorityClient> {
    let mut clients: Vec<PriorityClient> = groups
        .iter()
        .map(|(client_name, invoices)| {
            let total_amount = sum_amounts(invoices);
            let max_days = max_days_overdue(invoices);
            let avg_days = avg_days_overdue(invoices);
            PriorityClient {
                client_name: client_name.clone(),
                priority_score: priority_score(max_days, avg_days, &total_amount),
                currency: client_currency(invoices),
                total_amount,
                max_days_overdue: max_days,
                avg_days_overdue: (avg_days * 10.0).round() / 10.0,
                invoice_count: invoices.len(),
            }
        })
        .collect();

    clients.sort_by(|a, b| {
        b.priority_score
            .partial_cmp(&a.priority_score)
            .unwrap_or(Ordering::Equal)
    });
    clients.truncate(limit);
    clients
}

/// "AED 1,234.5"
fn money(amount: &BigDecimal, currency: &str) -> String {
    format!("{} {}", currency, format_number(amount, 0, 2))
}

// ---- 渲染 ----

/// 报表渲染器
pub trait DocumentRenderer: Send + Sync {
    fn format(&self) -> ReportFormat;

    fn render(&self, report: &ReportData, generated_at: NaiveDateTime) -> Result<Vec<u8>>;
}

/// 纯文本报表
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl DocumentRenderer for TextRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Text
    }

    fn render(&self, report: &ReportData, generated_at: NaiveDateTime) -> Result<Vec<u8>> {
        Ok(render_text(report, generated_at).into_bytes())
    }
}

pub fn render_text(report: &ReportData, generated_at: NaiveDateTime) -> String {
    let mut out = String::new();
    // 写入 String 不会失败
    let _ = writeln!(out, "{}", REPORT_TITLE);
    let _ = writeln!(out, "Generated on: {}", generated_at.format("%B %-d, %Y %H:%M"));
    let _ = writeln!(out);
    let _ = writeln!(out, "SUMMARY:");
    let _ = writeln!(out, "- Total Overdue Invoices: {}", report.total_invoices);
    let _ = writeln!(
        out,
        "- Total Overdue Amount: {}",
        money(&report.total_amount, &report.primary_currency)
    );
    let _ = writeln!(out, "- Clients with Overdue Invoices: {}", report.total_clients);
    let _ = writeln!(
        out,
        "- Moderately Overdue Clients (16-30 days): {}",
        report.moderate_clients.len()
    );
    let _ = writeln!(
        out,
        "- Severely Overdue Clients (>30 days): {}",
        report.severe_clients.len()
    );
    let _ = writeln!(out, "- Top Priority Clients Identified: {}", report.top_clients.len());

    if !report.top_clients.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "TOP {} CLIENTS TO FOLLOW UP ON:", TOP_CLIENT_LIMIT);
        for (rank, client) in report.top_clients.iter().enumerate() {
            let _ = writeln!(out);
            let _ = writeln!(out, "{}. {}", rank + 1, client.client_name);
            let _ = writeln!(out, "- Total Overdue Amount: {}", money(&client.total_amount, &client.currency));
            let _ = writeln!(out, "- Maximum Days Overdue: {}", client.max_days_overdue);
            let _ = writeln!(out, "- Average Days Overdue: {}", client.avg_days_overdue);
            let _ = writeln!(out, "- Number of Overdue Invoices: {}", client.invoice_count);
            let _ = writeln!(out, "- Priority Score: {:.2}", client.priority_score);
        }
    }

    for (heading, clients) in [
        ("SEVERELY OVERDUE CLIENTS", &report.severe_clients),
        ("MODERATELY OVERDUE CLIENTS", &report.moderate_clients),
    ] {
        let _ = writeln!(out);
        let _ = writeln!(out, "{}:", heading);
        if clients.is_empty() {
            let _ = writeln!(out, "None.");
        }
        for client in clients {
            let _ = writeln!(out);
            let _ = writeln!(out, "Client: {}", client.client_name);
            let _ = writeln!(out, "- Total Overdue Amount: {}", money(&client.total_amount, &client.currency));
            let _ = writeln!(out, "- Number of Overdue Invoices: {}", client.invoice_count);
            let _ = writeln!(out, "- Maximum Days Overdue: {}", client.max_days);
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", REPORT_FOOTER);
    out
}

// A4, 单位 mm, 原点在左下角
const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 20.0;
const ROW_H: f32 = 7.0;

/// A4 分页 PDF 报表 (内置 Helvetica 字体)
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl DocumentRenderer for PdfRenderer {
    fn format(&self) -> ReportFormat {
        ReportFormat::Pdf
    }

    fn render(&self, report: &ReportData, generated_at: NaiveDateTime) -> Result<Vec<u8>> {
        let (doc, page, layer) = PdfDocument::new(REPORT_TITLE, Mm(PAGE_W), Mm(PAGE_H), "Layer 1");
        let layer = doc.get_page(page).get_layer(layer);
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| AppError::pdf(e.to_string()))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| AppError::pdf(e.to_string()))?;

        let mut canvas = PdfCanvas {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_H - MARGIN,
            pages: 1,
        };

        // 1. 标题
        canvas.text(REPORT_TITLE, 22.0, MARGIN, true, DARK);
        canvas.advance(9.0);
        canvas.text(
            &format!("Generated on: {}", generated_at.format("%B %-d, %Y %H:%M")),
            11.0,
            MARGIN,
            false,
            GRAY,
        );
        canvas.advance(14.0);

        // 2. 汇总
        canvas.text("SUMMARY", 15.0, MARGIN, true, DARK);
        canvas.advance(9.0);
        let summary = [
            ("Total Overdue Invoices:", report.total_invoices.to_string()),
            (
                "Total Overdue Amount:",
                money(&report.total_amount, &report.primary_currency),
            ),
            ("Clients with Overdue Invoices:", report.total_clients.to_string()),
            (
                "Moderately Overdue Clients (16-30 days):",
                report.moderate_clients.len().to_string(),
            ),
            (
                "Severely Overdue Clients (>30 days):",
                report.severe_clients.len().to_string(),
            ),
            ("Top Priority Clients Identified:", report.top_clients.len().to_string()),
        ];
        for (label, value) in summary {
            canvas.text(label, 11.0, MARGIN + 5.0, false, SLATE);
            canvas.text(&value, 11.0, MARGIN + 100.0, true, SLATE);
            canvas.advance(ROW_H);
        }
        canvas.advance(8.0);

        // 3. 优先跟进客户
        if !report.top_clients.is_empty() {
            canvas.section(&format!("TOP {} CLIENTS TO FOLLOW UP ON", TOP_CLIENT_LIMIT));
            let columns = [0.0, 60.0, 105.0, 130.0, 155.0];
            canvas.header_row(&columns, &["Client Name", "Amount", "Max Days", "Avg Days", "Invoices"]);
            for client in &report.top_clients {
                canvas.row(
                    &columns,
                    &[
                        truncate(&client.client_name, 30),
                        money(&client.total_amount, &client.currency),
                        client.max_days_overdue.to_string(),
                        client.avg_days_overdue.to_string(),
                        client.invoice_count.to_string(),
                    ],
                );
            }
            canvas.advance(8.0);
        }

        // 4. 严重 / 中度逾期客户
        for (heading, empty_note, clients) in [
            (
                "SEVERELY OVERDUE CLIENTS",
                "No severely overdue clients found.",
                &report.severe_clients,
            ),
            (
                "MODERATELY OVERDUE CLIENTS",
                "No moderately overdue clients found.",
                &report.moderate_clients,
            ),
        ] {
            canvas.section(heading);
            if clients.is_empty() {
                canvas.text(empty_note, 11.0, MARGIN, false, GRAY);
                canvas.advance(12.0);
                continue;
            }
            let columns = [0.0, 70.0, 115.0, 140.0];
            canvas.header_row(&columns, &["Client Name", "Amount", "Invoices", "Days Overdue"]);
            for client in clients {
                canvas.row(
                    &columns,
                    &[
                        truncate(&client.client_name, 35),
                        money(&client.total_amount, &client.currency),
                        client.invoice_count.to_string(),
                        client.max_days.to_string(),
                    ],
                );
            }
            canvas.advance(8.0);
        }

        canvas.advance(6.0);
        canvas.text(REPORT_FOOTER, 9.0, MARGIN, false, GRAY);
        tracing::debug!("PDF 报表共 {} 页", canvas.pages);

        let mut writer = BufWriter::new(Vec::<u8>::new());
        canvas
            .doc
            .save(&mut writer)
            .map_err(|e| AppError::pdf(e.to_string()))?;
        writer
            .into_inner()
            .map_err(|e| AppError::pdf(e.to_string()))
    }
}

const DARK: (f32, f32, f32) = (44.0 / 255.0, 62.0 / 255.0, 80.0 / 255.0);
const SLATE: (f32, f32, f32) = (52.0 / 255.0, 73.0 / 255.0, 94.0 / 255.0);
const GRAY: (f32, f32, f32) = (0.5, 0.5, 0.5);

struct PdfCanvas {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// 当前基线 (距页面底部)
    y: f32,
    pages: usize,
}

impl PdfCanvas {
    fn text(&self, text: &str, size: f32, x: f32, bold: bool, color: (f32, f32, f32)) {
        let font = if bold { &self.bold } else { &self.regular };
        self.layer
            .set_fill_color(Color::Rgb(Rgb::new(color.0, color.1, color.2, None)));
        self.layer
            .use_text(latin_only(text), size, Mm(x), Mm(self.y), font);
    }

    /// 下移; 空间不足时换页
    fn advance(&mut self, dy: f32) {
        self.y -= dy;
        if self.y < MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_W), Mm(PAGE_H), format!("Layer {}", self.pages + 1));
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.pages += 1;
            self.y = PAGE_H - MARGIN;
        }
    }

    fn section(&mut self, heading: &str) {
        // 标题和表头不拆到两页
        if self.y < MARGIN + 3.0 * ROW_H {
            self.advance(self.y);
        }
        self.text(heading, 14.0, MARGIN, true, DARK);
        self.advance(9.0);
    }

    fn header_row(&mut self, columns: &[f32], labels: &[&str]) {
        for (offset, label) in columns.iter().zip(labels) {
            self.text(label, 10.0, MARGIN + offset, true, SLATE);
        }
        self.advance(ROW_H);
    }

    fn row(&mut self, columns: &[f32], cells: &[String]) {
        for (offset, cell) in columns.iter().zip(cells) {
            self.text(cell, 10.0, MARGIN + offset, false, SLATE);
        }
        self.advance(ROW_H);
    }
}

/// 内置字体只覆盖 Latin-1, 其余字符替换为 '?'
fn latin_only(text: &str) -> String {
    text.chars()
        .map(|c| if (c as u32) < 0x100 && !c.is_control() { c } else { '?' })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

// ---- 生成与导出 ----

/// 生成好的报表文件
#[derive(Debug, Clone)]
pub struct ReportArtifact {
    pub format: ReportFormat,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// 报表生成器: 主渲染器失败时退化为纯文本
pub struct ReportGenerator {
    primary: Box<dyn DocumentRenderer>,
    fallback: TextRenderer,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportGenerator {
    pub fn new() -> Self {
        Self::with_renderer(Box::new(PdfRenderer))
    }

    pub fn with_renderer(primary: Box<dyn DocumentRenderer>) -> Self {
        Self {
            primary,
            fallback: TextRenderer,
        }
    }

    fn file_name(format: ReportFormat, generated_at: NaiveDateTime) -> String {
        format!(
            "overdue-invoices-report-{}.{}",
            generated_at.format("%Y-%m-%d"),
            format.extension()
        )
    }

    fn render_with(
        renderer: &dyn DocumentRenderer,
        report: &ReportData,
        generated_at: NaiveDateTime,
    ) -> Result<ReportArtifact> {
        let bytes = renderer.render(report, generated_at)?;
        Ok(ReportArtifact {
            format: renderer.format(),
            file_name: Self::file_name(renderer.format(), generated_at),
            bytes,
        })
    }

    /// 在内存中生成报表
    pub fn generate(&self, invoices: &[Invoice], generated_at: NaiveDateTime) -> Result<ReportArtifact> {
        let report = ReportData::from_invoices(invoices);
        match Self::render_with(self.primary.as_ref(), &report, generated_at) {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                tracing::warn!("Report rendering failed, falling back to text: {}", e);
                Self::render_with(&self.fallback, &report, generated_at)
            }
        }
    }

    /// 生成报表并写入目录; 渲染或写入失败时改写纯文本报表
    pub fn write_to(
        &self,
        dir: &Path,
        invoices: &[Invoice],
        generated_at: NaiveDateTime,
    ) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let report = ReportData::from_invoices(invoices);

        let primary = Self::render_with(self.primary.as_ref(), &report, generated_at)
            .and_then(|artifact| write_artifact(dir, &artifact));
        match primary {
            Ok(path) => Ok(path),
            Err(e) => {
                tracing::warn!("Report output failed, falling back to text: {}", e);
                let artifact = Self::render_with(&self.fallback, &report, generated_at)?;
                write_artifact(dir, &artifact)
            }
        }
    }
}

fn write_artifact(dir: &Path, artifact: &ReportArtifact) -> Result<PathBuf> {
    let path = dir.join(&artifact.file_name);
    fs::write(&path, &artifact.bytes)?;
    tracing::info!("报表已写入 {}", path.display());
    Ok(path)
}

/// 导出发票明细 CSV (按客户分组), 末尾附优先跟进客户
pub fn export_csv<W: Write>(invoices: &[Invoice], target: W) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(target);
    let groups = group_by_client(invoices);

    writer.write_record([
        "Client Name",
        "Invoice Number",
        "Invoice Date",
        "Due Date",
        "Origin",
        "Amount Due",
        "Currency",
        "Days Overdue",
        "Company",
    ])?;
    for invoice in groups.values().flatten() {
        writer.write_record(&[
            invoice.client_name.clone(),
            invoice.invoice_number.clone(),
            invoice
                .invoice_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            invoice.due_date.format("%Y-%m-%d").to_string(),
            invoice.origin.clone(),
            invoice.amount_due.to_string(),
            invoice.currency.clone(),
            invoice.days_overdue.to_string(),
            invoice.company_name.clone(),
        ])?;
    }

    writer.write_record([""])?;
    writer.write_record([format!("TOP {} CLIENTS TO FOLLOW UP ON", TOP_CLIENT_LIMIT)])?;
    writer.write_record([
        "Client Name",
        "Total Amount",
        "Max Days Overdue",
        "Average Days Overdue",
        "Invoice Count",
        "Priority Score",
    ])?;
    for client in prioritize_clients(&groups, TOP_CLIENT_LIMIT) {
        writer.write_record(&[
            client.client_name,
            client.total_amount.to_string(),
            client.max_days_overdue.to_string(),
            client.avg_days_overdue.to_string(),
            client.invoice_count.to_string(),
            format!("{:.2}", client.priority_score),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

pub fn write_csv(dir: &Path, invoices: &[Invoice], generated_at: NaiveDateTime) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!(
        "invoice_followup_report_{}.csv",
        generated_at.format("%Y%m%d")
    ));
    export_csv(invoices, fs::File::create(&path)?)?;
    tracing::info!("CSV 明细已写入 {}", path.display());
    Ok(path)
}
