use chrono::Local;
use invoice_followup::service::aggregation::bucket_by_severity;
use invoice_followup::service::report::write_csv;
use invoice_followup::{AppConfig, ReportGenerator, Result, SessionStore};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 使用本地时间格式, RUST_LOG 可覆盖级别
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("Backend: {}", config.backend.base_url);
    info!("Storage: {}", config.storage_dir().display());

    // 打开会话 (恢复上次的连接与设置)
    let store = Arc::new(SessionStore::open(&config)?);

    // 有配置的连接参数时重新连接, 否则刷新恢复的连接
    match config.connection.clone() {
        Some(params) => store.connect(params).await,
        None if store.is_connected() => store.refresh_invoices().await,
        None => {
            warn!("No stored connection and no [connection] section configured; nothing to do");
            return Ok(());
        }
    }

    if let Some(err) = store.last_error() {
        error!("{}", err);
        if !store.is_connected() {
            return Ok(());
        }
    }

    let invoices = store.invoices();
    let buckets = bucket_by_severity(&invoices);
    info!(
        "逾期发票 {} 张: recent {}, moderate {}, severe {}",
        invoices.len(),
        buckets.recent.len(),
        buckets.moderate.len(),
        buckets.severe.len()
    );
    let groups = store.client_groups();
    info!("涉及客户 {} 个", groups.len());
    if let Some(stats) = store.summary() {
        info!(
            "总额 {} ({} 个客户, 平均逾期 {:.1} 天)",
            stats.formatted_total, stats.unique_client_count, stats.avg_days_overdue
        );
    }
    let missing = store.clients_missing_email();
    if !missing.is_empty() {
        warn!("{} 张发票的客户缺少邮箱", missing.len());
    }

    // 输出报表
    let now = Local::now().naive_local();
    let report_path = ReportGenerator::new().write_to(&config.report.output_dir, &invoices, now)?;
    let csv_path = write_csv(&config.report.output_dir, &invoices, now)?;
    info!("Report: {}", report_path.display());
    info!("CSV: {}", csv_path.display());

    Ok(())
}
