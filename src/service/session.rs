use crate::api::{AckResponse, BackendClient, TestEmailRequest};
use crate::config::{AppConfig, WorkflowConfig};
use crate::error::{AppError, Result};
use crate::models::{
    ConnectionDetails, ConnectionParams, ConnectionSnapshot, ConnectionState, ConnectionStatus,
    DisplayCurrency, EmailConfigUpdate, Invoice, SecuritySettingsUpdate, Settings,
};
use crate::service::aggregation::{group_by_client, summary_stats, ClientGroups, SummaryStats};
use crate::service::progress::{LoadingProgress, ProgressView, CONNECT_STAGES, REFRESH_STAGES};
use crate::service::CurrencyService;
use crate::storage::{LocalStorage, CONNECTION_STATE_KEY, SETTINGS_KEY};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug, Default)]
struct SessionState {
    connection: ConnectionState,
    invoices: Vec<Invoice>,
    clients_missing_email: Vec<Invoice>,
    settings: Settings,
    progress: Option<LoadingProgress>,
    error: Option<String>,
}

/// 进行中标记, 释放时自动清除
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 会话存储: 连接状态, 发票快照与用户设置.
///
/// 通过 `Arc<SessionStore>` 共享. 连接/刷新失败不会返回错误,
/// 只记录在状态中 (`last_error`). 状态锁不会跨 await 持有.
pub struct SessionStore {
    backend: BackendClient,
    storage: LocalStorage,
    currency: CurrencyService,
    workflow: WorkflowConfig,
    state: RwLock<SessionState>,
    connecting: AtomicBool,
    refreshing: AtomicBool,
    /// 每次断开加一; 进行中的连接/刷新据此判断结果是否过期
    epoch: AtomicU64,
}

impl SessionStore {
    /// 按配置打开存储并恢复上次的会话
    pub fn open(config: &AppConfig) -> Result<Self> {
        let backend = BackendClient::new(&config.backend)?;
        let storage = LocalStorage::open(config.storage_dir())?;
        Ok(Self::new(backend, storage, config.workflow.clone()))
    }

    pub fn new(backend: BackendClient, storage: LocalStorage, workflow: WorkflowConfig) -> Self {
        let state = Self::rehydrate(&storage);
        Self {
            backend,
            storage,
            currency: CurrencyService::new(),
            workflow,
            state: RwLock::new(state),
            connecting: AtomicBool::new(false),
            refreshing: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        }
    }

    /// 读取本地快照; 内容损坏时忽略并使用默认值
    fn rehydrate(storage: &LocalStorage) -> SessionState {
        let mut state = SessionState::default();

        match storage.load::<Settings>(SETTINGS_KEY) {
            Ok(Some(settings)) => state.settings = settings,
            Ok(None) => {}
            Err(e) => tracing::warn!("本地设置已损坏, 使用默认值: {}", e),
        }

        match storage.load::<ConnectionSnapshot>(CONNECTION_STATE_KEY) {
            Ok(Some(snapshot)) if snapshot.is_connected => {
                tracing::info!(
                    "恢复连接 {} ({} 张逾期发票)",
                    snapshot.connection_id,
                    snapshot.overdue_invoices.len()
                );
                state.connection = ConnectionState {
                    status: ConnectionStatus::Connected,
                    connection_id: Some(snapshot.connection_id),
                    details: Some(snapshot.connection_details),
                    password: None,
                };
                state.invoices = snapshot.overdue_invoices;
                state.clients_missing_email = snapshot.clients_missing_email;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("本地连接快照已损坏, 忽略: {}", e),
        }

        state
    }

    // ---- 连接 ----

    /// 连接 ERP. 失败时记录错误并回到未连接状态, 不向调用方返回错误.
    pub async fn connect(&self, params: ConnectionParams) {
        let Some(_guard) = InFlight::acquire(&self.connecting) else {
            tracing::warn!("Connect already in progress, ignoring request");
            return;
        };

        tracing::info!("Connecting to {} (database {})", params.url, params.database);
        let epoch = self.epoch.load(Ordering::Acquire);
        {
            let mut state = self.state.write();
            state.error = None;
            state.connection.status = ConnectionStatus::Connecting;
            state.progress = Some(LoadingProgress::start(
                CONNECT_STAGES,
                self.workflow.progress_stage(),
                Instant::now(),
            ));
        }

        match self.backend.connect(&params).await {
            Ok(response) => {
                self.complete_progress();
                tokio::time::sleep(self.workflow.connect_settle()).await;

                tracing::info!(
                    "连接成功 {}: {} 张逾期发票, {} 张缺少邮箱",
                    response.connection_id,
                    response.overdue_invoices.len(),
                    response.clients_missing_email.len()
                );
                let stale_id = {
                    let mut state = self.state.write();
                    if self.epoch.load(Ordering::Acquire) != epoch {
                        Some(response.connection_id)
                    } else {
                        state.connection = ConnectionState {
                            status: ConnectionStatus::Connected,
                            connection_id: Some(response.connection_id),
                            details: Some(ConnectionDetails::from(&params)),
                            password: Some(params.password),
                        };
                        state.invoices = response.overdue_invoices;
                        state.clients_missing_email = response.clients_missing_email;
                        state.progress = None;
                        state.error = None;
                        None
                    }
                };
                match stale_id {
                    None => self.persist_snapshot(),
                    // 连接期间已断开: 丢弃结果并释放后端会话
                    Some(id) => {
                        tracing::warn!("连接 {} 建立前已断开, 丢弃结果", id);
                        if let Err(e) = self.backend.disconnect(&id).await {
                            tracing::warn!("通知后端断开连接 {} 失败: {}", id, e);
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("Failed to connect to {}: {}", params.url, e);
                if self.epoch.load(Ordering::Acquire) != epoch {
                    return;
                }
                {
                    let mut state = self.state.write();
                    state.connection = ConnectionState::disconnected();
                    state.invoices.clear();
                    state.clients_missing_email.clear();
                    state.progress = None;
                    state.error = Some(failure_message("Failed to connect to Odoo", &e));
                }
                self.persist_snapshot();
            }
        }
    }

    /// 断开连接. 后端通知失败只记日志, 本地状态总会清空.
    pub async fn disconnect(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        let connection_id = self.connection_id();

        if let Some(id) = connection_id.as_deref() {
            if let Err(e) = self.backend.disconnect(id).await {
                tracing::warn!("通知后端断开连接 {} 失败: {}", id, e);
            }
        }

        {
            let mut state = self.state.write();
            state.connection = ConnectionState::disconnected();
            state.invoices.clear();
            state.clients_missing_email.clear();
            state.progress = None;
            state.error = None;
        }
        self.persist_snapshot();
        tracing::info!("Disconnected");
    }

    /// 重新拉取发票. 未连接时不做任何事; 失败时保留连接状态与旧数据.
    pub async fn refresh_invoices(&self) {
        let epoch = self.epoch.load(Ordering::Acquire);
        let (connection_id, details, password) = {
            let state = self.state.read();
            match (
                state.connection.is_connected(),
                &state.connection.connection_id,
                &state.connection.details,
            ) {
                (true, Some(id), Some(details)) => {
                    (id.clone(), details.clone(), state.connection.password.clone())
                }
                _ => {
                    tracing::debug!("Not connected, refresh skipped");
                    return;
                }
            }
        };

        let Some(_guard) = InFlight::acquire(&self.refreshing) else {
            tracing::warn!("Refresh already in progress, ignoring request");
            return;
        };

        {
            let mut state = self.state.write();
            state.error = None;
            state.progress = Some(LoadingProgress::start(
                REFRESH_STAGES,
                self.workflow.progress_stage(),
                Instant::now(),
            ));
        }

        match self
            .backend
            .refresh(&connection_id, &details, password.as_deref())
            .await
        {
            Ok(response) => {
                self.complete_progress();
                tokio::time::sleep(self.workflow.refresh_settle()).await;

                let applied = {
                    let mut state = self.state.write();
                    state.progress = None;
                    // 刷新期间可能已断开或重连
                    if self.epoch.load(Ordering::Acquire) == epoch
                        && state.connection.connection_id.as_deref() == Some(connection_id.as_str())
                    {
                        state.invoices = response.overdue_invoices;
                        state.clients_missing_email = response.clients_missing_email;
                        true
                    } else {
                        false
                    }
                };
                if applied {
                    tracing::info!("刷新完成: {} 张逾期发票", self.state.read().invoices.len());
                    self.persist_snapshot();
                } else {
                    tracing::warn!("连接 {} 已失效, 丢弃刷新结果", connection_id);
                }
            }
            Err(e) => {
                tracing::error!("Failed to refresh invoices for {}: {}", connection_id, e);
                let mut state = self.state.write();
                state.progress = None;
                if self.epoch.load(Ordering::Acquire) == epoch {
                    state.error = Some(failure_message("Failed to refresh invoices", &e));
                }
            }
        }
    }

    fn complete_progress(&self) {
        if let Some(progress) = self.state.write().progress.as_mut() {
            progress.complete();
        }
    }

    // ---- 设置 ----

    pub fn update_email_config(&self, update: EmailConfigUpdate) {
        self.mutate_settings(|settings| update.apply_to(&mut settings.email_config));
    }

    pub fn update_currency(&self, currency: DisplayCurrency) {
        tracing::info!("展示币种切换为 {}", currency);
        self.mutate_settings(|settings| settings.currency = currency);
    }

    pub fn update_security_settings(&self, update: SecuritySettingsUpdate) {
        self.mutate_settings(|settings| update.apply_to(&mut settings.security));
    }

    /// 恢复默认设置
    pub fn reset_settings(&self) {
        self.mutate_settings(|settings| *settings = Settings::default());
    }

    fn mutate_settings(&self, f: impl FnOnce(&mut Settings)) {
        let settings = {
            let mut state = self.state.write();
            f(&mut state.settings);
            state.settings.clone()
        };
        if let Err(e) = self.storage.save(SETTINGS_KEY, &settings) {
            tracing::warn!("保存设置失败: {}", e);
        }
    }

    /// 用当前发件配置向 `recipient` 发送测试邮件
    pub async fn send_test_email(&self, recipient: &str) -> Result<AckResponse> {
        let recipient = recipient.trim();
        if recipient.is_empty() {
            return Err(AppError::validation("Test recipient is required"));
        }

        let config = self.settings().email_config;
        if config.sender_email.trim().is_empty() || config.sender_password.is_empty() {
            return Err(AppError::validation("Sender email and password are required"));
        }

        let request = TestEmailRequest {
            sender_email: config.sender_email,
            sender_password: config.sender_password,
            smtp_server: config.smtp_server,
            smtp_port: config.smtp_port,
            test_email: recipient.to_string(),
        };
        let ack = self.backend.test_email(&request).await?;
        if !ack.success {
            return Err(AppError::Backend {
                status: 200,
                message: ack
                    .error
                    .clone()
                    .unwrap_or_else(|| "Failed to send test email".to_string()),
            });
        }
        tracing::info!("测试邮件已发送至 {}", recipient);
        Ok(ack)
    }

    // ---- 持久化 ----

    /// 已连接时写入快照, 否则删除
    fn persist_snapshot(&self) {
        let result = match self.snapshot() {
            Some(snapshot) => self.storage.save(CONNECTION_STATE_KEY, &snapshot),
            None => self.storage.remove(CONNECTION_STATE_KEY),
        };
        if let Err(e) = result {
            tracing::warn!("保存连接快照失败: {}", e);
        }
    }

    // ---- 读取 ----

    /// 当前连接快照 (不含密码); 未连接时为 None
    pub fn snapshot(&self) -> Option<ConnectionSnapshot> {
        let state = self.state.read();
        match (
            state.connection.is_connected(),
            &state.connection.connection_id,
            &state.connection.details,
        ) {
            (true, Some(id), Some(details)) => Some(ConnectionSnapshot {
                is_connected: true,
                connection_id: id.clone(),
                connection_details: details.clone(),
                overdue_invoices: state.invoices.clone(),
                clients_missing_email: state.clients_missing_email.clone(),
            }),
            _ => None,
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.read().connection.status
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().connection.is_connected()
    }

    pub fn connection_id(&self) -> Option<String> {
        self.state.read().connection.connection_id.clone()
    }

    pub fn connection_details(&self) -> Option<ConnectionDetails> {
        self.state.read().connection.details.clone()
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.state.read().invoices.clone()
    }

    pub fn clients_missing_email(&self) -> Vec<Invoice> {
        self.state.read().clients_missing_email.clone()
    }

    pub fn client_groups(&self) -> ClientGroups {
        group_by_client(&self.state.read().invoices)
    }

    /// 看板汇总 (按当前展示币种)
    pub fn summary(&self) -> Option<SummaryStats> {
        let state = self.state.read();
        summary_stats(&state.invoices, &state.settings.currency, &self.currency)
    }

    pub fn settings(&self) -> Settings {
        self.state.read().settings.clone()
    }

    pub fn display_currency(&self) -> DisplayCurrency {
        self.state.read().settings.currency.clone()
    }

    pub fn currency(&self) -> &CurrencyService {
        &self.currency
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn workflow(&self) -> &WorkflowConfig {
        &self.workflow
    }

    pub fn is_loading(&self) -> bool {
        self.state.read().progress.is_some()
    }

    pub fn progress(&self) -> ProgressView {
        self.state
            .read()
            .progress
            .as_ref()
            .map(|p| p.current(Instant::now()))
            .unwrap_or_else(ProgressView::idle)
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.read().error.clone()
    }
}

fn failure_message(prefix: &str, error: &AppError) -> String {
    match error {
        AppError::Backend { message, .. } => format!("{}: {}", prefix, message),
        other => format!("{}: {}", prefix, other),
    }
}
