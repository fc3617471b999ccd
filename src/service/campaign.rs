use crate::api::{
    AttachmentPayload, BackendClient, ClientEmailPayload, GlobalEmailPayload, SendEmailsRequest,
};
use crate::config::WorkflowConfig;
use crate::error::{AppError, Result};
use crate::models::{
    Attachment, CampaignDefaults, CampaignStep, DraftUpdate, EmailDraft, Invoice, SendOutcome,
    Settings, TemplateChoice, TemplateTier,
};
use crate::service::aggregation::{
    bucket_clients, group_by_client, max_days_overdue, sum_amounts, ClientGroups, SeverityBuckets,
};
use crate::service::templates::{ReminderMessage, TemplateRenderer};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::{IndexMap, IndexSet};
use std::time::{Duration, Instant};

const NO_CONNECTION_ERROR: &str = "No active connection found. Please reconnect to Odoo.";

/// 向导依赖的外部数据: 当前发票, 用户设置, 模板渲染器
#[derive(Clone, Copy)]
pub struct CampaignContext<'a> {
    pub invoices: &'a [Invoice],
    pub settings: &'a Settings,
    pub renderer: &'a TemplateRenderer,
}

impl CampaignContext<'_> {
    fn groups(&self) -> ClientGroups {
        group_by_client(self.invoices)
    }

    /// 用指定档位生成客户邮件的主题与正文
    fn render(&self, client_name: &str, invoices: &[Invoice], tier: TemplateTier) -> Result<(String, String)> {
        let total = sum_amounts(invoices);
        let message = ReminderMessage {
            client_name,
            invoices,
            total_amount: &total,
            max_days: max_days_overdue(invoices),
        };
        let email = self
            .renderer
            .render(&message, tier, &self.settings.currency)?;
        Ok((email.subject, email.body))
    }
}

/// 客户发票上的邮箱 (取第一个非空值)
fn client_email(invoices: &[Invoice]) -> Option<&str> {
    invoices.iter().find_map(|inv| inv.client_email.as_deref())
}

/// 催款邮件向导: 选择客户 -> 编辑草稿 -> 确认发送.
///
/// 发送成功 (至少一封) 后显示提示, 并在固定延时后回到第一步.
/// 延时通过 `tick` / `settle` 推进.
#[derive(Debug)]
pub struct EmailCampaign {
    step: CampaignStep,
    selected: IndexSet<String>,
    drafts: IndexMap<String, EmailDraft>,
    defaults: CampaignDefaults,
    client_search: String,
    draft_search: String,
    last_result: Option<SendOutcome>,
    reset_at: Option<Instant>,
    notice_until: Option<Instant>,
    reset_delay: Duration,
    notice_duration: Duration,
}

impl EmailCampaign {
    pub fn new(settings: &Settings, workflow: &WorkflowConfig) -> Self {
        Self {
            step: CampaignStep::SelectClients,
            selected: IndexSet::new(),
            drafts: IndexMap::new(),
            defaults: CampaignDefaults::with_cc(settings.email_config.cc_list.clone()),
            client_search: String::new(),
            draft_search: String::new(),
            last_result: None,
            reset_at: None,
            notice_until: None,
            reset_delay: workflow.campaign_reset(),
            notice_duration: workflow.success_notice(),
        }
    }

    pub fn step(&self) -> CampaignStep {
        self.step
    }

    pub fn selected(&self) -> &IndexSet<String> {
        &self.selected
    }

    pub fn is_selected(&self, client_name: &str) -> bool {
        self.selected.contains(client_name)
    }

    pub fn drafts(&self) -> &IndexMap<String, EmailDraft> {
        &self.drafts
    }

    pub fn draft(&self, client_name: &str) -> Option<&EmailDraft> {
        self.drafts.get(client_name)
    }

    pub fn defaults(&self) -> &CampaignDefaults {
        &self.defaults
    }

    pub fn last_result(&self) -> Option<&SendOutcome> {
        self.last_result.as_ref()
    }

    pub fn success_notice_visible(&self, now: Instant) -> bool {
        self.notice_until.map_or(false, |until| now < until)
    }

    // ---- 第一步: 选择客户 ----

    pub fn set_client_search(&mut self, query: impl Into<String>) {
        self.client_search = query.into();
    }

    pub fn client_search(&self) -> &str {
        &self.client_search
    }

    /// 可选客户, 按严重程度分组并应用名称搜索
    pub fn selectable_clients(&self, invoices: &[Invoice]) -> SeverityBuckets<String> {
        bucket_clients(&group_by_client(invoices), &self.client_search)
    }

    pub fn toggle_client(&mut self, client_name: &str) {
        if self.selected.shift_remove(client_name) {
            self.drafts.shift_remove(client_name);
        } else {
            self.selected.insert(client_name.to_string());
        }
    }

    /// 选中一组客户 (通常是某个严重程度分组), 不影响其他已选客户
    pub fn select_all(&mut self, clients: &[String]) {
        self.selected.extend(clients.iter().cloned());
    }

    /// 取消选中一组客户, 不影响其他已选客户
    pub fn deselect_all(&mut self, clients: &[String]) {
        for client in clients {
            self.selected.shift_remove(client);
            self.drafts.shift_remove(client);
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected.clear();
        self.drafts.clear();
    }

    // ---- 步骤切换 ----

    pub fn next_step(&mut self, ctx: &CampaignContext<'_>) -> Result<CampaignStep> {
        match self.step {
            CampaignStep::SelectClients => {
                if self.selected.is_empty() {
                    return Err(AppError::validation("Select at least one client to continue"));
                }
                self.initialize_drafts(ctx)?;
                self.step = CampaignStep::Customize;
            }
            CampaignStep::Customize => self.step = CampaignStep::Review,
            CampaignStep::Review => {}
        }
        tracing::debug!("邮件向导第 {} 步", self.step.number());
        Ok(self.step)
    }

    pub fn previous_step(&mut self) -> CampaignStep {
        self.step = match self.step {
            CampaignStep::Review => CampaignStep::Customize,
            _ => CampaignStep::SelectClients,
        };
        self.step
    }

    /// 为每个已选客户准备草稿. 已有草稿保留, 未选中客户的草稿删除.
    fn initialize_drafts(&mut self, ctx: &CampaignContext<'_>) -> Result<()> {
        let groups = ctx.groups();
        let mut drafts = IndexMap::with_capacity(self.selected.len());

        for client_name in &self.selected {
            let draft = match self.drafts.shift_remove(client_name) {
                Some(existing) => existing,
                None => {
                    let invoices = groups.get(client_name).map(Vec::as_slice).unwrap_or(&[]);
                    let tier = self.defaults.template.resolve(max_days_overdue(invoices));
                    let (subject, body) = ctx.render(client_name, invoices, tier)?;
                    EmailDraft {
                        subject,
                        body,
                        recipient_email: client_email(invoices).unwrap_or_default().to_string(),
                        cc: self.defaults.cc_list.clone(),
                        attachments: Vec::new(),
                        template: tier,
                    }
                }
            };
            drafts.insert(client_name.clone(), draft);
        }

        tracing::info!("初始化 {} 份邮件草稿", drafts.len());
        self.drafts = drafts;
        Ok(())
    }

    // ---- 全局默认值 ----

    /// 修改模板选择并重新生成草稿; 收件人与附件保留
    pub fn set_template_override(
        &mut self,
        choice: TemplateChoice,
        ctx: &CampaignContext<'_>,
    ) -> Result<()> {
        self.defaults.template = choice;
        let groups = ctx.groups();

        for (client_name, draft) in self.drafts.iter_mut() {
            let invoices = groups.get(client_name).map(Vec::as_slice).unwrap_or(&[]);
            let tier = choice.resolve(max_days_overdue(invoices));
            let (subject, body) = ctx.render(client_name, invoices, tier)?;
            draft.subject = subject;
            draft.body = body;
            draft.template = tier;
            draft.cc = self.defaults.cc_list.clone();
            if draft.recipient_email.is_empty() {
                draft.recipient_email = client_email(invoices).unwrap_or_default().to_string();
            }
        }
        Ok(())
    }

    /// 修改全局抄送, 同步到所有草稿
    pub fn set_global_cc(&mut self, cc_list: impl Into<String>) {
        self.defaults.cc_list = cc_list.into();
        for draft in self.drafts.values_mut() {
            draft.cc = self.defaults.cc_list.clone();
        }
    }

    pub fn set_pdf_attachment(&mut self, enabled: bool) {
        self.defaults.enable_pdf_attachment = enabled;
    }

    // ---- 第二步: 编辑草稿 ----

    pub fn set_draft_search(&mut self, query: impl Into<String>) {
        self.draft_search = query.into();
    }

    pub fn draft_search(&self) -> &str {
        &self.draft_search
    }

    /// 已选客户的展示顺序: 名称或邮箱匹配搜索词的排在前面, 不移除任何客户
    pub fn ordered_selection(&self, invoices: &[Invoice]) -> Vec<String> {
        let needle = self.draft_search.trim().to_lowercase();
        if needle.is_empty() {
            return self.selected.iter().cloned().collect();
        }

        let groups = group_by_client(invoices);
        let (mut matching, rest): (Vec<String>, Vec<String>) =
            self.selected.iter().cloned().partition(|client_name| {
                let email = groups
                    .get(client_name)
                    .and_then(|invoices| client_email(invoices))
                    .unwrap_or_default();
                client_name.to_lowercase().contains(&needle)
                    || email.to_lowercase().contains(&needle)
            });
        matching.extend(rest);
        matching
    }

    pub fn update_draft(&mut self, client_name: &str, update: DraftUpdate) -> Result<()> {
        let draft = self.draft_mut(client_name)?;
        update.apply_to(draft);
        Ok(())
    }

    pub fn add_attachment(&mut self, client_name: &str, attachment: Attachment) -> Result<()> {
        let draft = self.draft_mut(client_name)?;
        tracing::debug!("{} 添加附件 {} ({} bytes)", client_name, attachment.file_name, attachment.size());
        draft.attachments.push(attachment);
        Ok(())
    }

    pub fn remove_attachment(&mut self, client_name: &str, index: usize) -> Result<Attachment> {
        let draft = self.draft_mut(client_name)?;
        if index >= draft.attachments.len() {
            return Err(AppError::not_found(format!(
                "attachment #{} for {}",
                index, client_name
            )));
        }
        Ok(draft.attachments.remove(index))
    }

    fn draft_mut(&mut self, client_name: &str) -> Result<&mut EmailDraft> {
        self.drafts
            .get_mut(client_name)
            .ok_or_else(|| AppError::not_found(format!("draft for {}", client_name)))
    }

    // ---- 第三步: 发送 ----

    /// 批量发送已选客户的邮件.
    ///
    /// 没有连接时不发请求, 所有客户记为失败; 请求失败时同样全部记为失败.
    /// 选择为空或模板渲染失败时返回错误.
    pub async fn send(
        &mut self,
        backend: &BackendClient,
        connection_id: Option<&str>,
        ctx: &CampaignContext<'_>,
    ) -> Result<SendOutcome> {
        if self.selected.is_empty() {
            return Err(AppError::validation("No clients selected"));
        }
        let clients: Vec<String> = self.selected.iter().cloned().collect();

        // 新的发送取消上一次成功留下的提示与自动重置
        self.notice_until = None;
        self.reset_at = None;

        let Some(connection_id) = connection_id else {
            tracing::warn!("没有可用连接, {} 个客户未发送", clients.len());
            let outcome = SendOutcome::all_failed(&clients, NO_CONNECTION_ERROR, "no connection");
            self.last_result = Some(outcome.clone());
            return Ok(outcome);
        };

        self.last_result = None;
        let request = self.build_request(connection_id, &clients, ctx)?;

        tracing::info!("Sending reminder emails to {} clients", clients.len());
        let result = backend.send_emails(&request).await;

        let outcome = match result {
            Ok(outcome) => {
                tracing::info!(
                    "发送完成: 成功 {}, 失败 {}",
                    outcome.successful_sends,
                    outcome.failed_sends
                );
                if outcome.successful_sends > 0 {
                    let now = Instant::now();
                    self.notice_until = Some(now + self.notice_duration);
                    self.reset_at = Some(now + self.reset_delay);
                }
                outcome
            }
            Err(e) => {
                let message = match &e {
                    AppError::Backend { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                tracing::error!("Error sending emails: {}", message);
                let reason = format!("API error: {}", message);
                SendOutcome::all_failed(&clients, message, &reason)
            }
        };

        self.last_result = Some(outcome.clone());
        Ok(outcome)
    }

    fn build_request(
        &self,
        connection_id: &str,
        clients: &[String],
        ctx: &CampaignContext<'_>,
    ) -> Result<SendEmailsRequest> {
        let groups = ctx.groups();
        let mut email_configs = IndexMap::with_capacity(clients.len());

        for client_name in clients {
            let invoices = groups.get(client_name).map(Vec::as_slice).unwrap_or(&[]);
            let draft = self.drafts.get(client_name);

            let (mut subject, mut body) = draft
                .map(|d| (d.subject.clone(), d.body.clone()))
                .unwrap_or_default();
            // 草稿缺少主题或正文时按当前模板选择重新生成
            if subject.is_empty() || body.is_empty() {
                let tier = self.defaults.template.resolve(max_days_overdue(invoices));
                let (generated_subject, generated_body) = ctx.render(client_name, invoices, tier)?;
                if subject.is_empty() {
                    subject = generated_subject;
                }
                if body.is_empty() {
                    body = generated_body;
                }
            }

            let recipient_email = draft
                .map(|d| d.recipient_email.clone())
                .filter(|r| !r.is_empty())
                .or_else(|| client_email(invoices).map(str::to_string))
                .unwrap_or_default();
            let cc = draft
                .map(|d| d.cc.clone())
                .filter(|cc| !cc.is_empty())
                .unwrap_or_else(|| self.defaults.cc_list.clone());
            let attachments: Vec<AttachmentPayload> = draft
                .map(|d| d.attachments.iter().map(encode_attachment).collect())
                .unwrap_or_default();

            email_configs.insert(
                client_name.clone(),
                ClientEmailPayload {
                    recipient_email,
                    subject,
                    body,
                    cc,
                    attachments,
                },
            );
        }

        let email = &ctx.settings.email_config;
        Ok(SendEmailsRequest {
            connection_id: connection_id.to_string(),
            selected_clients: clients.to_vec(),
            email_configs,
            global_email_config: GlobalEmailPayload {
                template: self.defaults.template,
                cc_list: self.defaults.cc_list.clone(),
                enable_pdf_attachment: self.defaults.enable_pdf_attachment,
                sender_email: email.sender_email.clone(),
                sender_password: email.sender_password.clone(),
                smtp_server: email.smtp_server.clone(),
                smtp_port: email.smtp_port,
            },
            invoice_data: ctx.invoices.to_vec(),
        })
    }

    // ---- 定时 ----

    /// 推进延时: 到期后隐藏提示, 或回到第一步并清空选择与草稿
    pub fn tick(&mut self, now: Instant) {
        if self.notice_until.map_or(false, |until| now >= until) {
            self.notice_until = None;
        }
        if self.reset_at.map_or(false, |at| now >= at) {
            self.reset_at = None;
            self.reset();
        }
    }

    /// 等待挂起的自动重置完成
    pub async fn settle(&mut self) {
        if let Some(at) = self.reset_at {
            tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await;
        }
        self.tick(Instant::now());
    }

    fn reset(&mut self) {
        tracing::info!("邮件向导已重置");
        self.step = CampaignStep::SelectClients;
        self.selected.clear();
        self.drafts.clear();
        self.last_result = None;
    }
}

fn encode_attachment(attachment: &Attachment) -> AttachmentPayload {
    AttachmentPayload {
        name: attachment.file_name.clone(),
        content_type: attachment.content_type.clone(),
        size: attachment.size(),
        content: STANDARD.encode(&attachment.data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DisplayCurrency;
    use crate::service::aggregation::tests::invoice;
    use crate::service::CurrencyService;

    fn fixture() -> (Vec<Invoice>, Settings, TemplateRenderer) {
        let invoices = vec![
            invoice(1, "Acme", 40, "1000", "AED"),
            invoice(2, "Acme", 5, "250", "AED"),
            invoice(3, "Beta", 10, "300", "USD"),
            invoice(4, "Gamma", 20, "700", "SAR"),
            invoice(5, "Delta", 35, "900", "AED"),
        ];
        let mut settings = Settings::default();
        settings.email_config.cc_list = "finance@prezlab.example".to_string();
        settings.currency = DisplayCurrency::code("AED");
        let renderer = TemplateRenderer::new(CurrencyService::new()).unwrap();
        (invoices, settings, renderer)
    }

    fn campaign(settings: &Settings) -> EmailCampaign {
        EmailCampaign::new(settings, &WorkflowConfig::immediate())
    }

    #[test]
    fn step_two_requires_selection_and_picks_tiers_by_severity() {
        let (invoices, settings, renderer) = fixture();
        let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
        let mut campaign = campaign(&settings);

        assert!(campaign.next_step(&ctx).is_err());
        assert_eq!(campaign.step(), CampaignStep::SelectClients);

        campaign.toggle_client("Acme");
        campaign.toggle_client("Beta");
        assert_eq!(campaign.next_step(&ctx).unwrap(), CampaignStep::Customize);

        let acme = campaign.draft("Acme").unwrap();
        assert_eq!(acme.template, TemplateTier::Final);
        assert_eq!(acme.recipient_email, "ap@acme.example");
        assert_eq!(acme.cc, "finance@prezlab.example");
        assert_eq!(campaign.draft("Beta").unwrap().template, TemplateTier::Initial);
        assert_eq!(campaign.drafts().len(), 2);

        assert_eq!(campaign.next_step(&ctx).unwrap(), CampaignStep::Review);
        assert_eq!(campaign.previous_step(), CampaignStep::Customize);
        assert_eq!(campaign.previous_step(), CampaignStep::SelectClients);
    }

    #[test]
    fn bucket_scoped_select_and_deselect() {
        let (invoices, settings, _) = fixture();
        let mut campaign = campaign(&settings);
        let buckets = campaign.selectable_clients(&invoices);
        assert_eq!(buckets.severe, vec!["Acme".to_string(), "Delta".to_string()]);

        campaign.toggle_client("Beta");
        campaign.select_all(&buckets.severe);
        campaign.toggle_client("Delta");

        assert_eq!(campaign.selected().len(), 2);
        assert!(campaign.is_selected("Beta"));
        assert!(campaign.is_selected("Acme"));

        campaign.deselect_all(&buckets.severe);
        let remaining: Vec<&String> = campaign.selected().iter().collect();
        assert_eq!(remaining, vec!["Beta"]);

        campaign.clear_selection();
        assert!(campaign.selected().is_empty());
    }

    #[test]
    fn deselecting_drops_the_draft() {
        let (invoices, settings, renderer) = fixture();
        let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
        let mut campaign = campaign(&settings);
        campaign.select_all(&["Acme".to_string(), "Gamma".to_string()]);
        campaign.next_step(&ctx).unwrap();

        campaign.toggle_client("Gamma");
        assert!(campaign.draft("Gamma").is_none());
        assert!(campaign.draft("Acme").is_some());
    }

    #[test]
    fn override_regenerates_but_keeps_recipient_and_attachments() {
        let (invoices, settings, renderer) = fixture();
        let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
        let mut campaign = campaign(&settings);
        campaign.select_all(&["Acme".to_string(), "Beta".to_string()]);
        campaign.next_step(&ctx).unwrap();

        campaign
            .update_draft(
                "Acme",
                DraftUpdate {
                    recipient_email: Some("billing@acme.example".to_string()),
                    body: Some("edited".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();
        campaign
            .add_attachment("Acme", Attachment::new("statement.pdf", None, vec![1, 2, 3]))
            .unwrap();

        campaign.set_template_override(TemplateChoice::Initial, &ctx).unwrap();
        let acme = campaign.draft("Acme").unwrap();
        assert_eq!(acme.template, TemplateTier::Initial);
        assert_eq!(acme.recipient_email, "billing@acme.example");
        assert_eq!(acme.attachments.len(), 1);
        assert_ne!(acme.body, "edited");

        campaign.set_template_override(TemplateChoice::Auto, &ctx).unwrap();
        assert_eq!(campaign.draft("Acme").unwrap().template, TemplateTier::Final);
        assert_eq!(campaign.draft("Beta").unwrap().template, TemplateTier::Initial);
    }

    #[test]
    fn global_cc_propagates_to_drafts() {
        let (invoices, settings, renderer) = fixture();
        let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
        let mut campaign = campaign(&settings);
        campaign.toggle_client("Gamma");
        campaign.next_step(&ctx).unwrap();

        campaign.set_global_cc("ar@prezlab.example");
        assert_eq!(campaign.draft("Gamma").unwrap().cc, "ar@prezlab.example");
    }

    #[test]
    fn draft_search_reorders_without_filtering() {
        let (invoices, settings, _) = fixture();
        let mut campaign = campaign(&settings);
        for client in ["Acme", "Beta", "Gamma"] {
            campaign.toggle_client(client);
        }

        campaign.set_draft_search("GAMMA");
        assert_eq!(campaign.ordered_selection(&invoices), vec!["Gamma", "Acme", "Beta"]);

        // 邮箱同样参与匹配
        campaign.set_draft_search("ap@beta");
        assert_eq!(campaign.ordered_selection(&invoices), vec!["Beta", "Acme", "Gamma"]);

        campaign.set_draft_search("nobody");
        assert_eq!(campaign.ordered_selection(&invoices), vec!["Acme", "Beta", "Gamma"]);
    }

    #[test]
    fn attachment_edits_on_unknown_drafts_fail() {
        let (_, settings, _) = fixture();
        let mut campaign = campaign(&settings);

        assert!(matches!(
            campaign.add_attachment("Nobody", Attachment::new("a.txt", None, vec![])),
            Err(AppError::NotFound { .. })
        ));
        assert!(campaign.remove_attachment("Nobody", 0).is_err());
    }

    #[test]
    fn request_falls_back_to_generated_content() {
        let (invoices, settings, renderer) = fixture();
        let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
        let mut campaign = campaign(&settings);
        campaign.toggle_client("Delta");
        campaign.next_step(&ctx).unwrap();
        campaign
            .update_draft(
                "Delta",
                DraftUpdate {
                    subject: Some(String::new()),
                    cc: Some(String::new()),
                    ..Default::default()
                },
            )
            .unwrap();
        campaign
            .add_attachment("Delta", Attachment::new("note.txt", Some("text/plain".to_string()), b"hi".to_vec()))
            .unwrap();

        let request = campaign
            .build_request("conn-1", &["Delta".to_string()], &ctx)
            .unwrap();
        let payload = &request.email_configs["Delta"];
        assert!(payload.subject.starts_with("Invoice notice - outstanding balance of"));
        assert_eq!(payload.cc, "finance@prezlab.example");
        assert_eq!(payload.recipient_email, "ap@delta.example");
        assert_eq!(payload.attachments[0].content, "aGk=");
        assert_eq!(request.invoice_data.len(), invoices.len());
        assert_eq!(request.global_email_config.smtp_port, 587);
    }
}
