use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 催款邮件模板档位 (措辞逐级加重)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateTier {
    Initial,
    Second,
    Final,
}

impl TemplateTier {
    /// 按客户最大逾期天数选档: >30 final, >15 second, 其余 initial
    pub fn for_max_days(max_days: u32) -> Self {
        if max_days > 30 {
            TemplateTier::Final
        } else if max_days > 15 {
            TemplateTier::Second
        } else {
            TemplateTier::Initial
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateTier::Initial => "initial",
            TemplateTier::Second => "second",
            TemplateTier::Final => "final",
        }
    }
}

/// 全局模板选择: auto 按严重程度选档, 否则对所有客户统一覆盖
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateChoice {
    #[default]
    Auto,
    Initial,
    Second,
    Final,
}

impl TemplateChoice {
    pub fn resolve(&self, max_days: u32) -> TemplateTier {
        match self {
            TemplateChoice::Auto => TemplateTier::for_max_days(max_days),
            TemplateChoice::Initial => TemplateTier::Initial,
            TemplateChoice::Second => TemplateTier::Second,
            TemplateChoice::Final => TemplateTier::Final,
        }
    }
}

impl From<TemplateTier> for TemplateChoice {
    fn from(tier: TemplateTier) -> Self {
        match tier {
            TemplateTier::Initial => TemplateChoice::Initial,
            TemplateTier::Second => TemplateChoice::Second,
            TemplateTier::Final => TemplateChoice::Final,
        }
    }
}

/// 向导步骤
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CampaignStep {
    SelectClients,
    Customize,
    Review,
}

impl CampaignStep {
    pub fn number(&self) -> u8 {
        match self {
            CampaignStep::SelectClients => 1,
            CampaignStep::Customize => 2,
            CampaignStep::Review => 3,
        }
    }
}

/// 用户附加的文件 (尚未上传)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, content_type: Option<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type,
            data,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self::new(file_name, None, data))
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// 单个客户的待发邮件草稿
#[derive(Debug, Clone, PartialEq)]
pub struct EmailDraft {
    pub subject: String,
    /// 正文, 含 HTML 发票表格片段
    pub body: String,
    pub recipient_email: String,
    pub cc: String,
    pub attachments: Vec<Attachment>,
    pub template: TemplateTier,
}

/// 草稿编辑 (None 表示不修改)
#[derive(Debug, Clone, Default)]
pub struct DraftUpdate {
    pub subject: Option<String>,
    pub body: Option<String>,
    pub recipient_email: Option<String>,
    pub cc: Option<String>,
}

impl DraftUpdate {
    pub fn apply_to(self, draft: &mut EmailDraft) {
        if let Some(v) = self.subject {
            draft.subject = v;
        }
        if let Some(v) = self.body {
            draft.body = v;
        }
        if let Some(v) = self.recipient_email {
            draft.recipient_email = v;
        }
        if let Some(v) = self.cc {
            draft.cc = v;
        }
    }
}

/// 向导全局默认值
#[derive(Debug, Clone, PartialEq)]
pub struct CampaignDefaults {
    pub template: TemplateChoice,
    pub cc_list: String,
    pub enable_pdf_attachment: bool,
}

impl CampaignDefaults {
    pub fn with_cc(cc_list: impl Into<String>) -> Self {
        Self {
            template: TemplateChoice::Auto,
            cc_list: cc_list.into(),
            enable_pdf_attachment: true,
        }
    }
}

impl Default for CampaignDefaults {
    fn default() -> Self {
        Self::with_cc("")
    }
}

/// 批量发送结果 (同时是后端 /api/email/send 的响应体)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendOutcome {
    pub success: bool,
    pub successful_sends: usize,
    pub failed_sends: usize,
    pub failed_clients: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    /// 所有选中客户均记为失败, 每条附带原因
    pub fn all_failed(clients: &[String], error: impl Into<String>, reason: &str) -> Self {
        Self {
            success: false,
            successful_sends: 0,
            failed_sends: clients.len(),
            failed_clients: clients
                .iter()
                .map(|c| format!("{} ({})", c, reason))
                .collect(),
            error: Some(error.into()),
        }
    }
}
