pub mod campaign;
pub mod connection;
pub mod invoice;
pub mod report;
pub mod settings;

pub use campaign::{
    Attachment, CampaignDefaults, CampaignStep, DraftUpdate, EmailDraft, SendOutcome,
    TemplateChoice, TemplateTier,
};
pub use connection::{
    ConnectionDetails, ConnectionParams, ConnectionSnapshot, ConnectionState, ConnectionStatus,
};
pub use invoice::{Invoice, SeverityBucket, DEFAULT_CURRENCY};
pub use report::{ClientSummary, PriorityClient, ReportData, ReportFormat};
pub use settings::{
    DisplayCurrency, EmailConfig, EmailConfigUpdate, SecuritySettings, SecuritySettingsUpdate,
    Settings,
};
