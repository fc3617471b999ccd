pub mod aggregation;
pub mod campaign;
pub mod currency;
pub mod progress;
pub mod report;
pub mod session;
pub mod templates;

pub use campaign::{CampaignContext, EmailCampaign};
pub use currency::CurrencyService;
pub use progress::{LoadingProgress, ProgressView};
pub use report::{DocumentRenderer, PdfRenderer, ReportArtifact, ReportGenerator, TextRenderer};
pub use session::SessionStore;
pub use templates::{RenderedEmail, ReminderMessage, TemplateRenderer};
