pub mod client;
pub mod types;

pub use client::BackendClient;
pub use types::{
    AckResponse, AttachmentPayload, AutomatedReportsConfig, ClientEmailPayload, ConnectResponse,
    GlobalEmailPayload, InvoiceListResponse, ReportConnection, ReportEmailSettings, ReportSummary,
    ReportTestResponse, SendEmailsRequest, TestEmailRequest,
};
