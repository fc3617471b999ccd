mod common;

use common::{backend, invoice_json, overdue_invoices};
use invoice_followup::config::WorkflowConfig;
use invoice_followup::models::{
    Attachment, CampaignStep, DraftUpdate, Invoice, Settings, TemplateChoice, TemplateTier,
};
use invoice_followup::service::{CampaignContext, CurrencyService, EmailCampaign, TemplateRenderer};
use serde_json::json;
use std::time::{Duration, Instant};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn invoices() -> Vec<Invoice> {
    serde_json::from_value(json!(overdue_invoices())).unwrap()
}

fn settings() -> Settings {
    let mut settings = Settings::default();
    settings.email_config.sender_email = "ar@prezlab.example".to_string();
    settings.email_config.sender_password = "app-password".to_string();
    settings.email_config.cc_list = "finance@prezlab.example".to_string();
    settings
}

fn renderer() -> TemplateRenderer {
    TemplateRenderer::new(CurrencyService::new()).unwrap()
}

#[tokio::test]
async fn send_without_connection_fails_every_client_offline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/email/send"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (invoices, settings, renderer) = (invoices(), settings(), renderer());
    let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
    let mut campaign = EmailCampaign::new(&settings, &WorkflowConfig::immediate());
    campaign.select_all(&["Acme".to_string(), "Beta".to_string(), "Gamma".to_string()]);
    campaign.next_step(&ctx).unwrap();

    let outcome = campaign.send(&backend(&server), None, &ctx).await.unwrap();

    assert!(!outcome.success);
    assert_eq!(outcome.successful_sends, 0);
    assert_eq!(outcome.failed_sends, 3);
    assert_eq!(
        outcome.failed_clients,
        vec!["Acme (no connection)", "Beta (no connection)", "Gamma (no connection)"]
    );
    assert_eq!(
        outcome.error.as_deref(),
        Some("No active connection found. Please reconnect to Odoo.")
    );
    // 状态保持不变
    assert_eq!(campaign.step(), CampaignStep::Customize);
    assert_eq!(campaign.selected().len(), 3);
}

#[tokio::test]
async fn successful_send_posts_batch_and_resets_wizard() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/email/send"))
        .and(body_partial_json(json!({
            "connectionId": "finance_prezlab-prod",
            "selectedClients": ["Acme", "Gamma"],
            "emailConfigs": {
                "Acme": {
                    "recipientEmail": "ap@acme.example",
                    "cc": "finance@prezlab.example",
                    "attachments": [{"name": "statement.txt", "size": 5, "content": "aGVsbG8="}]
                },
                "Gamma": {"recipientEmail": "collections@gamma.example"}
            },
            "globalEmailConfig": {
                "template": "auto",
                "enablePdfAttachment": false,
                "senderEmail": "ar@prezlab.example",
                "smtpServer": "smtp.gmail.com",
                "smtpPort": 587
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "successfulSends": 1,
            "failedSends": 1,
            "failedClients": ["Gamma (SMTP rejected recipient)"]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (invoices, settings, renderer) = (invoices(), settings(), renderer());
    let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
    let workflow = WorkflowConfig {
        campaign_reset_ms: 50,
        success_notice_ms: 5000,
        ..WorkflowConfig::immediate()
    };
    let mut campaign = EmailCampaign::new(&settings, &workflow);
    campaign.toggle_client("Acme");
    campaign.toggle_client("Gamma");
    campaign.next_step(&ctx).unwrap();
    campaign.set_pdf_attachment(false);
    campaign
        .add_attachment("Acme", Attachment::new("statement.txt", None, b"hello".to_vec()))
        .unwrap();
    campaign
        .update_draft(
            "Gamma",
            DraftUpdate {
                recipient_email: Some("collections@gamma.example".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    campaign.next_step(&ctx).unwrap();

    let outcome = campaign
        .send(&backend(&server), Some("finance_prezlab-prod"), &ctx)
        .await
        .unwrap();

    assert_eq!(outcome.successful_sends, 1);
    assert_eq!(outcome.failed_clients, vec!["Gamma (SMTP rejected recipient)"]);
    assert!(campaign.success_notice_visible(Instant::now()));
    assert_eq!(campaign.step(), CampaignStep::Review);

    campaign.settle().await;
    assert_eq!(campaign.step(), CampaignStep::SelectClients);
    assert!(campaign.selected().is_empty());
    assert!(campaign.drafts().is_empty());
    assert!(campaign.last_result().is_none());
    assert!(campaign.success_notice_visible(Instant::now()));
    assert!(!campaign.success_notice_visible(Instant::now() + Duration::from_secs(6)));
}

#[tokio::test]
async fn zero_successful_sends_do_not_reset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/email/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "successfulSends": 0,
            "failedSends": 1,
            "failedClients": ["Beta (missing email)"]
        })))
        .mount(&server)
        .await;

    let (invoices, settings, renderer) = (invoices(), settings(), renderer());
    let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
    let mut campaign = EmailCampaign::new(&settings, &WorkflowConfig::immediate());
    campaign.toggle_client("Beta");
    campaign.next_step(&ctx).unwrap();

    campaign
        .send(&backend(&server), Some("finance_prezlab-prod"), &ctx)
        .await
        .unwrap();
    campaign.settle().await;

    assert_eq!(campaign.step(), CampaignStep::Customize);
    assert!(campaign.is_selected("Beta"));
    assert_eq!(campaign.last_result().unwrap().failed_sends, 1);
    assert!(!campaign.success_notice_visible(Instant::now()));
}

#[tokio::test]
async fn transport_failure_marks_all_clients_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/email/send"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let (invoices, settings, renderer) = (invoices(), settings(), renderer());
    let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
    let mut campaign = EmailCampaign::new(&settings, &WorkflowConfig::immediate());
    campaign.select_all(&["Acme".to_string(), "Beta".to_string()]);
    campaign.next_step(&ctx).unwrap();

    let outcome = campaign
        .send(&backend(&server), Some("finance_prezlab-prod"), &ctx)
        .await
        .unwrap();

    assert_eq!(outcome.failed_sends, 2);
    assert_eq!(
        outcome.failed_clients,
        vec![
            "Acme (API error: HTTP error! status: 502)",
            "Beta (API error: HTTP error! status: 502)"
        ]
    );
    assert!(!campaign.success_notice_visible(Instant::now()));
    assert_eq!(campaign.step(), CampaignStep::Customize);
}

#[tokio::test]
async fn override_applies_to_every_draft() {
    let (invoices, settings, renderer) = (invoices(), settings(), renderer());
    let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
    let mut campaign = EmailCampaign::new(&settings, &WorkflowConfig::immediate());
    campaign.set_template_override(TemplateChoice::Second, &ctx).unwrap();
    campaign.select_all(&["Acme".to_string(), "Beta".to_string()]);
    campaign.next_step(&ctx).unwrap();

    assert!(campaign
        .drafts()
        .values()
        .all(|draft| draft.template == TemplateTier::Second));
}

#[test]
fn acme_final_beta_initial() {
    let invoices: Vec<Invoice> = serde_json::from_value(json!([
        invoice_json(1, "Acme", 40, 100.0, "AED"),
        invoice_json(2, "Beta", 10, 100.0, "AED"),
    ]))
    .unwrap();
    let (settings, renderer) = (settings(), renderer());
    let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };

    let mut campaign = EmailCampaign::new(&settings, &WorkflowConfig::immediate());
    campaign.select_all(&["Acme".to_string(), "Beta".to_string()]);
    campaign.next_step(&ctx).unwrap();

    assert_eq!(campaign.draft("Acme").unwrap().template, TemplateTier::Final);
    assert_eq!(campaign.draft("Beta").unwrap().template, TemplateTier::Initial);
}

#[tokio::test]
async fn offline_retry_cancels_pending_reset() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/email/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "successfulSends": 1,
            "failedSends": 0,
            "failedClients": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (invoices, settings, renderer) = (invoices(), settings(), renderer());
    let ctx = CampaignContext { invoices: &invoices, settings: &settings, renderer: &renderer };
    let workflow = WorkflowConfig {
        campaign_reset_ms: 3000,
        success_notice_ms: 5000,
        ..WorkflowConfig::immediate()
    };
    let mut campaign = EmailCampaign::new(&settings, &workflow);
    campaign.toggle_client("Acme");
    campaign.next_step(&ctx).unwrap();
    campaign
        .send(&backend(&server), Some("finance_prezlab-prod"), &ctx)
        .await
        .unwrap();
    assert!(campaign.success_notice_visible(Instant::now()));

    // 重置前用户继续编辑并在离线时重发
    campaign.toggle_client("Beta");
    campaign.previous_step();
    campaign.next_step(&ctx).unwrap();
    let outcome = campaign.send(&backend(&server), None, &ctx).await.unwrap();
    assert_eq!(outcome.failed_sends, 2);

    campaign.tick(Instant::now() + Duration::from_secs(10));
    assert_eq!(campaign.step(), CampaignStep::Customize);
    assert!(campaign.is_selected("Acme"));
    assert!(campaign.is_selected("Beta"));
    assert_eq!(campaign.drafts().len(), 2);
    assert!(!campaign.success_notice_visible(Instant::now()));
}
