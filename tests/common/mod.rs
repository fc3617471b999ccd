#![allow(dead_code)]

use invoice_followup::config::{BackendConfig, WorkflowConfig};
use invoice_followup::models::ConnectionParams;
use invoice_followup::storage::LocalStorage;
use invoice_followup::{BackendClient, SessionStore};
use serde_json::{json, Value};
use std::path::Path;
use wiremock::MockServer;

pub fn invoice_json(id: i64, client: &str, days: u32, amount: f64, currency: &str) -> Value {
    json!({
        "id": id,
        "invoice_number": format!("INV/2024/{:04}", id),
        "invoice_date": "2024-01-01",
        "due_date": "2024-02-01",
        "days_overdue": days,
        "amount_due": amount,
        "currency_symbol": currency,
        "client_name": client,
        "client_email": format!("ap@{}.example", client.to_lowercase()),
        "company_name": "Prezlab FZ LLC",
        "origin": format!("S{:05}", id)
    })
}

pub fn overdue_invoices() -> Vec<Value> {
    vec![
        invoice_json(1, "Acme", 40, 1200.0, "AED"),
        invoice_json(2, "Acme", 12, 300.0, "AED"),
        invoice_json(3, "Beta", 10, 450.5, "USD"),
        invoice_json(4, "Gamma", 22, 980.0, "SAR"),
    ]
}

pub fn params() -> ConnectionParams {
    ConnectionParams {
        url: "https://erp.prezlab.example".to_string(),
        database: "prezlab-prod".to_string(),
        username: "finance".to_string(),
        password: "s3cret".to_string(),
    }
}

pub fn backend(server: &MockServer) -> BackendClient {
    BackendClient::new(&BackendConfig {
        base_url: server.uri(),
        timeout_secs: Some(5),
    })
    .unwrap()
}

pub fn store(server: &MockServer, dir: &Path) -> SessionStore {
    SessionStore::new(
        backend(server),
        LocalStorage::open(dir).unwrap(),
        WorkflowConfig::immediate(),
    )
}
