use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub plan_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UrlResponse {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ChangeResponse {
    pub success: bool,
    pub message: String,
}

impl ChangeResponse {
    pub fn done(message: impl Into<String>) -> Self {
        ChangeResponse {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
}
