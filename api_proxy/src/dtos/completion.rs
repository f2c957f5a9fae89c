use common::error::{AppError, Res};
use serde::Deserialize;
use serde_json::{Map, Value, json};

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub messages: Option<Vec<Value>>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Validates the request and builds the chat completion body.
    ///
    /// Only `model`, `messages`, `temperature` and `max_tokens` are forwarded.
    pub fn into_upstream_body(self) -> Res<Value> {
        let model = self
            .model
            .filter(|model| !model.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing required field: model".to_string()))?;
        let messages = self
            .messages
            .filter(|messages| !messages.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing required field: messages".to_string()))?;

        let mut body = Map::new();
        body.insert("model".to_string(), json!(model));
        body.insert("messages".to_string(), Value::Array(messages));
        if let Some(temperature) = self.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = self.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }
        Ok(Value::Object(body))
    }
}
