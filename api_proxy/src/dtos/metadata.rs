use common::error::{AppError, Res};
use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct MetadataRequest {
    pub endpoint: Option<String>,
    pub params: Option<Map<String, Value>>,
}

/// A validated metadata lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataLookup {
    pub endpoint: String,
    pub params: Map<String, Value>,
}

impl MetadataRequest {
    pub fn validate(self) -> Res<MetadataLookup> {
        let endpoint = self
            .endpoint
            .map(|endpoint| endpoint.trim().trim_start_matches('/').to_string())
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| AppError::BadRequest("Missing required field: endpoint".to_string()))?;

        if endpoint.contains("://")
            || endpoint.split('/').any(|segment| segment == "..")
            || endpoint.contains(['?', '#', '\\'])
        {
            return Err(AppError::BadRequest(
                "Endpoint must be a relative path; pass query values in params".to_string(),
            ));
        }

        let mut params = self.params.unwrap_or_default();
        params.retain(|_, value| !value.is_null());
        if let Some((name, _)) = params
            .iter()
            .find(|(_, value)| value.is_array() || value.is_object())
        {
            return Err(AppError::BadRequest(format!(
                "Parameter '{}' must be a string, number or boolean",
                name
            )));
        }

        Ok(MetadataLookup { endpoint, params })
    }
}

impl MetadataLookup {
    pub fn query(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validate(value: Value) -> Res<MetadataLookup> {
        serde_json::from_value::<MetadataRequest>(value)
            .unwrap()
            .validate()
    }

    #[test]
    fn accepts_relative_endpoints_with_scalar_params() {
        let lookup = validate(json!({
            "endpoint": "/search/movie",
            "params": { "query": "Arrival", "page": 1, "include_adult": false, "region": null }
        }))
        .unwrap();

        assert_eq!(lookup.endpoint, "search/movie");
        let mut query = lookup.query();
        query.sort();
        assert_eq!(
            query,
            vec![
                ("include_adult".to_string(), "false".to_string()),
                ("page".to_string(), "1".to_string()),
                ("query".to_string(), "Arrival".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_missing_or_escaping_endpoints() {
        for body in [
            json!({}),
            json!({ "endpoint": "  " }),
            json!({ "endpoint": "https://evil.example/steal" }),
            json!({ "endpoint": "movie/../../admin" }),
            json!({ "endpoint": "search/movie?query=x" }),
        ] {
            assert!(matches!(validate(body), Err(AppError::BadRequest(_))));
        }
    }

    #[test]
    fn rejects_nested_params() {
        let result = validate(json!({ "endpoint": "volumes", "params": { "q": ["a", "b"] } }));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }
}
