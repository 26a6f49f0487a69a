use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::eval::{Lookups, Value};

/// TLS details of the connection, when the request arrived over TLS.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TlsInfo {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub server_name: String,
}

/// One inbound request as handed over by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_proto")]
    pub proto: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub remote_ip: String,
    #[serde(default)]
    pub tls: Option<TlsInfo>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: String,
}

/// Hook-level expectations about the request body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestShape {
    /// Overrides the `Content-Type` header when deciding how to read the body.
    pub content_type: Option<String>,
    /// Payload paths holding JSON documents encoded as strings.
    pub json_parameters: Vec<String>,
}

fn default_method() -> String {
    "POST".to_string()
}

fn default_proto() -> String {
    "HTTP/1.1".to_string()
}

impl RequestData {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn effective_content_type<'a>(
        &'a self,
        shape: Option<&'a RequestShape>,
    ) -> Option<&'a str> {
        shape
            .and_then(|s| s.content_type.as_deref())
            .or_else(|| self.header("content-type"))
    }

    /// Builds the case-insensitive maps read by `header`, `payload` and `param`.
    ///
    /// JSON bodies are flattened into dotted keys (`head_commit.id`,
    /// `commits.0.id`); any other body leaves the payload map empty.
    pub fn lookups(&self, shape: Option<&RequestShape>) -> Result<Lookups, String> {
        let mut lookups = Lookups::new();
        for (key, value) in &self.headers {
            lookups.insert_header(key, value.clone());
        }
        for (key, value) in &self.params {
            lookups.insert_param(key, value.clone());
        }

        let is_json = self
            .effective_content_type(shape)
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        if is_json && !self.payload.trim().is_empty() {
            let mut body: serde_json::Value = serde_json::from_str(&self.payload)
                .map_err(|e| format!("invalid JSON payload: {}", e))?;
            if let Some(shape) = shape {
                for path in &shape.json_parameters {
                    expand_json_parameter(&mut body, path)?;
                }
            }
            flatten("", &body, &mut lookups);
            debug!(
                content_type = ?self.effective_content_type(shape),
                "projected JSON payload"
            );
        }
        Ok(lookups)
    }

    /// The `request` variable.
    pub fn request_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("method".to_string(), Value::from(self.method.as_str()));
        map.insert("proto".to_string(), Value::from(self.proto.as_str()));
        map.insert("host".to_string(), Value::from(self.host.as_str()));
        map.insert("remote_ip".to_string(), Value::from(self.remote_ip.as_str()));
        if let Some(tls) = &self.tls {
            let mut info = BTreeMap::new();
            info.insert("version".to_string(), Value::from(tls.version.as_str()));
            info.insert(
                "server_name".to_string(),
                Value::from(tls.server_name.as_str()),
            );
            map.insert("tls".to_string(), Value::Map(info));
        }
        Value::Map(map)
    }

    pub fn headers_value(&self) -> Value {
        string_map(&self.headers)
    }

    pub fn params_value(&self) -> Value {
        string_map(&self.params)
    }
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Map(
        map.iter()
            .map(|(k, v)| (k.to_lowercase(), Value::from(v.as_str())))
            .collect(),
    )
}

fn expand_json_parameter(body: &mut serde_json::Value, path: &str) -> Result<(), String> {
    let pointer: String = path
        .split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect();
    // absent parameters are left for the rules to notice
    let Some(node) = body.pointer_mut(&pointer) else {
        return Ok(());
    };

    if let serde_json::Value::String(encoded) = node {
        let parsed = serde_json::from_str(encoded)
            .map_err(|e| format!("json parameter {:?} is not valid JSON: {}", path, e))?;
        *node = parsed;
    }
    Ok(())
}

fn flatten(prefix: &str, value: &serde_json::Value, lookups: &mut Lookups) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    match value {
        serde_json::Value::Object(map) => {
            if !prefix.is_empty() {
                lookups.insert_payload(prefix, value.to_string());
            }
            for (key, child) in map {
                flatten(&join(key), child, lookups);
            }
        }
        serde_json::Value::Array(items) => {
            if !prefix.is_empty() {
                lookups.insert_payload(prefix, value.to_string());
            }
            for (i, child) in items.iter().enumerate() {
                flatten(&join(&i.to_string()), child, lookups);
            }
        }
        serde_json::Value::String(s) => lookups.insert_payload(prefix, s.clone()),
        serde_json::Value::Null => lookups.insert_payload(prefix, ""),
        other => lookups.insert_payload(prefix, other.to_string()),
    }
}
