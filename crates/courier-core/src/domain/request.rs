//! Declarative request shapes and their resolution against a payload.
//!
//! A descriptor declares *how* its command maps onto the wire
//! (`PATCH /tasks/{id}` with a subset of fields as body); the pipeline
//! resolves that template against the concrete payload at Execute time.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::CorrelationId;

/// Header carrying the correlation id on every instruction request.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// Which part of the payload becomes the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyShape {
    None,
    /// The whole payload.
    Payload,
    /// An object holding only these top-level fields (missing ones are skipped).
    Fields(Vec<String>),
    /// The payload minus these top-level fields (typically the ones already in the path).
    Without(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTemplate {
    pub method: Method,
    /// Path with `{field}` placeholders, e.g. `/tasks/{id}/complete`.
    pub path: String,
    pub body: BodyShape,
}

impl RequestTemplate {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: BodyShape::None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path).with_body(BodyShape::Payload)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path).with_body(BodyShape::Payload)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path).with_body(BodyShape::Payload)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn with_body(mut self, body: BodyShape) -> Self {
        self.body = body;
        self
    }

    /// Resolve against the JSON form of a payload.
    pub fn resolve(&self, payload: &Value) -> Result<ResolvedRequest, ResolveError> {
        let path = interpolate(&self.path, payload)?;
        let body = match &self.body {
            BodyShape::None => None,
            BodyShape::Payload => Some(payload.clone()),
            BodyShape::Fields(fields) => {
                let object = as_object(payload)?;
                let picked: Map<String, Value> = fields
                    .iter()
                    .filter_map(|f| object.get(f).map(|v| (f.clone(), v.clone())))
                    .collect();
                Some(Value::Object(picked))
            }
            BodyShape::Without(fields) => {
                let mut object = as_object(payload)?.clone();
                for f in fields {
                    object.remove(f);
                }
                Some(Value::Object(object))
            }
        };
        Ok(ResolvedRequest {
            method: self.method,
            path,
            body,
        })
    }
}

/// A concrete request, ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    pub method: Method,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ResolvedRequest {
    /// Headers this request carries on the wire. Retries send the same ones.
    pub fn headers(&self, correlation_id: CorrelationId) -> Vec<(&'static str, String)> {
        vec![(CORRELATION_HEADER, correlation_id.to_string())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("payload has no field '{0}' required by the request path")]
    MissingField(String),

    #[error("payload field '{0}' cannot be placed in a request path")]
    InvalidField(String),

    #[error("payload must be a JSON object to shape the request body")]
    NotAnObject,

    #[error("unterminated placeholder in request path '{0}'")]
    UnterminatedPlaceholder(String),

    #[error("payload could not be encoded: {0}")]
    Encode(String),
}

fn as_object(payload: &Value) -> Result<&Map<String, Value>, ResolveError> {
    payload.as_object().ok_or(ResolveError::NotAnObject)
}

fn interpolate(template: &str, payload: &Value) -> Result<String, ResolveError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| ResolveError::UnterminatedPlaceholder(template.to_string()))?;
        let field = &after[..end];
        let value = payload
            .get(field)
            .ok_or_else(|| ResolveError::MissingField(field.to_string()))?;
        match value {
            Value::String(s) => out.push_str(s),
            Value::Number(n) => out.push_str(&n.to_string()),
            Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            _ => return Err(ResolveError::InvalidField(field.to_string())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
