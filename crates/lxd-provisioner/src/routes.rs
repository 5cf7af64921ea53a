//! Configuration-driven request building.
//!
//! Each remote action maps to a [`RouteTemplate`]: a method, a path template
//! and an optional JSON body template. Templates reference instance fields
//! through placeholders:
//!
//! | Placeholder     | Value                          |
//! |-----------------|--------------------------------|
//! | `{name}`        | container name                 |
//! | `{cores}`       | CPU cores (number)             |
//! | `{memory}`      | memory in GB (number)          |
//! | `{storage}`     | storage in GB (number)         |
//! | `{username}`    | service username               |
//! | `{password}`    | new password                   |
//! | `{extra.KEY}`   | pass-through host parameter    |
//!
//! A body string consisting of a single numeric placeholder is replaced by a
//! JSON number; placeholders embedded in longer strings are interpolated as
//! text (`"{memory}GB"` becomes `"4GB"`).

use crate::models::{HttpMethod, RemoteRequest, ResponseShape};
use crate::resolver::RequestBuilder;
use crate::Result;
use lxd_core::types::{is_sensitive_key, InstanceSpec, LifecycleAction};
use lxd_core::Error;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;

const EXTRA_PREFIX: &str = "extra.";
const KNOWN_PLACEHOLDERS: &[&str] = &["name", "cores", "memory", "storage", "username", "password"];

/// Request template for one action.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RouteTemplate {
    /// HTTP method
    pub method: HttpMethod,
    /// Path template, relative to the endpoint base URL
    pub path: String,
    /// JSON body template
    #[serde(default)]
    pub body: Option<Value>,
    /// Expected response shape
    #[serde(default)]
    pub response: ResponseShape,
}

impl RouteTemplate {
    /// Create a template without a body.
    #[must_use]
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            response: ResponseShape::Ignore,
        }
    }

    /// Attach a body template.
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Expect a JSON response, optionally narrowed by a JSON pointer.
    #[must_use]
    pub fn expecting_json(mut self, pointer: Option<&str>) -> Self {
        self.response = ResponseShape::Json {
            pointer: pointer.map(str::to_string),
        };
        self
    }

    fn validate(&self, action: &str) -> Result<()> {
        if self.path.contains("..") || self.path.contains("://") {
            return Err(Error::ConfigError(format!(
                "route `{action}` path `{}` must stay relative to the endpoint",
                self.path
            )));
        }
        for name in placeholders(&self.path).into_iter().map(|p| p.name) {
            check_placeholder(action, name)?;
            if is_sensitive_key(name) {
                return Err(Error::ConfigError(format!(
                    "route `{action}` must not put secret `{{{name}}}` in the path"
                )));
            }
        }
        if let Some(body) = &self.body {
            validate_body(action, body)?;
        }
        if let ResponseShape::Json {
            pointer: Some(pointer),
        } = &self.response
        {
            if !pointer.is_empty() && !pointer.starts_with('/') {
                return Err(Error::ConfigError(format!(
                    "route `{action}` response pointer `{pointer}` must start with `/`"
                )));
            }
        }
        Ok(())
    }

    fn render(&self, action: LifecycleAction, spec: &InstanceSpec) -> Result<RemoteRequest> {
        let path = render_path(&self.path, action, spec)?;
        let body = self
            .body
            .as_ref()
            .map(|template| render_value(template, action, spec))
            .transpose()?;

        Ok(RemoteRequest {
            action,
            method: self.method,
            path,
            body,
            response: self.response.clone(),
        })
    }
}

/// Routes for every remote action.
///
/// All nine remote actions must be configured; `renew` never reaches the
/// remote API and has no route.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RouteTable {
    /// Provision a container
    pub create: RouteTemplate,
    /// Stop a container
    pub suspend: RouteTemplate,
    /// Start a suspended container
    pub unsuspend: RouteTemplate,
    /// Delete a container
    pub terminate: RouteTemplate,
    /// Resize a container
    pub change_plan: RouteTemplate,
    /// Reset the service password
    pub change_password: RouteTemplate,
    /// Check connectivity and credentials
    pub test_connection: RouteTemplate,
    /// Fetch usage figures
    pub get_usage: RouteTemplate,
    /// Fetch runtime statistics
    pub get_stats: RouteTemplate,
}

impl RouteTable {
    /// Parse and validate a route table from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the JSON is malformed, a route is
    /// missing, or a template is invalid.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid route table: {e}")))?;
        table.validate()?;
        Ok(table)
    }

    /// Returns the route for an action, `None` for local actions.
    #[must_use]
    pub const fn route(&self, action: LifecycleAction) -> Option<&RouteTemplate> {
        match action {
            LifecycleAction::Create => Some(&self.create),
            LifecycleAction::Suspend => Some(&self.suspend),
            LifecycleAction::Unsuspend => Some(&self.unsuspend),
            LifecycleAction::Terminate => Some(&self.terminate),
            LifecycleAction::ChangePlan => Some(&self.change_plan),
            LifecycleAction::ChangePassword => Some(&self.change_password),
            LifecycleAction::TestConnection => Some(&self.test_connection),
            LifecycleAction::GetUsage => Some(&self.get_usage),
            LifecycleAction::GetStats => Some(&self.get_stats),
            LifecycleAction::Renew => None,
        }
    }

    /// Check every template for unknown placeholders and escaping paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first invalid template.
    pub fn validate(&self) -> Result<()> {
        for action in LifecycleAction::all() {
            if let Some(route) = self.route(*action) {
                route.validate(action.name())?;
            }
        }
        Ok(())
    }
}

impl RequestBuilder for RouteTable {
    fn build(&self, action: LifecycleAction, spec: &InstanceSpec) -> Result<RemoteRequest> {
        let route = self.route(action).ok_or_else(|| {
            Error::InvalidInput(format!("{action} does not use the remote API"))
        })?;
        route.render(action, spec)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placeholder<'a> {
    start: usize,
    end: usize,
    name: &'a str,
}

fn placeholders(template: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut offset = 0;

    while let Some(open) = template[offset..].find('{') {
        let start = offset + open;
        let Some(close) = template[start..].find('}') else {
            break;
        };
        let end = start + close + 1;
        let name = &template[start + 1..end - 1];

        let is_name = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
        if is_name {
            found.push(Placeholder { start, end, name });
            offset = end;
        } else {
            offset = start + 1;
        }
    }

    found
}

fn check_placeholder(action: &str, name: &str) -> Result<()> {
    let known = KNOWN_PLACEHOLDERS.contains(&name)
        || name
            .strip_prefix(EXTRA_PREFIX)
            .is_some_and(|key| !key.is_empty());
    if known {
        Ok(())
    } else {
        Err(Error::ConfigError(format!(
            "route `{action}` uses unknown placeholder `{{{name}}}`"
        )))
    }
}

fn validate_body(action: &str, value: &Value) -> Result<()> {
    match value {
        Value::String(s) => {
            for placeholder in placeholders(s) {
                check_placeholder(action, placeholder.name)?;
            }
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|v| validate_body(action, v)),
        Value::Object(map) => map.values().try_for_each(|v| validate_body(action, v)),
        _ => Ok(()),
    }
}

enum FieldValue {
    Number(u32),
    Text(String),
}

impl FieldValue {
    fn into_text(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }

    fn into_json(self) -> Value {
        match self {
            Self::Number(n) => Value::from(n),
            Self::Text(s) => Value::String(s),
        }
    }
}

fn lookup(name: &str, action: LifecycleAction, spec: &InstanceSpec) -> Result<FieldValue> {
    let value = match name {
        "name" => spec.name.clone().map(FieldValue::Text),
        "cores" => spec.cores.map(FieldValue::Number),
        "memory" => spec.memory_gb.map(FieldValue::Number),
        "storage" => spec.storage_gb.map(FieldValue::Number),
        "username" => spec.username.clone().map(FieldValue::Text),
        "password" => spec
            .password
            .as_ref()
            .map(|p| FieldValue::Text(p.expose_secret().to_string())),
        other => other
            .strip_prefix(EXTRA_PREFIX)
            .and_then(|key| spec.extra.get(key))
            .cloned()
            .map(FieldValue::Text),
    };

    value.ok_or_else(|| {
        let key = if name == "name" { "hostname" } else { name };
        Error::InvalidInput(format!("{key} is required for the {action} action"))
    })
}

fn interpolate(template: &str, action: LifecycleAction, spec: &InstanceSpec) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for placeholder in placeholders(template) {
        rendered.push_str(&template[last..placeholder.start]);
        rendered.push_str(&lookup(placeholder.name, action, spec)?.into_text());
        last = placeholder.end;
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

fn render_path(template: &str, action: LifecycleAction, spec: &InstanceSpec) -> Result<String> {
    for placeholder in placeholders(template) {
        let value = lookup(placeholder.name, action, spec)?.into_text();
        let unsafe_segment = value.is_empty()
            || value == ".."
            || value.chars().any(|c| {
                c.is_whitespace() || matches!(c, '/' | '?' | '#' | '%' | '\\' | ':')
            });
        if unsafe_segment {
            return Err(Error::InvalidInput(format!(
                "{} `{value}` cannot be used in a request path",
                placeholder.name
            )));
        }
    }
    let path = interpolate(template, action, spec)?;
    Ok(path.trim_start_matches('/').to_string())
}

fn render_value(template: &Value, action: LifecycleAction, spec: &InstanceSpec) -> Result<Value> {
    match template {
        Value::String(s) => {
            let found = placeholders(s);
            match found.as_slice() {
                [only] if only.start == 0 && only.end == s.len() => {
                    Ok(lookup(only.name, action, spec)?.into_json())
                }
                [] => Ok(template.clone()),
                _ => interpolate(s, action, spec).map(Value::String),
            }
        }
        Value::Array(items) => items
            .iter()
            .map(|item| render_value(item, action, spec))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| -> Result<(String, Value)> {
                Ok((key.clone(), render_value(value, action, spec)?))
            })
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
        _ => Ok(template.clone()),
    }
}
