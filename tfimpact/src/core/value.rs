//! Typed input values for generated Terraform configuration.
//!
//! Every value renders through `serde_json`, whose output is a valid HCL
//! expression for all of these shapes, so quoting of nested strings never has
//! to be done by hand. HCL reads quoted strings as templates, so `${` and `%{`
//! are escaped afterwards to keep them literal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A variable value passed into a generated module call or `.tfvars` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TfValue {
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<TfValue>),
    Map(BTreeMap<String, TfValue>),
}

impl TfValue {
    /// Build a map value from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<TfValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        TfValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a list value.
    pub fn list<V, I>(items: I) -> Self
    where
        V: Into<TfValue>,
        I: IntoIterator<Item = V>,
    {
        TfValue::List(items.into_iter().map(Into::into).collect())
    }

    /// Render as an HCL expression: strings quoted and escaped, booleans
    /// lowercase, numbers bare, lists and maps in JSON form.
    pub fn render(&self) -> String {
        match self {
            TfValue::Bool(b) => b.to_string(),
            TfValue::Number(n) => n.to_string(),
            TfValue::String(_) | TfValue::List(_) | TfValue::Map(_) => {
                escape_template_markers(&self.to_json().to_string())
            }
        }
    }

    /// JSON form, as found in `terraform show -json` planned values.
    pub fn to_json(&self) -> Value {
        match self {
            TfValue::Bool(b) => Value::Bool(*b),
            TfValue::Number(n) => Value::Number(n.clone()),
            TfValue::String(s) => Value::String(s.clone()),
            TfValue::List(items) => Value::Array(items.iter().map(TfValue::to_json).collect()),
            TfValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for TfValue {
    fn from(value: &str) -> Self {
        TfValue::String(value.to_string())
    }
}

impl From<String> for TfValue {
    fn from(value: String) -> Self {
        TfValue::String(value)
    }
}

impl From<bool> for TfValue {
    fn from(value: bool) -> Self {
        TfValue::Bool(value)
    }
}

impl From<i64> for TfValue {
    fn from(value: i64) -> Self {
        TfValue::Number(value.into())
    }
}

impl From<u32> for TfValue {
    fn from(value: u32) -> Self {
        TfValue::Number(value.into())
    }
}

/// `${` and `%{` only occur inside JSON strings, so the whole text can be escaped.
fn escape_template_markers(json: &str) -> String {
    json.replace("${", "$${").replace("%{", "%%{")
}

/// Ordered variable assignments, rendered one per line.
pub type Variables = BTreeMap<String, TfValue>;

/// Render `key = value` lines, as used by `terraform.tfvars` and module blocks.
pub fn render_assignments(variables: &Variables, indent: &str) -> String {
    let mut out = String::new();
    for (name, value) in variables {
        out.push_str(indent);
        out.push_str(name);
        out.push_str(" = ");
        out.push_str(&value.render());
        out.push('\n');
    }
    out
}
