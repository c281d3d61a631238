//! # Alert Payload
//!
//! Serde model of a single Streamloots alert. Every field is optional, text
//! fields accept any JSON value and list fields accept anything at all: a
//! non-array list reads as absent and entries that are not objects are
//! skipped. A missing or retyped field never fails the whole payload.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// Failures while decoding or extracting from a single feed message.
///
/// These are per-message errors: the connector logs them with the raw line and
/// moves on to the next message.
#[derive(Debug, Error)]
pub enum InterpretError {
    #[error("Payload is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("Payload does not have the alert shape: {0}")]
    Shape(#[source] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Vote alert has no redeem field labelled \"Message\"")]
    MissingMessageField,

    #[error("Vote count {0} is too large")]
    VoteOverflow(String),
}

/// One entry of `redeemFields`, a label/value pair filled in by the viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RedeemField {
    #[serde(default, deserialize_with = "lenient_text")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub value: Option<String>,
}

/// One entry of `fields`, a name/value pair describing the redemption.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NamedField {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub value: Option<String>,
}

/// A decoded alert. Lives for one parse cycle.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub redeem_fields: Option<Vec<RedeemField>>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub fields: Option<Vec<NamedField>>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub message: Option<String>,
    /// Kept as raw JSON; only `settings.data.isSubscriptionAlert` is read.
    #[serde(default)]
    pub settings: Option<Value>,
}

impl AlertPayload {
    /// Decodes one framed feed line.
    ///
    /// The feed wraps alerts as `{"data": {...}}`; a bare alert object is
    /// accepted as well. When the inner object has no `settings`, the
    /// envelope's `settings` are used.
    pub fn from_line(line: &str) -> Result<Self, InterpretError> {
        let root: Value = serde_json::from_str(line).map_err(InterpretError::Syntax)?;
        let Value::Object(mut envelope) = root else {
            return Err(InterpretError::NotAnObject);
        };

        let alert: Map<String, Value> = match envelope.remove("data") {
            Some(Value::Object(mut inner)) => {
                if !inner.contains_key("settings") {
                    if let Some(settings) = envelope.remove("settings") {
                        inner.insert("settings".to_string(), settings);
                    }
                }
                inner
            }
            Some(other) => {
                // `data` is not the envelope here; leave it where it was.
                envelope.insert("data".to_string(), other);
                envelope
            }
            None => envelope,
        };

        serde_json::from_value(Value::Object(alert)).map_err(InterpretError::Shape)
    }

    /// Value of the first `fields` entry named `username`, or an empty string.
    pub fn username(&self) -> String {
        self.fields
            .iter()
            .flatten()
            .find(|field| field.name.as_deref() == Some("username"))
            .and_then(|field| field.value.clone())
            .unwrap_or_default()
    }

    /// Whether `settings.data.isSubscriptionAlert` is set to a truthy value.
    pub fn is_subscription_alert(&self) -> bool {
        self.settings
            .as_ref()
            .and_then(|settings| settings.pointer("/data/isSubscriptionAlert"))
            .is_some_and(is_truthy)
    }
}

/// Truthiness the way the alert producer means it: `false`, `0`, `""`, empty
/// containers and `null` are all "not set".
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Accepts any JSON value where text is expected. Strings pass through,
/// `null` becomes `None`, other scalars are rendered as JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

/// Accepts any JSON value where a list of objects is expected. Anything but
/// an array becomes `None`; array entries that do not decode as `T` are dropped.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(None);
    };
    Ok(Some(
        items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
    ))
}
