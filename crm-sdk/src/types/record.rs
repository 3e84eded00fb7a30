//! Record types exchanged with the remote CRM service.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Wire representation of one record sent to create/update.
///
/// `fields` holds every field except the identifier, flattened next to `type` and `Id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SObjectRecord {
    #[serde(rename = "type")]
    pub sobject_type: String,
    #[serde(rename = "Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// A typed record stored by the remote service.
///
/// Implementors own their identifier; the session only reads it to choose between
/// create and update, and writes it back after a successful save.
pub trait SObject: Serialize + DeserializeOwned + Send + Sync {
    /// Remote object type name, e.g. `"Contact"`.
    const SOBJECT_TYPE: &'static str;

    fn id(&self) -> Option<&str>;

    fn set_id(&mut self, id: Option<String>);

    /// True until the remote service has assigned an identifier.
    fn is_new(&self) -> bool {
        self.id().is_none_or(str::is_empty)
    }

    /// Encode into the wire representation.
    fn to_record(&self) -> Result<SObjectRecord> {
        let serde_json::Value::Object(mut fields) = serde_json::to_value(self)? else {
            return Err(Error::Protocol(format!(
                "{} does not serialize to a JSON object",
                Self::SOBJECT_TYPE
            )));
        };
        fields.remove("Id");
        fields.remove("attributes");

        Ok(SObjectRecord {
            sobject_type: Self::SOBJECT_TYPE.to_string(),
            id: self.id().filter(|id| !id.is_empty()).map(str::to_string),
            fields,
        })
    }
}

/// Contact record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Contact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
}

impl Contact {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: last_name.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl SObject for Contact {
    const SOBJECT_TYPE: &'static str = "Contact";

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn set_id(&mut self, id: Option<String>) {
        self.id = id;
    }
}
