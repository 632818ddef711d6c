use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{VcsError, VcsResult};

// ---------------------------------------------------------------------------
// Wireframe: the versioned payload
// ---------------------------------------------------------------------------

/// A document snapshot as stored in a version. The editor owns its schema, so
/// the version-control core only ever sees JSON.
pub type WireframeData = Value;

/// Typed view over a wireframe document. Fields the editor adds later are kept
/// in `extra` so a round trip through this type is lossless.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wireframe {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typography: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One block of a wireframe page (hero, features, footer, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub section_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Wireframe {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Append a section.
    pub fn with_section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    /// Convert to the JSON snapshot stored in versions.
    pub fn to_data(&self) -> VcsResult<WireframeData> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a stored snapshot.
    pub fn from_data(data: &WireframeData) -> VcsResult<Self> {
        validate_document(data)?;
        Ok(serde_json::from_value(data.clone())?)
    }
}

impl Section {
    pub fn new(id: impl Into<String>, section_type: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            section_type: Some(section_type.into()),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Check that a snapshot has the shape of a wireframe document.
///
/// Only the fields this crate reads are checked; everything else is opaque.
pub fn validate_document(data: &WireframeData) -> VcsResult<()> {
    let object = data
        .as_object()
        .ok_or_else(|| VcsError::Validation("document must be a JSON object".to_string()))?;

    if let Some(title) = object.get("title") {
        if !title.is_string() {
            return Err(VcsError::Validation("'title' must be a string".to_string()));
        }
    }

    if let Some(sections) = object.get("sections") {
        let sections = sections
            .as_array()
            .ok_or_else(|| VcsError::Validation("'sections' must be an array".to_string()))?;
        for (index, section) in sections.iter().enumerate() {
            if !section.is_object() {
                return Err(VcsError::Validation(format!(
                    "'sections[{}]' must be an object",
                    index
                )));
            }
        }
    }

    for key in ["colorScheme", "typography"] {
        if let Some(value) = object.get(key) {
            if !(value.is_object() || value.is_null()) {
                return Err(VcsError::Validation(format!("'{}' must be an object", key)));
            }
        }
    }

    Ok(())
}
