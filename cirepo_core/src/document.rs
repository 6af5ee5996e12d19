//! XML documents stored in the repository.
//!
//! Regular objects serialize to an `<object>` document. Bindings of one parent
//! share a `<bindings>` document, one `<binding>` element per child.

use crate::error::{Error, Result};
use crate::objects::{BindingInfo, ObjectInfo};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Serialize a value as an indented XML document with a declaration.
pub fn to_xml<T: Serialize>(value: &T) -> Result<String> {
    let mut body = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut body);
    serializer.indent(' ', 2);
    value
        .serialize(serializer)
        .map_err(|e| Error::xml(e.to_string()))?;

    let mut xml = String::with_capacity(XML_DECLARATION.len() + body.len() + 2);
    xml.push_str(XML_DECLARATION);
    xml.push('\n');
    xml.push_str(&body);
    xml.push('\n');
    Ok(xml)
}

pub fn from_xml<T: DeserializeOwned>(content: &str) -> Result<T> {
    quick_xml::de::from_str(content).map_err(|e| Error::xml(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "object")]
pub struct ObjectDocument {
    #[serde(rename = "@type")]
    pub object_type: String,
    #[serde(rename = "@codename")]
    pub code_name: String,
    #[serde(rename = "@site", default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldElement {
    #[serde(rename = "@name")]
    pub name: String,
    #[serde(rename = "$text", default)]
    pub value: String,
}

impl ObjectDocument {
    /// Document for an object; fields come out sorted by name.
    pub fn from_object(object: &ObjectInfo) -> Self {
        Self {
            object_type: object.object_type.clone(),
            code_name: object.code_name.clone(),
            site: object.site.clone(),
            fields: object
                .fields
                .iter()
                .map(|(name, value)| FieldElement {
                    name: name.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| field.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename = "bindings")]
pub struct BindingDocument {
    #[serde(rename = "@type")]
    pub object_type: String,
    #[serde(rename = "@parent")]
    pub parent: String,
    #[serde(rename = "binding", default)]
    pub bindings: Vec<BindingElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingElement {
    #[serde(rename = "@child")]
    pub child: String,
}

impl BindingDocument {
    pub fn new(object_type: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            parent: parent.into(),
            bindings: Vec::new(),
        }
    }

    /// Add a child unless it is already present. Children stay sorted.
    pub fn add(&mut self, child: impl Into<String>) {
        let child = child.into();
        if self.contains(&child) {
            return;
        }
        self.bindings.push(BindingElement { child });
        self.bindings
            .sort_by_key(|binding| binding.child.to_lowercase());
    }

    /// Whether the child is bound. Code names compare case-insensitively.
    pub fn contains(&self, child: &str) -> bool {
        self.bindings
            .iter()
            .any(|binding| binding.child.eq_ignore_ascii_case(child))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Whether a shared bindings file still records the binding.
///
/// A document belonging to a different parent does not record it.
pub fn is_binding_recorded(content: &str, binding: &BindingInfo) -> Result<bool> {
    let document: BindingDocument = from_xml(content)?;
    Ok(document.parent.eq_ignore_ascii_case(&binding.parent) && document.contains(&binding.child))
}
