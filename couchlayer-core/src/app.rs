//! Design applications: server-side documents that define queryable views.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, io::Read};

use crate::{
    document::Document,
    error::CouchResult,
    urls::APP_BASE,
};

const DEFAULT_LANGUAGE: &str = "javascript";

/// A named view: a map function and an optional reduce function, as source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub map: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
}

/// A design document stored under `_design/<name>`.
///
/// # Example
///
/// ```ignore
/// let mut app = DesignApplication::new("user-logic")
///     .with_view("all-users", "function(doc){ if(doc.doctype == 'user') emit(doc._id, null); }");
/// client.install_application(&mut app, "http://localhost:5984/users").await?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignApplication {
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    rev: Option<String>,
    #[serde(default = "default_language")]
    language: String,
    #[serde(default)]
    views: BTreeMap<String, ViewDefinition>,
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

fn design_id(name: &str) -> String {
    let name = name.strip_prefix("_design/").unwrap_or(name);
    format!("{APP_BASE}/{name}")
}

impl DesignApplication {
    /// Creates an empty application named `name`. A `_design/` prefix is accepted and kept once.
    pub fn new(name: &str) -> Self {
        Self {
            id: design_id(name),
            rev: None,
            language: default_language(),
            views: BTreeMap::new(),
        }
    }

    /// Loads an application from its JSON definition, forcing its id to `_design/<name>`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not describe a design document.
    pub fn from_json(name: &str, json: &str) -> CouchResult<Self> {
        let mut app: DesignApplication = serde_json::from_str(json)?;
        app.id = design_id(name);
        app.rev = None;
        Ok(app)
    }

    /// Reads and loads an application definition, e.g. from a bundled resource file.
    pub fn from_reader<R: Read>(name: &str, reader: R) -> CouchResult<Self> {
        let mut app: DesignApplication = serde_json::from_reader(reader)?;
        app.id = design_id(name);
        app.rev = None;
        Ok(app)
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_view(mut self, name: impl Into<String>, map: impl Into<String>) -> Self {
        self.views.insert(
            name.into(),
            ViewDefinition {
                map: map.into(),
                reduce: None,
            },
        );
        self
    }

    pub fn with_reduced_view(
        mut self,
        name: impl Into<String>,
        map: impl Into<String>,
        reduce: impl Into<String>,
    ) -> Self {
        self.views.insert(
            name.into(),
            ViewDefinition {
                map: map.into(),
                reduce: Some(reduce.into()),
            },
        );
        self
    }

    /// Application name without the `_design/` prefix.
    pub fn name(&self) -> &str {
        self.id
            .strip_prefix("_design/")
            .unwrap_or(&self.id)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn views(&self) -> &BTreeMap<String, ViewDefinition> {
        &self.views
    }

    pub fn has_view(&self, name: &str) -> bool {
        self.views.contains_key(name)
    }
}

impl Document for DesignApplication {
    fn id(&self) -> &str {
        &self.id
    }

    fn revision(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    fn set_revision(&mut self, revision: Option<String>) {
        self.rev = revision;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentExt;
    use serde_json::json;

    #[test]
    fn new_application_lives_under_design_prefix() {
        let app = DesignApplication::new("user-logic").with_view("all", "function(doc){}");
        assert_eq!(app.id(), "_design/user-logic");
        assert_eq!(app.name(), "user-logic");
        assert_eq!(DesignApplication::new("_design/x").id(), "_design/x");
        assert!(app.has_view("all"));
    }

    #[test]
    fn loads_definition_and_overrides_id() {
        let json = r#"{
            "_id": "_design/old",
            "_rev": "4-zzz",
            "views": {
                "count": { "map": "function(doc){ emit(null, 1); }", "reduce": "_sum" }
            }
        }"#;
        let app = DesignApplication::from_json("workspace-logic", json).unwrap();
        assert_eq!(app.id(), "_design/workspace-logic");
        assert_eq!(app.revision(), None);
        assert_eq!(app.language(), "javascript");
        assert_eq!(app.views()["count"].reduce.as_deref(), Some("_sum"));
    }

    #[test]
    fn wire_form_matches_design_document_layout() {
        let app = DesignApplication::new("a").with_view("v", "m");
        assert_eq!(
            app.to_wire().unwrap(),
            json!({
                "_id": "_design/a",
                "language": "javascript",
                "views": { "v": { "map": "m" } }
            })
        );
    }
}
