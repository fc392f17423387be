//! Transitive dependency discovery from `metadata.json`.
//!
//! Every well-formed Puppet module ships a `metadata.json` whose
//! `dependencies` array names further Forge modules. Version requirements
//! in that file are ranges (`">= 4.13.1 < 9.0.0"`); pupdeploy does not
//! solve ranges, so discovered dependencies install unpinned and take the
//! registry's current release.

use std::path::Path;

use serde::Deserialize;

use crate::core::ParseError;
use crate::module::{ForgeModule, Module, DEFAULT_FORGE_URL};

#[derive(Debug, Deserialize)]
struct ModuleMetadata {
    #[serde(default)]
    dependencies: Vec<MetadataDependency>,
}

#[derive(Debug, Deserialize)]
struct MetadataDependency {
    name: String,
    #[allow(dead_code)]
    #[serde(default)]
    version_requirement: Option<String>,
}

/// Parse a module's `metadata.json` into unpinned Forge declarations, in
/// document order.
pub fn parse(path: &Path, contents: &str) -> Result<Vec<Module>, ParseError> {
    let metadata: ModuleMetadata =
        serde_json::from_str(contents).map_err(|source| ParseError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(metadata
        .dependencies
        .into_iter()
        .filter(|dep| !dep.name.is_empty())
        .map(|dep| {
            Module::Forge(ForgeModule::new(dep.name, None, None, DEFAULT_FORGE_URL))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn dependencies_become_unpinned_forge_modules() {
        let doc = r#"{
            "name": "acme-thing",
            "version": "1.0.0",
            "dependencies": [
                { "name": "puppetlabs/stdlib", "version_requirement": ">= 4.13.1 < 10.0.0" },
                { "name": "puppetlabs/concat" }
            ]
        }"#;
        let modules = parse(&PathBuf::from("metadata.json"), doc).unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name(), "puppetlabs/stdlib");
        assert_eq!(modules[0].version(), None);
        assert_eq!(modules[1].name(), "puppetlabs/concat");
    }

    #[test]
    fn missing_dependencies_field_is_empty() {
        let modules =
            parse(&PathBuf::from("metadata.json"), r#"{"name": "acme-bare"}"#).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = parse(&PathBuf::from("metadata.json"), "{ not json").unwrap_err();
        assert!(matches!(err, ParseError::Metadata { .. }));
    }
}
