//! Executable target discovery
//!
//! Parses the JSON printed by `swift package dump-package`. Executable
//! products are preferred; packages without products fall back to
//! targets of type `executable`.

use serde_json::Value;

use crate::error::BuildError;

/// Names of the executables described by a package dump
pub fn executables_from_dump(json: &str) -> Result<Vec<String>, BuildError> {
    let dump: Value = serde_json::from_str(json)
        .map_err(|e| BuildError::Message(format!("Unable to parse package dump: {e}")))?;

    let from_products: Vec<String> = dump["products"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|product| {
            product["type"]
                .as_object()
                .is_some_and(|t| t.contains_key("executable"))
        })
        .filter_map(|product| product["name"].as_str().map(str::to_string))
        .collect();
    if !from_products.is_empty() {
        return Ok(from_products);
    }

    Ok(dump["targets"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|target| target["type"].as_str() == Some("executable"))
        .filter_map(|target| target["name"].as_str().map(str::to_string))
        .collect())
}

/// Narrow `targets` to the one named by a hot rebuild hint
///
/// A hint naming no executable (a library module changed) keeps them all.
pub fn select_targets(targets: &[String], hint: Option<&str>) -> Vec<String> {
    match hint {
        Some(hint) if targets.iter().any(|t| t == hint) => vec![hint.to_string()],
        _ => targets.to_vec(),
    }
}
