//! In-memory edits on a document
//!
//! Each operation changes a single record, group attribute or configuration
//! entry and reports whether its target existed. Persisting the result is the
//! store's job (see [`crate::storage::DhfStore`]).

use serde_yaml::{Mapping, Value};

use crate::document::{DhfDocument, Entry};
use crate::error::{DhfError, DhfResult};
use crate::models::{CategoryKind, ConfigType};

impl DhfDocument {
    /// Merges `patch` into the record with identifier `id`
    ///
    /// Fields named in the patch replace the stored value; every other field
    /// is left alone. Returns `false` when the id does not resolve.
    pub fn update_item(&mut self, id: &str, patch: &Mapping) -> bool {
        match self.resolve_mut(id) {
            Some((location, record)) => {
                record.merge(patch);
                tracing::debug!(id, %location, fields = patch.len(), "updated item");
                true
            }
            None => false,
        }
    }

    /// Sets the `group_name` display attribute of a top-level group
    ///
    /// The storage key stays as it is, so every path into the group remains
    /// valid. Returns `false` when `group_key` is absent or not a group.
    pub fn rename_group(&mut self, kind: CategoryKind, group_key: &str, new_name: &str) -> bool {
        match self.category_mut(kind).entries.get_mut(group_key) {
            Some(Entry::Group(group)) => {
                group.set_display_name(new_name);
                true
            }
            _ => false,
        }
    }

    pub fn update_mitigation_effect(&mut self, link_id: &str, effect: &str) -> bool {
        match self.mitigation_links.get_mut(link_id) {
            Some(link) => {
                link.set("effect", effect);
                true
            }
            None => false,
        }
    }

    /// Adds an option under the next free identifier for its prefix and
    /// returns that identifier
    ///
    /// Numbering continues from the highest stored id (`S1..S3` gives `S4`).
    /// An empty description becomes `"<name> option for <type>"`. Fails
    /// without touching the document when the highest id cannot be
    /// incremented.
    pub fn add_config_option(
        &mut self,
        config_type: ConfigType,
        name: &str,
        description: &str,
    ) -> DhfResult<String> {
        let prefix = config_type.prefix();
        let highest = match self.configuration.get(config_type.mapping_key().as_str()) {
            Some(Value::Mapping(mapping)) => mapping
                .keys()
                .filter_map(Value::as_str)
                .filter_map(|id| option_number(id, prefix))
                .max(),
            _ => None,
        };
        let next = match highest {
            None => 1,
            Some(highest) => highest.checked_add(1).ok_or_else(|| {
                DhfError::Validation(format!(
                    "no {} identifier left after {}{}",
                    config_type, prefix, highest
                ))
            })?,
        };
        let new_id = format!("{}{}", prefix, next);

        let slot = self
            .configuration
            .entry(Value::from(config_type.mapping_key()))
            .or_insert(Value::Null);
        let mut mapping = match std::mem::take(slot) {
            Value::Mapping(mapping) => mapping,
            Value::Null => Mapping::new(),
            other => {
                tracing::warn!(%config_type, value = ?other, "replacing non-mapping configuration entry");
                Mapping::new()
            }
        };
        let description = if description.trim().is_empty() {
            format!("{} option for {}", name, config_type)
        } else {
            description.to_string()
        };
        let mut option = Mapping::new();
        option.insert(Value::from("name"), Value::from(name));
        option.insert(Value::from("description"), Value::from(description));
        mapping.insert(Value::from(new_id.as_str()), Value::Mapping(option));
        *slot = Value::Mapping(mapping);

        tracing::debug!(%config_type, id = %new_id, "added configuration option");
        Ok(new_id)
    }

    /// Deletes a stored option; returns whether it existed
    ///
    /// Risks still referencing the id are not touched; their rating then
    /// displays as the raw id. Use [`DhfDocument::risks_using_option`] first
    /// to warn about such references.
    pub fn remove_config_option(&mut self, config_type: ConfigType, option_id: &str) -> bool {
        let removed = match self
            .configuration
            .get_mut(config_type.mapping_key().as_str())
        {
            Some(Value::Mapping(mapping)) => mapping.shift_remove(option_id).is_some(),
            _ => false,
        };
        if removed {
            tracing::debug!(%config_type, id = option_id, "removed configuration option");
        }
        removed
    }

    /// Overwrites the name of a stored option, and its description when one
    /// is given
    pub fn update_config_option(
        &mut self,
        config_type: ConfigType,
        option_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> bool {
        let Some(Value::Mapping(mapping)) = self
            .configuration
            .get_mut(config_type.mapping_key().as_str())
        else {
            return false;
        };
        let Some(option) = mapping.get_mut(option_id) else {
            return false;
        };
        if !option.is_mapping() {
            *option = Value::Mapping(Mapping::new());
        }
        if let Value::Mapping(fields) = option {
            fields.insert(Value::from("name"), Value::from(name));
            if let Some(description) = description.filter(|d| !d.is_empty()) {
                fields.insert(Value::from("description"), Value::from(description));
            }
        }
        true
    }
}

/// Parses a JSON object into an update patch
pub fn patch_from_json(text: &str) -> DhfResult<Mapping> {
    let json: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| DhfError::Validation(format!("patch is not valid JSON: {}", e)))?;
    if !json.is_object() {
        return Err(DhfError::Validation("patch must be a JSON object".to_string()));
    }
    serde_yaml::to_value(json)
        .ok()
        .and_then(|value| match value {
            Value::Mapping(mapping) => Some(mapping),
            _ => None,
        })
        .ok_or_else(|| DhfError::Validation("patch could not be converted".to_string()))
}

/// Builds a patch from `field=value` pairs
///
/// Values are read as YAML scalars or flow collections, so `true`, `3` and
/// `[UN001, UN002]` keep their types; anything unparseable stays a string.
pub fn patch_from_assignments<S: AsRef<str>>(assignments: &[S]) -> DhfResult<Mapping> {
    let mut patch = Mapping::new();
    for assignment in assignments {
        let assignment = assignment.as_ref();
        let Some((field, raw)) = assignment.split_once('=') else {
            return Err(DhfError::Validation(format!(
                "expected field=value, got '{}'",
                assignment
            )));
        };
        let field = field.trim();
        if field.is_empty() {
            return Err(DhfError::Validation(format!(
                "missing field name in '{}'",
                assignment
            )));
        }
        let value = match serde_yaml::from_str::<Value>(raw) {
            Ok(Value::Null) if !raw.trim().is_empty() => Value::from(raw),
            Ok(Value::Mapping(_)) | Err(_) => Value::from(raw),
            Ok(value) => value,
        };
        patch.insert(Value::from(field), value);
    }
    Ok(patch)
}

/// Trailing number of an option id carrying exactly `prefix`
///
/// `PO3` counts for `PO` but not for `P`, since "O3" does not parse.
fn option_number(id: &str, prefix: &str) -> Option<u64> {
    id.strip_prefix(prefix)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{parse, MIXED_SHAPES_YAML, SAMPLE_DHF_YAML};

    fn patch(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_update_merges_fields() {
        let mut doc = parse(SAMPLE_DHF_YAML);
        assert!(doc.update_item("PR001", &patch("title: Renamed\nverified: true\n")));

        let record = doc.resolve("PR001").unwrap().record;
        assert_eq!(record.title(), "Renamed");
        assert_eq!(record.get("verified"), Some(&Value::Bool(true)));
        // untouched fields survive
        assert_eq!(
            record.str_field("description"),
            Some("The device must measure glucose with 15% accuracy")
        );
        assert_eq!(record.string_list("linked_user_needs"), vec!["UN001"]);
    }

    #[test]
    fn test_update_unknown_id_changes_nothing() {
        let mut doc = parse(SAMPLE_DHF_YAML);
        let before = doc.clone();
        assert!(!doc.update_item("PR999", &patch("title: X\n")));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_update_reaches_flat_and_nested_items() {
        let mut doc = parse(MIXED_SHAPES_YAML);
        for id in ["UN900", "R001", "PR201", "SS100"] {
            assert!(doc.update_item(id, &patch("status: reviewed\n")), "{id}");
            assert_eq!(doc.resolve(id).unwrap().record.str_field("status"), Some("reviewed"));
        }
    }

    #[test]
    fn test_rename_group_keeps_storage_key() {
        let mut doc = parse(SAMPLE_DHF_YAML);
        assert!(doc.rename_group(CategoryKind::ProductRequirements, "performance_requirements", "Speed"));

        let category = doc.category(CategoryKind::ProductRequirements);
        let (_, group) = category
            .groups()
            .find(|(key, _)| *key == "performance_requirements")
            .unwrap();
        assert_eq!(group.display_name("performance_requirements"), "Speed");
        assert_eq!(
            doc.resolve("PR002").unwrap().location.group.as_deref(),
            Some("performance_requirements")
        );
    }

    #[test]
    fn test_rename_group_rejects_items_and_missing_keys() {
        let mut doc = parse(MIXED_SHAPES_YAML);
        assert!(!doc.rename_group(CategoryKind::ProductRequirements, "PR900", "Nope"));
        assert!(!doc.rename_group(CategoryKind::ProductRequirements, "missing", "Nope"));
        assert!(!doc.rename_group(CategoryKind::ProductRequirements, "broken", "Nope"));
        assert!(doc.rename_group(CategoryKind::Risks, "safety", "Clinical Safety"));
    }

    #[test]
    fn test_update_mitigation_effect() {
        let mut doc = parse(SAMPLE_DHF_YAML);
        assert!(doc.update_mitigation_effect("ML001", "Eliminates hazard"));
        let link = doc.mitigation_links.get("ML001").unwrap();
        assert_eq!(link.str_field("effect"), Some("Eliminates hazard"));
        assert_eq!(link.str_field("risk_id"), Some("R001"));
        assert!(!doc.update_mitigation_effect("ML404", "x"));
    }

    #[test]
    fn test_add_config_option_continues_numbering() {
        let mut doc = parse(SAMPLE_DHF_YAML);
        let id = doc.add_config_option(ConfigType::Severity, "Critical", "").unwrap();
        assert_eq!(id, "S4");

        let option = &doc.options(ConfigType::Severity)["S4"];
        assert_eq!(option.name, "Critical");
        assert_eq!(option.description, "Critical option for severity");
    }

    #[test]
    fn test_add_config_option_uses_type_prefix() {
        let mut doc = parse(SAMPLE_DHF_YAML);
        // stored PH1 and PH3: next is PH4
        assert_eq!(doc.add_config_option(ConfigType::ProbabilityHarm, "Severe", "Harm").unwrap(), "PH4");
        assert_eq!(doc.add_config_option(ConfigType::ProbabilityOccurrence, "High", "").unwrap(), "PO3");
        // nothing stored for the legacy type
        assert_eq!(doc.add_config_option(ConfigType::Probability, "Rare", "").unwrap(), "P1");
    }

    #[test]
    fn test_add_config_option_creates_configuration() {
        let mut doc = DhfDocument::new();
        assert_eq!(doc.add_config_option(ConfigType::Severity, "Minor", "Cosmetic").unwrap(), "S1");
        assert_eq!(doc.stored_options(ConfigType::Severity)["S1"].description, "Cosmetic");
    }

    #[test]
    fn test_add_config_option_past_u32_ids() {
        let mut doc = parse("configuration:\n  severity_mapping:\n    S4294967295:\n      name: Huge\n");
        assert_eq!(
            doc.add_config_option(ConfigType::Severity, "Next", "").unwrap(),
            "S4294967296"
        );
    }

    #[test]
    fn test_add_config_option_fails_when_ids_are_exhausted() {
        let mut doc = parse("configuration:\n  severity_mapping:\n    S18446744073709551615:\n      name: Last\n");
        let before = doc.clone();
        assert!(matches!(
            doc.add_config_option(ConfigType::Severity, "Next", ""),
            Err(DhfError::Validation(_))
        ));
        assert_eq!(doc, before);
    }

    #[test]
    fn test_remove_option_in_use_leaves_risks_untouched() {
        let mut doc = parse(SAMPLE_DHF_YAML);
        assert_eq!(doc.risks_using_option(ConfigType::Severity, "S3"), vec!["R001"]);

        assert!(doc.remove_config_option(ConfigType::Severity, "S3"));
        assert!(!doc.remove_config_option(ConfigType::Severity, "S3"));

        assert_eq!(doc.resolve("R001").unwrap().record.str_field("severity"), Some("S3"));
        assert_eq!(doc.option_name(ConfigType::Severity, "S3"), "S3");
        assert_eq!(
            doc.stored_options(ConfigType::Severity).keys().collect::<Vec<_>>(),
            vec!["S1", "S2"]
        );
    }

    #[test]
    fn test_update_config_option() {
        let mut doc = parse(SAMPLE_DHF_YAML);
        assert!(doc.update_config_option(ConfigType::Severity, "S1", "Negligible", None));
        let option = &doc.stored_options(ConfigType::Severity)["S1"];
        assert_eq!(option.name, "Negligible");
        assert_eq!(option.description, "Minor impact");

        assert!(doc.update_config_option(ConfigType::Severity, "S1", "Negligible", Some("None at all")));
        assert_eq!(doc.stored_options(ConfigType::Severity)["S1"].description, "None at all");

        assert!(!doc.update_config_option(ConfigType::Severity, "S9", "X", None));
        assert!(!doc.update_config_option(ConfigType::Probability, "P1", "X", None));
    }

    #[test]
    fn test_option_number_respects_prefix() {
        assert_eq!(option_number("PO3", "PO"), Some(3));
        assert_eq!(option_number("PO3", "P"), None);
        assert_eq!(option_number("S12", "S"), Some(12));
        assert_eq!(option_number("Sx", "S"), None);
    }

    #[test]
    fn test_patch_from_json() {
        let patch = patch_from_json(r#"{"title": "New", "linked_user_needs": ["UN001"]}"#).unwrap();
        assert_eq!(patch.get("title"), Some(&Value::from("New")));
        assert!(patch.get("linked_user_needs").unwrap().is_sequence());

        assert!(matches!(patch_from_json("[1, 2]"), Err(DhfError::Validation(_))));
        assert!(matches!(patch_from_json("{oops"), Err(DhfError::Validation(_))));
    }

    #[test]
    fn test_patch_from_assignments() {
        let patch = patch_from_assignments(&[
            "title=Faster alerts",
            "verified=true",
            "linked_user_needs=[UN001, UN002]",
            "note=a: b",
        ])
        .unwrap();
        assert_eq!(patch.get("title"), Some(&Value::from("Faster alerts")));
        assert_eq!(patch.get("verified"), Some(&Value::Bool(true)));
        assert_eq!(
            patch.get("linked_user_needs").and_then(Value::as_sequence).map(Vec::len),
            Some(2)
        );
        assert_eq!(patch.get("note"), Some(&Value::from("a: b")));

        assert!(patch_from_assignments(&["no-equals"]).is_err());
        assert!(patch_from_assignments(&["=value"]).is_err());
    }
}
