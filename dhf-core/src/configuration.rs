//! Risk rating configuration: dropdown options, display names and RBM score

use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml::Value;
use std::collections::BTreeSet;

use crate::document::DhfDocument;
use crate::models::{ConfigOption, ConfigType};
use crate::xref::flatten_risks;

/// Built-in options used when a document has no (or an empty) mapping
pub fn default_options(config_type: ConfigType) -> IndexMap<String, ConfigOption> {
    let entries: [(&str, &str, &str); 3] = match config_type {
        ConfigType::Severity => [
            ("S1", "Low", "Minor impact, low risk to patient safety"),
            ("S2", "Medium", "Moderate impact, potential for patient harm"),
            ("S3", "High", "Significant impact, serious risk to patient safety"),
        ],
        ConfigType::Probability => [
            ("P1", "Low", "Unlikely to occur under normal conditions"),
            ("P2", "Medium", "May occur occasionally during normal use"),
            ("P3", "High", "Likely to occur frequently during normal use"),
        ],
        ConfigType::ProbabilityOccurrence => [
            ("PO1", "Low", "Unlikely to occur under normal conditions"),
            ("PO2", "Medium", "May occur occasionally during normal use"),
            ("PO3", "High", "Likely to occur frequently during normal use"),
        ],
        ConfigType::ProbabilityHarm => [
            ("PH1", "Low", "Unlikely to cause harm if it occurs"),
            ("PH2", "Medium", "May cause harm if it occurs"),
            ("PH3", "High", "Likely to cause harm if it occurs"),
        ],
    };
    entries
        .into_iter()
        .map(|(id, name, description)| (id.to_string(), ConfigOption::new(name, description)))
        .collect()
}

impl DhfDocument {
    /// Options stored in the document for `config_type`, in stored order
    pub fn stored_options(&self, config_type: ConfigType) -> IndexMap<String, ConfigOption> {
        match self.configuration.get(config_type.mapping_key().as_str()) {
            Some(Value::Mapping(mapping)) => mapping
                .iter()
                .filter_map(|(key, value)| {
                    let id = key.as_str()?;
                    Some((id.to_string(), ConfigOption::from_value(id, value)))
                })
                .collect(),
            _ => IndexMap::new(),
        }
    }

    /// Options as presented to users: stored ones, or the defaults when none
    /// are stored
    pub fn options(&self, config_type: ConfigType) -> IndexMap<String, ConfigOption> {
        let stored = self.stored_options(config_type);
        if stored.is_empty() {
            default_options(config_type)
        } else {
            stored
        }
    }

    /// Display name of an option, or the raw id when the option is unknown
    pub fn option_name(&self, config_type: ConfigType, option_id: &str) -> String {
        self.options(config_type)
            .get(option_id)
            .map(|option| option.name.clone())
            .unwrap_or_else(|| option_id.to_string())
    }

    /// Option ids referenced by at least one risk
    pub fn ids_in_use(&self, config_type: ConfigType) -> BTreeSet<String> {
        flatten_risks(self)
            .values()
            .filter_map(|risk| risk.str_field(config_type.risk_field()))
            .map(str::to_string)
            .collect()
    }

    /// Ids of the risks that reference `option_id`
    pub fn risks_using_option(&self, config_type: ConfigType, option_id: &str) -> Vec<String> {
        flatten_risks(self)
            .into_iter()
            .filter(|(_, risk)| risk.str_field(config_type.risk_field()) == Some(option_id))
            .map(|(id, _)| id.to_string())
            .collect()
    }
}

/// Numeric value of a rating id: the digits after `prefix`, or 1 when the
/// prefix does not match
fn rating_value(option_id: &str, prefix: &str) -> u64 {
    option_id
        .strip_prefix(prefix)
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(1)
}

/// RBM score: probability of occurrence x probability of harm x severity,
/// saturating at `u64::MAX`
pub fn calculate_rbm_score(probability_occurrence_id: &str, probability_harm_id: &str, severity_id: &str) -> u64 {
    rating_value(probability_occurrence_id, ConfigType::ProbabilityOccurrence.prefix())
        .saturating_mul(rating_value(probability_harm_id, ConfigType::ProbabilityHarm.prefix()))
        .saturating_mul(rating_value(severity_id, ConfigType::Severity.prefix()))
}

/// A risk with its ratings resolved to display names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    pub id: String,
    pub title: String,
    pub probability_occurrence: String,
    pub probability_harm: String,
    pub severity: String,
    pub rbm_score: u64,
}

/// Every risk, grouped or flat, with rating names and RBM score
pub fn assess_risks(doc: &DhfDocument) -> Vec<RiskAssessment> {
    flatten_risks(doc)
        .into_iter()
        .map(|(id, risk)| {
            let po = risk.str_field("probability_occurrence").unwrap_or_default();
            let ph = risk.str_field("probability_harm").unwrap_or_default();
            let s = risk.str_field("severity").unwrap_or_default();
            RiskAssessment {
                id: id.to_string(),
                title: risk.title().to_string(),
                probability_occurrence: doc.option_name(ConfigType::ProbabilityOccurrence, po),
                probability_harm: doc.option_name(ConfigType::ProbabilityHarm, ph),
                severity: doc.option_name(ConfigType::Severity, s),
                rbm_score: calculate_rbm_score(po, ph, s),
            }
        })
        .collect()
}
