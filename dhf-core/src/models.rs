use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;

/// Title shown for items that have none
pub const UNTITLED: &str = "Untitled";

/// The five item-bearing top-level collections of a DHF document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKind {
    UserNeeds,
    Risks,
    ProductRequirements,
    SoftwareSpecifications,
    HardwareSpecifications,
}

impl CategoryKind {
    /// Search order used when resolving an identifier
    pub const ALL: [CategoryKind; 5] = [
        CategoryKind::UserNeeds,
        CategoryKind::Risks,
        CategoryKind::ProductRequirements,
        CategoryKind::SoftwareSpecifications,
        CategoryKind::HardwareSpecifications,
    ];

    /// Top-level key in the YAML document
    pub fn key(&self) -> &'static str {
        match self {
            CategoryKind::UserNeeds => "user_needs",
            CategoryKind::Risks => "risks",
            CategoryKind::ProductRequirements => "product_requirements",
            CategoryKind::SoftwareSpecifications => "software_specifications",
            CategoryKind::HardwareSpecifications => "hardware_specifications",
        }
    }

    /// Key under which a group stores its members
    pub fn child_key(&self) -> &'static str {
        match self {
            CategoryKind::UserNeeds => "needs",
            CategoryKind::Risks => "risks",
            CategoryKind::ProductRequirements => "requirements",
            CategoryKind::SoftwareSpecifications | CategoryKind::HardwareSpecifications => {
                "specifications"
            }
        }
    }

    /// Only product requirements may nest a second level of groups
    pub fn allows_subgroups(&self) -> bool {
        matches!(self, CategoryKind::ProductRequirements)
    }

    /// Parse from the YAML key or a dashed CLI spelling
    pub fn from_key(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        CategoryKind::ALL
            .into_iter()
            .find(|kind| kind.key() == normalized)
    }
}

impl fmt::Display for CategoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CategoryKind::UserNeeds => write!(f, "User Needs"),
            CategoryKind::Risks => write!(f, "Risks"),
            CategoryKind::ProductRequirements => write!(f, "Product Requirements"),
            CategoryKind::SoftwareSpecifications => write!(f, "Software Specifications"),
            CategoryKind::HardwareSpecifications => write!(f, "Hardware Specifications"),
        }
    }
}

/// Which specification collection a mitigation link points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecificationType {
    Software,
    Hardware,
}

impl SpecificationType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "software" => Some(SpecificationType::Software),
            "hardware" => Some(SpecificationType::Hardware),
            _ => None,
        }
    }

    pub fn category(&self) -> CategoryKind {
        match self {
            SpecificationType::Software => CategoryKind::SoftwareSpecifications,
            SpecificationType::Hardware => CategoryKind::HardwareSpecifications,
        }
    }
}

impl fmt::Display for SpecificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecificationType::Software => write!(f, "software"),
            SpecificationType::Hardware => write!(f, "hardware"),
        }
    }
}

/// A loosely-typed item record (user need, risk, requirement, specification
/// or mitigation link)
///
/// Fields are kept as an ordered YAML mapping so that anything the tool does
/// not know about survives a load/save cycle untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Mapping);

impl Record {
    pub fn new() -> Self {
        Self(Mapping::new())
    }

    pub fn from_mapping(mapping: Mapping) -> Self {
        Self(mapping)
    }

    pub fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Returns a field only when it holds a string
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// The item title, or "Untitled"
    pub fn title(&self) -> &str {
        self.str_field("title").unwrap_or(UNTITLED)
    }

    /// Reads a list of identifier strings; non-string elements are ignored
    pub fn string_list(&self, field: &str) -> Vec<&str> {
        match self.get(field) {
            Some(Value::Sequence(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// True when `field` is a list containing `id`
    pub fn links_to(&self, field: &str, id: &str) -> bool {
        self.string_list(field).contains(&id)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(Value::from(field), value.into());
    }

    /// Field-level merge: every key of `patch` overwrites, everything else stays
    pub fn merge(&mut self, patch: &Mapping) {
        for (key, value) in patch {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `{id, title}` pair used by dropdown lists and traceability views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRef {
    pub id: String,
    pub title: String,
}

impl ItemRef {
    pub fn new(id: &str, record: &Record) -> Self {
        Self {
            id: id.to_string(),
            title: record.title().to_string(),
        }
    }
}

/// Typed view over a `mitigation_links` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MitigationLink {
    pub specification_id: Option<String>,
    pub specification_type: Option<SpecificationType>,
    pub risk_id: Option<String>,
    pub effect: Option<String>,
}

impl MitigationLink {
    pub fn from_record(record: &Record) -> Self {
        Self {
            specification_id: record.str_field("specification_id").map(str::to_string),
            specification_type: record
                .str_field("specification_type")
                .and_then(SpecificationType::from_str),
            risk_id: record.str_field("risk_id").map(str::to_string),
            effect: record.str_field("effect").map(str::to_string),
        }
    }
}

/// Risk rating dropdowns stored under `configuration.<type>_mapping`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    Severity,
    /// Legacy single-probability rating
    Probability,
    ProbabilityOccurrence,
    ProbabilityHarm,
}

impl ConfigType {
    pub const ALL: [ConfigType; 4] = [
        ConfigType::Severity,
        ConfigType::Probability,
        ConfigType::ProbabilityOccurrence,
        ConfigType::ProbabilityHarm,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ConfigType::Severity => "severity",
            ConfigType::Probability => "probability",
            ConfigType::ProbabilityOccurrence => "probability_occurrence",
            ConfigType::ProbabilityHarm => "probability_harm",
        }
    }

    /// Letter prefix of option identifiers (S1, P2, PO3, PH1)
    pub fn prefix(&self) -> &'static str {
        match self {
            ConfigType::Severity => "S",
            ConfigType::Probability => "P",
            ConfigType::ProbabilityOccurrence => "PO",
            ConfigType::ProbabilityHarm => "PH",
        }
    }

    /// Key of the mapping inside the `configuration` section
    pub fn mapping_key(&self) -> String {
        format!("{}_mapping", self.key())
    }

    /// The risk field that references options of this type
    pub fn risk_field(&self) -> &'static str {
        self.key()
    }

    pub fn from_key(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ConfigType::ALL
            .into_iter()
            .find(|config_type| config_type.key() == normalized)
    }
}

impl fmt::Display for ConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// A single configuration dropdown option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ConfigOption {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
        }
    }

    /// Lenient read of a stored option; missing name falls back to the id
    pub fn from_value(id: &str, value: &Value) -> Self {
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string();
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self { name, description }
    }
}
