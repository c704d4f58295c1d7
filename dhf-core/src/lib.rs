pub mod configuration;
pub mod document;
pub mod error;
pub mod identity;
pub mod models;
pub mod mutator;
pub mod report;
pub mod resolver;
pub mod settings;
pub mod storage;
pub mod xref;

#[cfg(test)]
mod test_fixtures;

// Re-export commonly used types
pub use configuration::{assess_risks, calculate_rbm_score, default_options, RiskAssessment};
pub use document::{
    Category, Children, DhfDocument, Entry, Group, ItemLocation, LocatedItem, Slot, Table,
};
pub use error::{DhfError, DhfResult};
pub use identity::{current_user, UserIdentity};
pub use models::{
    CategoryKind, ConfigOption, ConfigType, ItemRef, MitigationLink, Record, SpecificationType,
};
pub use mutator::{patch_from_assignments, patch_from_json};
pub use report::{generate_report, list_templates, GeneratedReport, ReportTemplate};
pub use resolver::Resolved;
pub use settings::{Overrides, Settings};
pub use storage::DhfStore;
pub use xref::{
    duplicate_ids, flatten_risks, item_detail, linkable_items, summary, traceability,
    DocumentSummary, ItemDetail, LinkableItems, TraceDirection, TraceRow, Traceability,
};
