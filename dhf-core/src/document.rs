//! Canonical in-memory form of a DHF document
//!
//! A DHF file has grown several storage shapes over time: items stored flat
//! directly under a category, items inside named groups, and (for product
//! requirements) groups of subgroups. The shape is detected once here, when
//! the YAML tree is normalised, and written back unchanged on save. Everything
//! downstream works on the tagged nodes below and never inspects raw YAML.

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::fmt;

use crate::models::{CategoryKind, Record};

const METADATA_KEY: &str = "metadata";
const MITIGATION_LINKS_KEY: &str = "mitigation_links";
const CONFIGURATION_KEY: &str = "configuration";

/// A member slot that either parsed into `T` or is kept verbatim
#[derive(Debug, Clone, PartialEq)]
pub enum Slot<T> {
    Valid(T),
    Malformed(Value),
}

/// Ordered `key -> T` map that remembers malformed members in place
#[derive(Debug, Clone, PartialEq)]
pub struct Table<T> {
    slots: IndexMap<String, Slot<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            slots: IndexMap::new(),
        }
    }
}

impl<T> Table<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Valid members in stored order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.slots.iter().filter_map(|(key, slot)| match slot {
            Slot::Valid(value) => Some((key.as_str(), value)),
            Slot::Malformed(_) => None,
        })
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        match self.slots.get(key) {
            Some(Slot::Valid(value)) => Some(value),
            _ => None,
        }
    }

    pub fn get_key_value(&self, key: &str) -> Option<(&str, &T)> {
        match self.slots.get_key_value(key) {
            Some((k, Slot::Valid(value))) => Some((k.as_str(), value)),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        match self.slots.get_mut(key) {
            Some(Slot::Valid(value)) => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        self.slots.insert(key.into(), Slot::Valid(value));
    }

    /// Removes a valid member, keeping the order of the rest
    pub fn remove(&mut self, key: &str) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        match self.slots.shift_remove(key) {
            Some(Slot::Valid(value)) => Some(value),
            _ => None,
        }
    }

    /// Number of valid members
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of members that were kept verbatim
    fn insert_malformed(&mut self, key: String, value: Value) {
        self.slots.insert(key, Slot::Malformed(value));
    }

    fn slots(&self) -> impl Iterator<Item = (&String, &Slot<T>)> {
        self.slots.iter()
    }
}

/// Members of a group: either items, or a second level of groups
#[derive(Debug, Clone, PartialEq)]
pub enum Children {
    Items(Table<Record>),
    Subgroups(Table<Group>),
}

/// A named bucket of items with its display attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Every key of the group other than its child map (`group_name`,
    /// `description`, ...)
    pub attributes: Mapping,
    /// Position of the child map among the group's keys
    child_index: usize,
    pub children: Children,
    /// Child value that is neither a map nor null, kept verbatim while the
    /// group has no members
    raw_children: Option<Value>,
}

impl Group {
    /// `group_name` when present, otherwise the storage key
    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.attributes
            .get("group_name")
            .and_then(Value::as_str)
            .unwrap_or(key)
    }

    pub fn set_display_name(&mut self, name: &str) {
        self.attributes
            .insert(Value::from("group_name"), Value::from(name));
    }

    /// Number of items, counting through subgroups
    pub fn item_count(&self) -> usize {
        match &self.children {
            Children::Items(items) => items.len(),
            Children::Subgroups(groups) => groups.iter().map(|(_, g)| g.item_count()).sum(),
        }
    }

    fn parse(kind: CategoryKind, mut mapping: Mapping, allow_subgroups: bool) -> Self {
        let child_key = kind.child_key();
        let child_index = mapping
            .keys()
            .position(|k| k.as_str() == Some(child_key))
            .unwrap_or(mapping.len());
        let mut raw_children = None;
        let members = match mapping.shift_remove(child_key) {
            Some(Value::Mapping(members)) => members,
            None | Some(Value::Null) => Mapping::new(),
            Some(other) => {
                tracing::warn!(
                    category = kind.key(),
                    found = value_kind(&other),
                    "group members are not a mapping; keeping them verbatim"
                );
                raw_children = Some(other);
                Mapping::new()
            }
        };

        let nested = allow_subgroups && members.values().any(|v| is_group_shaped(kind, v));
        let children = if nested {
            let mut groups = Table::new();
            for (key, value) in members {
                let Some(key) = key_string(&key) else {
                    continue;
                };
                match value {
                    Value::Mapping(m) if mapping_is_group(kind, &m) => {
                        groups.insert(key, Group::parse(kind, m, false));
                    }
                    other => {
                        tracing::warn!(
                            category = kind.key(),
                            member = %key,
                            "skipping non-group member of a nested group"
                        );
                        groups.insert_malformed(key, other);
                    }
                }
            }
            Children::Subgroups(groups)
        } else {
            let mut items = Table::new();
            for (key, value) in members {
                let Some(key) = key_string(&key) else {
                    continue;
                };
                match value {
                    Value::Mapping(m) => items.insert(key, Record::from_mapping(m)),
                    other => {
                        tracing::warn!(category = kind.key(), item = %key, "skipping malformed item");
                        items.insert_malformed(key, other);
                    }
                }
            }
            Children::Items(items)
        };

        Self {
            attributes: mapping,
            child_index,
            children,
            raw_children,
        }
    }

    fn has_members(&self) -> bool {
        match &self.children {
            Children::Items(items) => !items.slots.is_empty(),
            Children::Subgroups(groups) => !groups.slots.is_empty(),
        }
    }

    fn to_value(&self, kind: CategoryKind) -> Value {
        let members = match &self.children {
            Children::Items(items) => table_to_mapping(items, |r| Value::Mapping(r.as_mapping().clone())),
            Children::Subgroups(groups) => table_to_mapping(groups, |g| g.to_value(kind)),
        };
        let members = match &self.raw_children {
            Some(raw) if !self.has_members() => raw.clone(),
            _ => Value::Mapping(members),
        };

        let mut out = Mapping::new();
        let mut placed = false;
        for (index, (key, value)) in self.attributes.iter().enumerate() {
            if index == self.child_index {
                out.insert(Value::from(kind.child_key()), members.clone());
                placed = true;
            }
            out.insert(key.clone(), value.clone());
        }
        if !placed {
            out.insert(Value::from(kind.child_key()), members);
        }
        Value::Mapping(out)
    }
}

/// One top-level entry of a category
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Legacy flat storage: the entry is the item itself
    Item(Record),
    Group(Group),
    /// Wrong type; kept verbatim and ignored
    Malformed(Value),
}

/// An item found while walking a category, with where it lives
#[derive(Debug, Clone, Copy)]
pub struct LocatedItem<'a> {
    pub group: Option<&'a str>,
    pub subgroup: Option<&'a str>,
    pub id: &'a str,
    pub record: &'a Record,
}

impl LocatedItem<'_> {
    pub fn location(&self, category: CategoryKind) -> ItemLocation {
        ItemLocation {
            category,
            group: self.group.map(str::to_string),
            subgroup: self.subgroup.map(str::to_string),
            id: self.id.to_string(),
        }
    }
}

/// Exact storage path of an item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemLocation {
    pub category: CategoryKind,
    pub group: Option<String>,
    pub subgroup: Option<String>,
    pub id: String,
}

impl fmt::Display for ItemLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let child = self.category.child_key();
        write!(f, "{}", self.category.key())?;
        if let Some(group) = &self.group {
            write!(f, ".{}.{}", group, child)?;
        }
        if let Some(subgroup) = &self.subgroup {
            write!(f, ".{}.{}", subgroup, child)?;
        }
        write!(f, ".{}", self.id)
    }
}

/// All entries of one category, in stored order
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub kind: CategoryKind,
    pub entries: IndexMap<String, Entry>,
}

impl Category {
    pub fn new(kind: CategoryKind) -> Self {
        Self {
            kind,
            entries: IndexMap::new(),
        }
    }

    /// Every item of the category in document order, subgroups flattened in
    /// their stored order
    pub fn items(&self) -> Vec<LocatedItem<'_>> {
        let mut out = Vec::new();
        for (key, entry) in &self.entries {
            match entry {
                Entry::Item(record) => out.push(LocatedItem {
                    group: None,
                    subgroup: None,
                    id: key,
                    record,
                }),
                Entry::Group(group) => match &group.children {
                    Children::Items(items) => {
                        out.extend(items.iter().map(|(id, record)| LocatedItem {
                            group: Some(key.as_str()),
                            subgroup: None,
                            id,
                            record,
                        }))
                    }
                    Children::Subgroups(subgroups) => {
                        for (sub_key, sub) in subgroups.iter() {
                            if let Children::Items(items) = &sub.children {
                                out.extend(items.iter().map(|(id, record)| LocatedItem {
                                    group: Some(key.as_str()),
                                    subgroup: Some(sub_key),
                                    id,
                                    record,
                                }))
                            }
                        }
                    }
                },
                Entry::Malformed(_) => {}
            }
        }
        out
    }

    /// Groups in stored order (flat items and malformed entries skipped)
    pub fn groups(&self) -> impl Iterator<Item = (&str, &Group)> {
        self.entries.iter().filter_map(|(key, entry)| match entry {
            Entry::Group(group) => Some((key.as_str(), group)),
            _ => None,
        })
    }

    pub fn group_mut(&mut self, key: &str) -> Option<&mut Group> {
        match self.entries.get_mut(key) {
            Some(Entry::Group(group)) => Some(group),
            _ => None,
        }
    }

    pub fn item_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| match entry {
                Entry::Item(_) => 1,
                Entry::Group(group) => group.item_count(),
                Entry::Malformed(_) => 0,
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parse(kind: CategoryKind, mapping: Mapping) -> Self {
        let mut category = Category::new(kind);
        for (key, value) in mapping {
            let Some(key) = key_string(&key) else {
                continue;
            };
            let entry = match value {
                Value::Mapping(m) if mapping_is_group(kind, &m) => {
                    Entry::Group(Group::parse(kind, m, kind.allows_subgroups()))
                }
                Value::Mapping(m) => Entry::Item(Record::from_mapping(m)),
                other => {
                    tracing::warn!(category = kind.key(), entry = %key, "skipping malformed entry");
                    Entry::Malformed(other)
                }
            };
            category.entries.insert(key, entry);
        }
        category
    }

    fn to_value(&self) -> Value {
        let mut out = Mapping::new();
        for (key, entry) in &self.entries {
            let value = match entry {
                Entry::Item(record) => Value::Mapping(record.as_mapping().clone()),
                Entry::Group(group) => group.to_value(self.kind),
                Entry::Malformed(value) => value.clone(),
            };
            out.insert(Value::from(key.as_str()), value);
        }
        Value::Mapping(out)
    }
}

/// The whole Device History File
#[derive(Debug, Clone, PartialEq)]
pub struct DhfDocument {
    pub metadata: Mapping,
    categories: Vec<Category>,
    pub mitigation_links: Table<Record>,
    pub configuration: Mapping,
    /// Top-level keys this model does not own, or owned keys whose value had
    /// the wrong type
    extra: Mapping,
    /// Top-level key order as loaded
    key_order: Vec<String>,
}

impl Default for DhfDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl DhfDocument {
    /// Creates an empty document
    pub fn new() -> Self {
        Self {
            metadata: Mapping::new(),
            categories: CategoryKind::ALL.into_iter().map(Category::new).collect(),
            mitigation_links: Table::new(),
            configuration: Mapping::new(),
            extra: Mapping::new(),
            key_order: Vec::new(),
        }
    }

    pub fn category(&self, kind: CategoryKind) -> &Category {
        &self.categories[category_slot(kind)]
    }

    pub fn category_mut(&mut self, kind: CategoryKind) -> &mut Category {
        &mut self.categories[category_slot(kind)]
    }

    /// String field of the `metadata` section
    pub fn metadata_str(&self, field: &str) -> Option<&str> {
        self.metadata.get(field).and_then(Value::as_str)
    }

    /// Normalises a parsed YAML tree
    ///
    /// An empty file (`null`) is an empty document; any other non-mapping
    /// root is rejected.
    pub fn from_value(value: Value) -> Result<Self, String> {
        let root = match value {
            Value::Null => return Ok(Self::new()),
            Value::Mapping(root) => root,
            other => {
                return Err(format!(
                    "document root must be a mapping, found {}",
                    value_kind(&other)
                ))
            }
        };

        let mut doc = Self::new();
        for (key, value) in root {
            let Some(key) = key_string(&key) else {
                continue;
            };
            doc.key_order.push(key.clone());

            let value = match (key.as_str(), value) {
                (_, Value::Null) if is_owned_key(&key) => continue,
                (METADATA_KEY, Value::Mapping(m)) => {
                    doc.metadata = m;
                    continue;
                }
                (CONFIGURATION_KEY, Value::Mapping(m)) => {
                    doc.configuration = m;
                    continue;
                }
                (MITIGATION_LINKS_KEY, Value::Mapping(m)) => {
                    for (link_key, link) in m {
                        let Some(link_key) = key_string(&link_key) else {
                            continue;
                        };
                        match link {
                            Value::Mapping(fields) => doc
                                .mitigation_links
                                .insert(link_key, Record::from_mapping(fields)),
                            other => {
                                tracing::warn!(link = %link_key, "skipping malformed mitigation link");
                                doc.mitigation_links.insert_malformed(link_key, other);
                            }
                        }
                    }
                    continue;
                }
                (k, Value::Mapping(m)) if CategoryKind::from_key(k).is_some_and(|c| c.key() == k) => {
                    if let Some(kind) = CategoryKind::from_key(k) {
                        *doc.category_mut(kind) = Category::parse(kind, m);
                    }
                    continue;
                }
                (_, other) => other,
            };

            if is_owned_key(&key) {
                tracing::warn!(section = %key, "section has an unexpected type; keeping it verbatim");
            }
            doc.extra.insert(Value::from(key), value);
        }
        Ok(doc)
    }

    /// Serializes back to a YAML tree, preserving the loaded key order and
    /// storage shapes
    pub fn to_value(&self) -> Value {
        let mut root = Mapping::new();
        for key in &self.key_order {
            // A wrong-typed owned section stays verbatim until something is
            // stored in its place
            let value = match (self.extra.get(key.as_str()), self.owned_section(key)) {
                (Some(_), Some(owned)) if !value_is_empty_mapping(&owned) => owned,
                (Some(raw), _) => raw.clone(),
                (None, Some(owned)) => owned,
                (None, None) => continue,
            };
            root.insert(Value::from(key.as_str()), value);
        }

        // Sections that were absent on load but have content now
        for key in owned_keys() {
            if self.key_order.iter().any(|k| k == key) {
                continue;
            }
            if let Some(value) = self.owned_section(key) {
                if !value_is_empty_mapping(&value) {
                    root.insert(Value::from(key), value);
                }
            }
        }
        Value::Mapping(root)
    }

    fn owned_section(&self, key: &str) -> Option<Value> {
        match key {
            METADATA_KEY => Some(Value::Mapping(self.metadata.clone())),
            CONFIGURATION_KEY => Some(Value::Mapping(self.configuration.clone())),
            MITIGATION_LINKS_KEY => Some(Value::Mapping(table_to_mapping(
                &self.mitigation_links,
                |r| Value::Mapping(r.as_mapping().clone()),
            ))),
            other => {
                let kind = CategoryKind::from_key(other).filter(|k| k.key() == other)?;
                Some(self.category(kind).to_value())
            }
        }
    }
}

fn category_slot(kind: CategoryKind) -> usize {
    match kind {
        CategoryKind::UserNeeds => 0,
        CategoryKind::Risks => 1,
        CategoryKind::ProductRequirements => 2,
        CategoryKind::SoftwareSpecifications => 3,
        CategoryKind::HardwareSpecifications => 4,
    }
}

fn owned_keys() -> Vec<&'static str> {
    let mut keys = vec![METADATA_KEY];
    keys.extend(CategoryKind::ALL.iter().map(|k| k.key()));
    keys.push(MITIGATION_LINKS_KEY);
    keys.push(CONFIGURATION_KEY);
    keys
}

fn is_owned_key(key: &str) -> bool {
    owned_keys().contains(&key)
}

/// A mapping is a group when it carries the category's child key, whatever
/// that key holds
fn mapping_is_group(kind: CategoryKind, mapping: &Mapping) -> bool {
    mapping.contains_key(kind.child_key())
}

fn is_group_shaped(kind: CategoryKind, value: &Value) -> bool {
    match value {
        Value::Mapping(m) => mapping_is_group(kind, m),
        _ => false,
    }
}

/// Mapping keys are strings in practice; scalar keys are stringified and
/// anything else is dropped
fn key_string(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            tracing::warn!(kind = value_kind(other), "dropping non-scalar mapping key");
            None
        }
    }
}

fn table_to_mapping<T>(table: &Table<T>, convert: impl Fn(&T) -> Value) -> Mapping {
    let mut out = Mapping::new();
    for (key, slot) in table.slots() {
        let value = match slot {
            Slot::Valid(value) => convert(value),
            Slot::Malformed(value) => value.clone(),
        };
        out.insert(Value::from(key.as_str()), value);
    }
    out
}

fn value_is_empty_mapping(value: &Value) -> bool {
    matches!(value, Value::Mapping(m) if m.is_empty())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a sequence",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
