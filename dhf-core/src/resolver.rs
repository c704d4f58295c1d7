//! Identifier resolution across every category and storage shape

use crate::document::{Category, Children, DhfDocument, Entry, ItemLocation, LocatedItem};
use crate::models::{CategoryKind, Record};

/// An item together with its exact storage location
#[derive(Debug, Clone)]
pub struct Resolved<'a> {
    pub location: ItemLocation,
    pub record: &'a Record,
}

impl DhfDocument {
    /// Finds an item by identifier
    ///
    /// Categories are searched in a fixed order (user needs, risks, product
    /// requirements, software specifications, hardware specifications) and
    /// the first match wins; identifiers are unique by convention only.
    pub fn resolve(&self, id: &str) -> Option<Resolved<'_>> {
        let found = CategoryKind::ALL.into_iter().find_map(|kind| {
            find_in_category(self.category(kind), id).map(|item| Resolved {
                location: item.location(kind),
                record: item.record,
            })
        });
        match &found {
            Some(resolved) => tracing::debug!(id, location = %resolved.location, "resolved item"),
            None => tracing::debug!(id, "no item with this id"),
        }
        found
    }

    /// Returns a mutable reference to the record at `location`
    pub fn record_mut(&mut self, location: &ItemLocation) -> Option<&mut Record> {
        let category = self.category_mut(location.category);
        let Some(group_key) = &location.group else {
            return match category.entries.get_mut(&location.id) {
                Some(Entry::Item(record)) => Some(record),
                _ => None,
            };
        };

        let group = category.group_mut(group_key)?;
        match (&mut group.children, &location.subgroup) {
            (Children::Items(items), None) => items.get_mut(&location.id),
            (Children::Subgroups(subgroups), Some(sub_key)) => {
                match &mut subgroups.get_mut(sub_key)?.children {
                    Children::Items(items) => items.get_mut(&location.id),
                    Children::Subgroups(_) => None,
                }
            }
            _ => None,
        }
    }

    /// Resolves `id` and hands back a mutable reference to its record
    pub fn resolve_mut(&mut self, id: &str) -> Option<(ItemLocation, &mut Record)> {
        let location = self.resolve(id)?.location;
        let record = self.record_mut(&location)?;
        Some((location, record))
    }
}

/// Flat match first, then each group (and subgroup) in stored order
fn find_in_category<'a>(category: &'a Category, id: &str) -> Option<LocatedItem<'a>> {
    if let Some((key, Entry::Item(record))) = category.entries.get_key_value(id) {
        return Some(LocatedItem {
            group: None,
            subgroup: None,
            id: key,
            record,
        });
    }

    for (group_key, group) in category.groups() {
        match &group.children {
            Children::Items(items) => {
                if let Some((id, record)) = items.get_key_value(id) {
                    return Some(LocatedItem {
                        group: Some(group_key),
                        subgroup: None,
                        id,
                        record,
                    });
                }
            }
            Children::Subgroups(subgroups) => {
                for (sub_key, sub) in subgroups.iter() {
                    if let Children::Items(items) = &sub.children {
                        if let Some((id, record)) = items.get_key_value(id) {
                            return Some(LocatedItem {
                                group: Some(group_key),
                                subgroup: Some(sub_key),
                                id,
                                record,
                            });
                        }
                    }
                }
            }
        }
    }
    None
}
