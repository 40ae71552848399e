//! Whole-store backup documents
//!
//! A document maps group names to entry titles to entry contents:
//!
//! ```json
//! { "History": { "Treaty of Ghent": { "creator": "Adams", "notes": "...", "date": "2016-03-01" } } }
//! ```

use crate::db::{Entry, Group};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::collections::BTreeMap;

pub type Document = BTreeMap<String, BTreeMap<String, DocumentEntry>>;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentEntry {
    pub creator: String,
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// Builds a document from every group and its entries
///
/// Groups sharing a name end up in the same object.
pub fn export(store: &[(u64, Group, Vec<(u64, Entry)>)]) -> Document {
    let mut doc = Document::new();
    for (_, group, entries) in store {
        let titles = doc.entry(group.name.clone()).or_default();
        for (_, e) in entries {
            titles.insert(
                e.title.clone(),
                DocumentEntry {
                    creator: e.creator.clone(),
                    notes: e.notes.clone(),
                    date: Some(e.date_added),
                },
            );
        }
    }
    doc
}

/// Serializes a document with four space indentation
pub fn to_pretty_json(doc: &Document) -> serde_json::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser)?;
    Ok(buf)
}

pub fn parse(bytes: &[u8]) -> serde_json::Result<Document> {
    serde_json::from_slice(bytes)
}

/// Changes needed to merge a document into the store
#[derive(Debug, Default, PartialEq)]
pub struct Plan {
    pub groups: Vec<GroupPlan>,
}

#[derive(Debug, PartialEq)]
pub struct GroupPlan {
    pub name: String,
    /// Existing group receiving the entries, a new one is created if `None`
    pub existing: Option<u64>,
    /// Matched entries and their replacement notes
    pub updated: Vec<(u64, String)>,
    pub created: Vec<NewEntry>,
}

#[derive(Debug, PartialEq)]
pub struct NewEntry {
    pub title: String,
    pub creator: String,
    pub notes: String,
    pub date_added: NaiveDate,
}

/// Matches a document against the store
///
/// Group names resolve to the first group carrying that name. Entries match on title and creator
/// within that group only. Unmatched entries keep their document date, or `today` without one.
pub fn plan(doc: Document, store: &[(u64, Group, Vec<(u64, Entry)>)], today: NaiveDate) -> Plan {
    let mut plan = Plan::default();
    for (name, titles) in doc {
        let existing = store.iter().find(|(_, g, _)| g.name == name);
        let mut gp = GroupPlan {
            name,
            existing: existing.map(|(id, ..)| *id),
            updated: Vec::new(),
            created: Vec::new(),
        };

        for (title, de) in titles {
            let matched = existing.and_then(|(_, _, entries)| {
                entries
                    .iter()
                    .find(|(_, e)| e.title == title && e.creator == de.creator)
            });
            match matched {
                Some((id, _)) => gp.updated.push((*id, de.notes)),
                None => gp.created.push(NewEntry {
                    title,
                    creator: de.creator,
                    notes: de.notes,
                    date_added: de.date.unwrap_or(today),
                }),
            }
        }

        plan.groups.push(gp);
    }
    plan
}
