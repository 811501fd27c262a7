//! Mapping between the list collection and the remote document.

use std::collections::HashSet;

use tracing::warn;

use super::remote::RemoteDocument;
use crate::models::List;
use crate::ordering;

/// Keys the remote document by list id.
pub fn encode(lists: &[List]) -> RemoteDocument {
    lists
        .iter()
        .filter_map(|list| match serde_json::to_value(list) {
            Ok(value) => Some((list.id().to_string(), value)),
            Err(e) => {
                warn!(list = %list.id(), "Failed to encode list: {}", e);
                None
            }
        })
        .collect()
}

/// Materializes the lists of a remote document.
///
/// The probe key and anything that is not a valid list are skipped entry by
/// entry; survivors are sorted by `order` and renumbered.
pub fn decode(document: &RemoteDocument, probe_key: &str) -> Vec<List> {
    let mut seen = HashSet::new();
    let mut lists = Vec::with_capacity(document.len());

    for (key, value) in document {
        if key == probe_key {
            continue;
        }
        if !value.is_object() {
            warn!(key = %key, "Ignoring non-object remote entry");
            continue;
        }
        match List::from_value(value) {
            Ok(list) if seen.insert(list.id().to_string()) => lists.push(list),
            Ok(list) => warn!(list = %list.id(), "Dropping duplicate remote list"),
            Err(e) => warn!(key = %key, "Dropping invalid remote list: {}", e),
        }
    }

    // Ties in `order` keep key order
    ordering::normalize(&mut lists);
    lists
}
