//! Hot module replacement.
//!
//! When a file changes, the propagator walks the import graph upward from
//! the changed module looking for boundaries: modules that accept the
//! update, either for themselves or for the specific dependency that
//! changed. Everything visited on the way that is not a boundary becomes
//! dirty under the change timestamp, so subsequent re-fetches of those
//! modules carry `?t=` version stamps that bypass the browser's HTTP cache.
//! A walk that escapes through a module nobody imports gives up and asks
//! the browser for a full reload.

pub mod ws;

use std::collections::VecDeque;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::graph::ImportGraph;

/// Kind of one boundary update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HmrUpdateKind {
    JsUpdate,
    VueReload,
    VueRerender,
    StyleUpdate,
    StyleRemove,
}

/// One boundary that accepts the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HmrUpdate {
    #[serde(rename = "type")]
    pub kind: HmrUpdateKind,
    /// The boundary module to re-import.
    pub path: String,
    /// The module the boundary accepted (itself when self-accepting).
    #[serde(rename = "acceptedPath")]
    pub accepted_path: String,
    pub timestamp: u64,
}

/// Server → client message on the HMR websocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HmrMessage {
    /// Handshake after the socket opens.
    Connected,
    Update {
        timestamp: u64,
        updates: Vec<HmrUpdate>,
    },
    FullReload {
        timestamp: u64,
        path: String,
    },
}

/// Compute the update for a change to `clean_id` at `timestamp`.
///
/// Records the new version, walks importers breadth-first until every path
/// terminates at a boundary, marks the traversed non-boundary modules
/// dirty, and returns the message to broadcast. The walk stops descending
/// through a boundary; a module with no importers that doesn't accept the
/// change turns the whole update into a full reload.
pub fn propagate(graph: &mut ImportGraph, clean_id: &str, timestamp: u64) -> HmrMessage {
    graph.record_version(clean_id, timestamp);

    let mut visited: FxHashSet<String> = FxHashSet::default();
    let mut dirty: FxHashSet<String> = FxHashSet::default();
    dirty.insert(clean_id.to_string());

    let mut boundaries: Vec<(String, String)> = Vec::new();
    let mut queue: VecDeque<String> = VecDeque::new();
    queue.push_back(clean_id.to_string());

    let mut needs_full_reload = false;

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node.clone()) {
            continue;
        }

        if graph.is_self_accepting(&node) {
            boundaries.push((node.clone(), node));
            continue;
        }

        let importers: Vec<String> = graph
            .importers_of(&node)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let accepters: Vec<String> = importers
            .iter()
            .filter(|p| graph.accepts_importee(p, &node))
            .cloned()
            .collect();
        if !accepters.is_empty() {
            for accepter in accepters {
                boundaries.push((accepter, node.clone()));
            }
            continue;
        }

        if importers.is_empty() {
            needs_full_reload = true;
            break;
        }

        dirty.insert(node.clone());
        for importer in importers {
            queue.push_back(importer);
        }
    }

    graph.mark_dirty(timestamp, dirty);

    if needs_full_reload {
        return HmrMessage::FullReload {
            timestamp,
            path: clean_id.to_string(),
        };
    }

    let mut updates: Vec<HmrUpdate> = boundaries
        .into_iter()
        .map(|(path, accepted_path)| HmrUpdate {
            kind: HmrUpdateKind::JsUpdate,
            path,
            accepted_path,
            timestamp,
        })
        .collect();
    updates.sort_by(|a, b| a.path.cmp(&b.path));
    HmrMessage::Update { timestamp, updates }
}
