//! Import graph.
//!
//! Pure in-memory bookkeeping of who imports whom, which modules
//! self-accept hot updates, which importers accept specific dependencies,
//! and which modules are dirty under which change timestamp. Modules are
//! identified by their clean id: the public path with query and fragment
//! stripped. The graph stores only these strings, never module objects, so
//! the importer/importee cycle carries no ownership cycle.
//!
//! Entries are created the first time a module is rewritten and live for
//! the server session; memory is bounded by the project's module count.

use rustc_hash::{FxHashMap, FxHashSet};

/// Bidirectional import relations plus HMR bookkeeping.
#[derive(Debug, Default)]
pub struct ImportGraph {
    /// importee -> set of modules importing it
    importers: FxHashMap<String, FxHashSet<String>>,
    /// importer -> set of modules it imports
    importees: FxHashMap<String, FxHashSet<String>>,
    /// Modules that call `import.meta.hot.accept()` on themselves.
    hmr_boundaries: FxHashSet<String>,
    /// accepter -> importees it explicitly accepts
    accepted_by: FxHashMap<String, FxHashSet<String>>,
    /// change timestamp -> modules whose re-fetches must be version-stamped
    dirty_files: FxHashMap<u64, FxHashSet<String>>,
    /// Last known version of each module; non-decreasing.
    latest_versions: FxHashMap<String, u64>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `importer` imports `importee`. Keeps both directions in
    /// step.
    pub fn add_edge(&mut self, importee: &str, importer: &str) {
        self.importers
            .entry(importee.to_string())
            .or_default()
            .insert(importer.to_string());
        self.importees
            .entry(importer.to_string())
            .or_default()
            .insert(importee.to_string());
    }

    pub fn remove_edge(&mut self, importee: &str, importer: &str) {
        if let Some(set) = self.importers.get_mut(importee) {
            set.remove(importer);
        }
        if let Some(set) = self.importees.get_mut(importer) {
            set.remove(importee);
        }
    }

    /// Replace `importer`'s importee set with `current`, removing reverse
    /// edges for anything no longer imported.
    pub fn reconcile_importees(&mut self, importer: &str, current: FxHashSet<String>) {
        let previous = self.importees.get(importer).cloned().unwrap_or_default();
        for stale in previous.difference(&current) {
            if let Some(set) = self.importers.get_mut(stale) {
                set.remove(importer);
            }
        }
        for importee in &current {
            self.importers
                .entry(importee.clone())
                .or_default()
                .insert(importer.to_string());
        }
        self.importees.insert(importer.to_string(), current);
    }

    /// Empty a deleted module's importee set. Its importers are left in
    /// place so anything still referencing it fails with a useful 404.
    pub fn clear_importees(&mut self, id: &str) {
        self.reconcile_importees(id, FxHashSet::default());
    }

    pub fn importers_of(&self, id: &str) -> Option<&FxHashSet<String>> {
        self.importers.get(id)
    }

    pub fn importees_of(&self, id: &str) -> Option<&FxHashSet<String>> {
        self.importees.get(id)
    }

    /// Record the modules made dirty by the change event at `timestamp`.
    pub fn mark_dirty(&mut self, timestamp: u64, ids: impl IntoIterator<Item = String>) {
        self.dirty_files.entry(timestamp).or_default().extend(ids);
    }

    pub fn is_dirty(&self, timestamp: u64, id: &str) -> bool {
        self.dirty_files
            .get(&timestamp)
            .is_some_and(|set| set.contains(id))
    }

    /// Bump a module's version stamp. Stamps never move backwards.
    pub fn record_version(&mut self, id: &str, timestamp: u64) {
        let entry = self.latest_versions.entry(id.to_string()).or_insert(0);
        if timestamp > *entry {
            *entry = timestamp;
        }
    }

    pub fn latest_version(&self, id: &str) -> Option<u64> {
        self.latest_versions.get(id).copied()
    }

    /// Replace a module's HMR acceptance state after a rewrite.
    pub fn set_hmr_accepts(&mut self, importer: &str, self_accepting: bool, deps: Vec<String>) {
        if self_accepting {
            self.hmr_boundaries.insert(importer.to_string());
        } else {
            self.hmr_boundaries.remove(importer);
        }
        if deps.is_empty() {
            self.accepted_by.remove(importer);
        } else {
            self.accepted_by
                .insert(importer.to_string(), deps.into_iter().collect());
        }
    }

    pub fn is_self_accepting(&self, id: &str) -> bool {
        self.hmr_boundaries.contains(id)
    }

    /// Does `accepter` declare that it can hot-swap `importee`?
    pub fn accepts_importee(&self, accepter: &str, importee: &str) -> bool {
        self.accepted_by
            .get(accepter)
            .is_some_and(|set| set.contains(importee))
    }

    /// Number of modules known to the graph.
    pub fn module_count(&self) -> usize {
        self.importees.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> FxHashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// b in importers[a] iff a in importees[b], across edge ops.
    fn assert_bidirectional(graph: &ImportGraph) {
        for (importee, importers) in &graph.importers {
            for importer in importers {
                assert!(
                    graph
                        .importees_of(importer)
                        .is_some_and(|s| s.contains(importee)),
                    "importers[{importee}] contains {importer} but reverse edge is missing"
                );
            }
        }
        for (importer, importees) in &graph.importees {
            for importee in importees {
                assert!(
                    graph
                        .importers_of(importee)
                        .is_some_and(|s| s.contains(importer)),
                    "importees[{importer}] contains {importee} but reverse edge is missing"
                );
            }
        }
    }

    #[test]
    fn test_add_and_remove_edge() {
        let mut graph = ImportGraph::new();
        graph.add_edge("/b.js", "/a.js");
        assert!(graph.importers_of("/b.js").unwrap().contains("/a.js"));
        assert!(graph.importees_of("/a.js").unwrap().contains("/b.js"));
        assert_bidirectional(&graph);

        graph.remove_edge("/b.js", "/a.js");
        assert!(!graph.importers_of("/b.js").unwrap().contains("/a.js"));
        assert_bidirectional(&graph);
    }

    #[test]
    fn test_reconcile_removes_stale_reverse_edges() {
        let mut graph = ImportGraph::new();
        graph.add_edge("/b.js", "/a.js");
        graph.add_edge("/c.js", "/a.js");

        // a.js now imports only c.js and d.js.
        graph.reconcile_importees("/a.js", set(&["/c.js", "/d.js"]));

        assert!(!graph.importers_of("/b.js").unwrap().contains("/a.js"));
        assert!(graph.importers_of("/c.js").unwrap().contains("/a.js"));
        assert!(graph.importers_of("/d.js").unwrap().contains("/a.js"));
        assert_bidirectional(&graph);
    }

    #[test]
    fn test_unlink_keeps_importers() {
        let mut graph = ImportGraph::new();
        graph.add_edge("/b.js", "/a.js");
        graph.add_edge("/c.js", "/b.js");

        graph.clear_importees("/b.js");

        // b.js no longer imports anything...
        assert!(graph.importees_of("/b.js").unwrap().is_empty());
        assert!(!graph.importers_of("/c.js").unwrap().contains("/b.js"));
        // ...but a.js still records its (now dangling) import of b.js.
        assert!(graph.importers_of("/b.js").unwrap().contains("/a.js"));
        assert_bidirectional(&graph);
    }

    #[test]
    fn test_versions_are_monotonic() {
        let mut graph = ImportGraph::new();
        graph.record_version("/a.js", 100);
        graph.record_version("/a.js", 50);
        assert_eq!(graph.latest_version("/a.js"), Some(100));
        graph.record_version("/a.js", 200);
        assert_eq!(graph.latest_version("/a.js"), Some(200));
    }

    #[test]
    fn test_dirty_sets_are_per_timestamp() {
        let mut graph = ImportGraph::new();
        graph.mark_dirty(100, vec!["/a.js".to_string()]);
        graph.mark_dirty(200, vec!["/b.js".to_string()]);
        assert!(graph.is_dirty(100, "/a.js"));
        assert!(!graph.is_dirty(100, "/b.js"));
        assert!(graph.is_dirty(200, "/b.js"));
        assert!(!graph.is_dirty(300, "/a.js"));
    }

    #[test]
    fn test_hmr_accept_state_is_replaced() {
        let mut graph = ImportGraph::new();
        graph.set_hmr_accepts("/a.js", true, vec!["/b.js".to_string()]);
        assert!(graph.is_self_accepting("/a.js"));
        assert!(graph.accepts_importee("/a.js", "/b.js"));

        // A later rewrite without any accept call clears the state.
        graph.set_hmr_accepts("/a.js", false, vec![]);
        assert!(!graph.is_self_accepting("/a.js"));
        assert!(!graph.accepts_importee("/a.js", "/b.js"));
    }
}
