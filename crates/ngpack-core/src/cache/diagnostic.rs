use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};

use crate::diagnostics::Diagnostic;
use crate::program::SourceFile;

struct Entry {
    file: Weak<SourceFile>,
    diagnostics: Vec<Diagnostic>,
}

/// Template diagnostics keyed by source-file identity.
///
/// Entries hold only a weak reference, so a file replaced by a newer
/// allocation can never match its stale entry. The weak reference also keeps
/// the allocation address reserved, which makes the address a sound key.
#[derive(Default)]
pub struct DiagnosticCache {
    entries: FxHashMap<usize, Entry>,
}

fn identity(file: &Arc<SourceFile>) -> usize {
    Arc::as_ptr(file) as usize
}

impl DiagnosticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, file: &Arc<SourceFile>) -> Option<&[Diagnostic]> {
        let entry = self.entries.get(&identity(file))?;
        if entry.file.strong_count() == 0 || entry.file.as_ptr() != Arc::as_ptr(file) {
            return None;
        }
        Some(&entry.diagnostics)
    }

    pub fn insert(&mut self, file: &Arc<SourceFile>, diagnostics: Vec<Diagnostic>) {
        self.entries.insert(
            identity(file),
            Entry {
                file: Arc::downgrade(file),
                diagnostics,
            },
        );
    }

    /// Drop entries whose file no longer exists
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.file.strong_count() > 0);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Module;
    use crate::span::Span;

    fn file(text: &str) -> Arc<SourceFile> {
        Arc::new(SourceFile::new(
            "/src/app.component.ts",
            text,
            Module::new(Vec::new(), Span::dummy()),
        ))
    }

    #[test]
    fn test_entry_matches_same_allocation_only() {
        let mut cache = DiagnosticCache::new();
        let original = file("a");
        cache.insert(&original, vec![Diagnostic::error(8001, "unknown element")]);

        assert_eq!(cache.get(&original).map(|d| d.len()), Some(1));

        let replacement = file("a");
        assert!(cache.get(&replacement).is_none());
    }

    #[test]
    fn test_prune_drops_released_files() {
        let mut cache = DiagnosticCache::new();
        let kept = file("kept");
        cache.insert(&kept, Vec::new());
        {
            let dropped = file("dropped");
            cache.insert(&dropped, Vec::new());
        }

        assert_eq!(cache.prune(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&kept).is_some());
    }
}
