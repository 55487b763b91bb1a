//! Reconcile the persisted reference set with the one found in source

use crate::reference::Reference;
use std::collections::HashSet;
use tracing::info;

/// Outcome of [`reconcile`].
#[derive(Debug)]
pub struct Reconciliation {
    /// Surviving references, sorted by (kind, canonical URL).
    pub references: Vec<Reference>,
    pub added: usize,
    pub removed: usize,
}

impl Reconciliation {
    pub fn source_changed(&self) -> bool {
        self.added > 0 || self.removed > 0
    }
}

/// Keep exactly the references found in source.
///
/// A reference present on both sides keeps its persisted instance, and so
/// its watermarks.
pub fn reconcile(mut persisted: HashSet<Reference>, found: HashSet<Reference>) -> Reconciliation {
    let mut removed = 0;
    for reference in persisted.iter().filter(|r| !found.contains(*r)) {
        info!(kind = %reference.kind(), url = %reference.canonical_url(), "removed from source");
        removed += 1;
    }

    let mut added = 0;
    let mut references: Vec<Reference> = found
        .into_iter()
        .map(|reference| match persisted.take(&reference) {
            Some(kept) => kept,
            None => {
                info!(kind = %reference.kind(), url = %reference.canonical_url(), "added from source");
                added += 1;
                reference
            }
        })
        .collect();

    references.sort_by_cached_key(|r| (r.kind().tag(), r.canonical_url()));

    Reconciliation {
        references,
        added,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::GithubRef;
    use crate::stackexchange::StackExchangeRef;

    fn issue(number: u64) -> Reference {
        Reference::Issue(GithubRef::new("octo/widgets", number))
    }

    fn question(id: u64, last_edit_date: Option<i64>) -> Reference {
        let mut r = StackExchangeRef::new("stackoverflow.com", id);
        r.last_edit_date = last_edit_date;
        Reference::Question(r)
    }

    #[test]
    fn test_unchanged_sets() {
        let persisted: HashSet<_> = [issue(1), question(2, Some(5))].into_iter().collect();
        let found: HashSet<_> = [issue(1), question(2, None)].into_iter().collect();

        let result = reconcile(persisted, found);
        assert!(!result.source_changed());
        assert_eq!(result.references.len(), 2);
    }

    #[test]
    fn test_overlap_keeps_persisted_watermarks() {
        let persisted: HashSet<_> = [question(2, Some(5)), issue(9)].into_iter().collect();
        let found: HashSet<_> = [question(2, None), issue(1)].into_iter().collect();

        let result = reconcile(persisted, found);
        assert!(result.source_changed());
        assert_eq!(result.added, 1);
        assert_eq!(result.removed, 1);

        let kept = result
            .references
            .iter()
            .find_map(|r| match r {
                Reference::Question(q) => Some(q),
                _ => None,
            })
            .unwrap();
        assert_eq!(kept.last_edit_date, Some(5));
        assert!(!result.references.contains(&issue(9)));
        assert!(result.references.contains(&issue(1)));
    }

    #[test]
    fn test_only_additions() {
        let persisted = HashSet::new();
        let found: HashSet<_> = [issue(1)].into_iter().collect();

        let result = reconcile(persisted, found);
        assert!(result.source_changed());
        assert_eq!((result.added, result.removed), (1, 0));
    }

    #[test]
    fn test_only_removals() {
        let persisted: HashSet<_> = [issue(1)].into_iter().collect();

        let result = reconcile(persisted, HashSet::new());
        assert!(result.source_changed());
        assert!(result.references.is_empty());
        assert_eq!((result.added, result.removed), (0, 1));
    }

    #[test]
    fn test_sorted_by_kind_then_url() {
        let found: HashSet<_> = [question(3, None), issue(20), issue(3)].into_iter().collect();
        let result = reconcile(HashSet::new(), found);

        let urls: Vec<String> = result.references.iter().map(Reference::canonical_url).collect();
        assert_eq!(
            urls,
            vec![
                "https://github.com/octo/widgets/issues/20",
                "https://github.com/octo/widgets/issues/3",
                "https://stackoverflow.com/q/3",
            ]
        );
    }
}
