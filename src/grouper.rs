use crate::identifier::IdentifierSet;
use crate::logging::{GrouperLogger, NoopLogger};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Archives that belong to the same user; the unit of merging.
pub type Group = BTreeSet<PathBuf>;

/// Accumulates archives and identifiers while grouping. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub archives: BTreeSet<PathBuf>,
    pub identifiers: IdentifierSet,
}

impl User {
    fn single(archive: &Path, identifiers: &IdentifierSet) -> Self {
        let mut archives = BTreeSet::new();
        archives.insert(archive.to_path_buf());
        User {
            archives,
            identifiers: identifiers.clone(),
        }
    }

    fn overlaps(&self, identifiers: &IdentifierSet) -> bool {
        let (small, large) = if self.identifiers.len() <= identifiers.len() {
            (&self.identifiers, identifiers)
        } else {
            (identifiers, &self.identifiers)
        };
        small.iter().any(|id| large.contains(id))
    }

    fn absorb(&mut self, other: User) {
        self.archives.extend(other.archives);
        self.identifiers.extend(other.identifiers);
    }
}

/// Partitions archives into groups connected by shared identifiers.
pub trait GroupArchives: Send + Sync {
    fn group_related_archives(&self, archives: &FxHashMap<PathBuf, IdentifierSet>) -> Vec<Group>;
}

/// Single pass over all archives, keeping a working set of users whose
/// identifier sets are pairwise disjoint. Every archive either starts a new
/// user or fuses all users it overlaps with.
///
/// Cost grows with the number of live users at each step (quadratic in the
/// worst case), which is fine for tens of thousands of archives.
pub struct Grouper {
    logger: Arc<dyn GrouperLogger>,
}

impl Grouper {
    pub fn new(logger: Arc<dyn GrouperLogger>) -> Self {
        Self { logger }
    }

    /// Groups the given archives. The result does not depend on the order in
    /// which archives are supplied: groups are sorted, and so are their members.
    pub fn group<'a, I>(&self, archives: I) -> Vec<Group>
    where
        I: IntoIterator<Item = (&'a PathBuf, &'a IdentifierSet)>,
    {
        let entries: Vec<(&Path, &IdentifierSet)> = archives
            .into_iter()
            .map(|(archive, ids)| (archive.as_path(), ids))
            .collect();

        self.logger.init();
        self.logger.archives(&entries);

        let mut users: Vec<User> = Vec::new();
        for (archive, ids) in &entries {
            let mut current = User::single(archive, ids);

            let mut i = 0;
            while i < users.len() {
                if users[i].overlaps(&current.identifiers) {
                    let matched = users.swap_remove(i);
                    current.absorb(matched);
                } else {
                    i += 1;
                }
            }

            users.push(current);
        }

        self.logger.users(&users);

        let mut groups: Vec<Group> = users.into_iter().map(|user| user.archives).collect();
        groups.sort();
        groups
    }
}

impl Default for Grouper {
    fn default() -> Self {
        Self::new(Arc::new(NoopLogger))
    }
}

impl GroupArchives for Grouper {
    fn group_related_archives(&self, archives: &FxHashMap<PathBuf, IdentifierSet>) -> Vec<Group> {
        self.group(archives)
    }
}
