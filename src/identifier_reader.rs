use crate::archive::ReadingArchive;
use crate::file_handler::cache_path_for;
use crate::identifier::{Identifier, IdentifierSet};
use crate::record::Record;
use crate::RegroupError;
use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use tracing::debug;

/// Phase 1 component: extracts the identifier set of one archive.
pub trait ReadIdentifiers: Send {
    fn read(&mut self, archive: &Path) -> Result<IdentifierSet, RegroupError>;
}

/// Reads identifiers from archive records, caching the result in a JSON file
/// next to the archive.
///
/// An existing cache file always wins over the archive contents, which lets
/// operators pin the identifier set of an archive by hand.
pub struct IdentifierReader<R> {
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> IdentifierReader<R> {
    pub fn new() -> Self {
        Self {
            _record: PhantomData,
        }
    }

    pub fn read_ids(&self, archive: &Path) -> Result<IdentifierSet, RegroupError> {
        if archive.as_os_str().is_empty() {
            return Err(RegroupError::InvalidPath("empty archive path".to_string()));
        }
        if !archive.is_file() {
            return Err(RegroupError::NotFound(archive.to_path_buf()));
        }

        let cache = cache_path_for(archive);
        if cache.is_file() {
            debug!("[ids] Using cached identifiers {}", cache.display());
            return read_cache(&cache);
        }

        let mut ids = IdentifierSet::default();
        for record in ReadingArchive::<R>::open(archive)? {
            ids.extend(record?.identifiers());
        }

        write_cache(&cache, &ids)?;
        debug!("[ids] {} identifiers in {}", ids.len(), archive.display());
        Ok(ids)
    }
}

impl<R: Record> Default for IdentifierReader<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> ReadIdentifiers for IdentifierReader<R> {
    fn read(&mut self, archive: &Path) -> Result<IdentifierSet, RegroupError> {
        self.read_ids(archive)
    }
}

fn read_cache(cache: &Path) -> Result<IdentifierSet, RegroupError> {
    let bytes = fs::read(cache)?;
    let values: Vec<String> = serde_json::from_slice(&bytes)?;
    Ok(values.into_iter().filter_map(Identifier::from_qualified).collect())
}

fn write_cache(cache: &Path, ids: &IdentifierSet) -> Result<(), RegroupError> {
    let mut sorted: Vec<&Identifier> = ids.iter().collect();
    sorted.sort();
    let json = serde_json::to_vec_pretty(&sorted)?;

    let part = cache.with_extension("ids.part");
    fs::write(&part, json)?;
    fs::rename(&part, cache)?;
    Ok(())
}
