use crate::identifier::Identifier;
use bincode::{Decode, Encode};
use smallvec::SmallVec;
use std::hash::Hash;

/// Identifiers yielded by a single record; most records carry one or two.
pub type RecordIds = SmallVec<[Identifier; 2]>;

/// A stored telemetry record as seen by the preprocessing pipeline.
///
/// The pipeline only needs a total order key, structural equality (used for
/// duplicate removal) and an optional identifier extraction. Everything else
/// about the record is opaque.
pub trait Record: Encode + Decode<()> + Clone + Eq + Hash + Send + 'static {
    type Timestamp: Ord + Copy;

    fn timestamp(&self) -> Self::Timestamp;

    /// Identifiers that tie this record to a user. Must never contain blank values.
    fn identifiers(&self) -> RecordIds {
        RecordIds::new()
    }
}
