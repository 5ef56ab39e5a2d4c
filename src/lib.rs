pub mod archive;
pub mod cleaner;
pub mod error;
pub mod event;
pub mod file_handler;
pub mod filter;
pub mod group_merger;
pub mod grouper;
pub mod identifier;
pub mod identifier_reader;
pub mod logging;
pub mod preprocessing;
pub mod preprocessing_data;
pub mod record;

pub use error::*;
pub use identifier::{Identifier, IdentifierSet};
pub use record::Record;
