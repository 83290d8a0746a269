pub mod doi;

pub use doi::{Doi, clean_doi, is_valid_doi, parse_identifiers};
