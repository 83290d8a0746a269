pub mod batch;
pub mod entry;
pub mod fields;

pub use batch::BatchResult;
pub use entry::{Entry, EntryMetadata, EntryStatus, UNKNOWN_KEY};
pub use fields::FieldSet;
