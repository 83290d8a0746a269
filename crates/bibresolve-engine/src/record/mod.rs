pub mod extract;
pub mod rewrite;

pub use extract::extract_fields;
pub use rewrite::{
    field_names, field_value, insert_field_if_absent, order_fields, remove_field, replace_key,
    upsert_field,
};
