use bibresolve_core::FieldSet;
use once_cell::sync::Lazy;
use regex::Regex;

static FIELD_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\w+)\s*=\s*\{([^}]*)\}").unwrap());
static TYPE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\w+)\{").unwrap());
static KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"@\w+\{([^,]+),").unwrap());

/// Pull `name = {value}` pairs, the entry type and the citation key out of a
/// record. Single-level scan: a value ends at its first closing brace, and
/// quoted or bare values are skipped. Names are lowercased, values trimmed,
/// and a repeated name keeps its last value.
pub fn extract_fields(record: &str) -> FieldSet {
    let mut fields = FieldSet::new();

    for caps in FIELD_REGEX.captures_iter(record) {
        fields.set(&caps[1], caps[2].trim());
    }
    if let Some(caps) = TYPE_REGEX.captures(record) {
        fields.set("entry_type", caps[1].to_lowercase());
    }
    if let Some(caps) = KEY_REGEX.captures(record) {
        fields.set("key", caps[1].trim());
    }

    fields
}
