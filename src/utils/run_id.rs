use chrono::{DateTime, Local};
use uuid::Uuid;

/// Test run identifier in the `YYYYmmdd_HHMMSS` form used to tag generated
/// records and report files.
pub fn new_test_run_id() -> String {
    test_run_id_at(Local::now())
}

pub fn test_run_id_at(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

pub fn record_id(run_id: &str, sequence_number: usize) -> String {
    format!("{}_{:03}", run_id, sequence_number)
}

/// Fallback organization id when none is given on the command line.
pub fn new_organization_id() -> String {
    format!("org-{}", Uuid::new_v4().simple())
}

/// Reduces free text to something safe inside an email local part or file
/// name: lowercase ASCII alphanumerics, `_` and `-`.
pub fn slug(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| match c {
            c if c.is_ascii_alphanumeric() => c.to_ascii_lowercase(),
            '-' => '-',
            _ => '_',
        })
        .collect()
}

/// `monitorbase` -> `Monitorbase`, `lead_source` -> `Lead_Source`.
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}
