use serde_json::Value;

use crate::utils::error::Result;

/// Pretty-prints a payload the way it is shown for review and editing.
pub fn pretty_json(value: &Value) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Splits a dotted field path such as `assigned_user.email` or
/// `contacts.[*].email` into navigation segments.
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|segment| !segment.is_empty()).collect()
}

/// Checks if a dotted path resolves to at least one value.
pub fn json_path_exists(json: &Value, path: &str) -> bool {
    !navigate_json_path(json, &split_path(path)).is_empty()
}

/// Returns the first value found at a dotted path.
pub fn value_at_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    navigate_json_path(json, &split_path(path)).into_iter().next()
}

/// Navigates through a JSON structure using a path array.
/// Returns all matching values at the end of the path.
/// `[*]` iterates an array, a numeric segment indexes into one.
pub fn navigate_json_path<'a>(current: &'a Value, path: &[&str]) -> Vec<&'a Value> {
    if path.is_empty() {
        return vec![current];
    }

    let segment = path[0];
    let remaining_path = &path[1..];

    match segment {
        "[*]" => current
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .flat_map(|item| navigate_json_path(item, remaining_path))
                    .collect()
            })
            .unwrap_or_default(),
        field_name => {
            let next = match current {
                Value::Array(items) => field_name
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index)),
                _ => current.get(field_name),
            };
            match next {
                Some(value) => navigate_json_path(value, remaining_path),
                None => vec![],
            }
        }
    }
}

/// Renders a scalar for comparison against configured expectations:
/// strings lose their quotes, everything else uses its JSON form.
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// True when the value is a non-empty string or any non-null scalar.
pub fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(text)) => !text.trim().is_empty(),
        Some(_) => true,
    }
}
