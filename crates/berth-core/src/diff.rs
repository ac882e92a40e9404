//! Field diff rendering for drift reports
//!
//! The observable contract is "non-empty means recreate"; the rendered
//! form only feeds log output.

use serde::Serialize;

/// Compare two values, rendering both sides when they differ
pub fn diff<T: Serialize + PartialEq>(current: &T, desired: &T) -> Option<String> {
    if current == desired {
        return None;
    }

    Some(format!(
        "current:\n{}desired:\n{}",
        render(current),
        render(desired)
    ))
}

fn render<T: Serialize>(value: &T) -> String {
    serde_yaml::to_string(value).unwrap_or_else(|_| "<unserializable>\n".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_values_have_no_diff() {
        assert!(diff(&1, &1).is_none());
        assert!(diff(&"a".to_string(), &"a".to_string()).is_none());
    }

    #[test]
    fn test_diff_renders_both_sides() {
        let rendered = diff(&"old".to_string(), &"new".to_string()).unwrap();
        assert!(rendered.contains("current:"));
        assert!(rendered.contains("old"));
        assert!(rendered.contains("desired:"));
        assert!(rendered.contains("new"));
    }
}
