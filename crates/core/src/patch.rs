//! Serde helper for PATCH bodies.
//!
//! A nullable field in a partial update has three states: absent (keep),
//! `null` (clear) and a value (set). Pair this with `#[serde(default)]`:
//!
//! ```ignore
//! #[serde(default, deserialize_with = "calculaud_core::patch::nullable")]
//! pub supplier_id: Option<Option<SupplierId>>,
//! ```

use serde::{Deserialize, Deserializer};

pub fn nullable<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Resolve a three-state patch field against the current value.
pub fn merge<T: Clone>(patch: &Option<Option<T>>, current: &Option<T>) -> Option<T> {
    match patch {
        Some(value) => value.clone(),
        None => current.clone(),
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default, deserialize_with = "super::nullable")]
        value: Option<Option<i64>>,
    }

    #[test]
    fn distinguishes_absent_null_and_value() {
        let absent: Body = serde_json::from_str("{}").unwrap();
        let null: Body = serde_json::from_str(r#"{"value": null}"#).unwrap();
        let set: Body = serde_json::from_str(r#"{"value": 4}"#).unwrap();
        assert_eq!(absent.value, None);
        assert_eq!(null.value, Some(None));
        assert_eq!(set.value, Some(Some(4)));
    }

    #[test]
    fn merge_keeps_current_when_absent() {
        assert_eq!(super::merge(&None, &Some(1)), Some(1));
        assert_eq!(super::merge(&Some(None), &Some(1)), None);
        assert_eq!(super::merge(&Some(Some(2)), &Some(1)), Some(2));
    }
}
