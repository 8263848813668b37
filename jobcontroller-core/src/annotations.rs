//! Encoding/decoding of the `pvs`/`pvcs` job annotations.
//!
//! The source stringifies a Python list literal (`"['foo-pv', 'bar-pv']"`)
//! into the annotation value and parses it back with `strip`/`split`. This
//! implementation uses a stable JSON array instead, while the decoder still
//! accepts the legacy bracket/quote form so a watcher built from this spec
//! can clean up jobs created during a mixed-version rollout.

use crate::model::ProvisionedResources;

pub fn encode(names: &[String]) -> String {
    serde_json::to_string(names).expect("Vec<String> is always serialisable")
}

pub fn encode_resources(resources: &ProvisionedResources) -> (String, String) {
    (encode(&resources.volumes), encode(&resources.claims))
}

/// Parses an annotation value produced either by [`encode`] or by the
/// legacy Python `str(list)` form, e.g. `"['a', 'b']"` or `"[]"`.
/// `None`/empty sentinels and blank entries are dropped.
pub fn decode(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(names) = serde_json::from_str::<Vec<String>>(trimmed) {
        return names.into_iter().filter(|n| is_real_name(n)).collect();
    }

    decode_legacy(trimmed)
}

fn decode_legacy(raw: &str) -> Vec<String> {
    let inner = raw.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|entry| entry.trim().trim_matches('\'').trim_matches('"').to_string())
        .filter(|n| is_real_name(n))
        .collect()
}

fn is_real_name(name: &str) -> bool {
    !name.is_empty() && name != "None"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_json_encoding() {
        let names = vec!["a-pv".to_string(), "b-pv".to_string()];
        let encoded = encode(&names);
        assert_eq!(decode(&encoded), names);
    }

    #[test]
    fn decodes_legacy_python_repr_form() {
        let legacy = "['foo-pv', 'bar-pv']";
        assert_eq!(decode(legacy), vec!["foo-pv", "bar-pv"]);
    }

    #[test]
    fn decodes_legacy_form_with_double_quotes() {
        let legacy = "[\"foo-pv\"]";
        assert_eq!(decode(legacy), vec!["foo-pv"]);
    }

    #[test]
    fn empty_and_none_sentinels_are_skipped() {
        assert_eq!(decode("[]"), Vec::<String>::new());
        assert_eq!(decode(""), Vec::<String>::new());
        assert_eq!(decode("[None]"), Vec::<String>::new());
        assert_eq!(decode("['None', 'real-pv']"), vec!["real-pv"]);
    }
}
