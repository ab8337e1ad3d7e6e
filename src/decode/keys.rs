//! Column-role validation shared by both decoders: every requested key
//! must exist among the discovered columns, and the three role sets must
//! be pairwise disjoint.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

pub fn validate_role_keys(
    columns: &BTreeSet<String>,
    input_keys: &BTreeSet<String>,
    output_keys: &BTreeSet<String>,
    metadata_keys: &BTreeSet<String>,
) -> Result<()> {
    for (role, keys) in [
        ("input", input_keys),
        ("output", output_keys),
        ("metadata", metadata_keys),
    ] {
        let missing: Vec<_> = keys.difference(columns).cloned().collect();
        if !missing.is_empty() {
            return Err(Error::Malformed(format!(
                "{role} keys not found in column headers: {}",
                missing.join(", ")
            )));
        }
    }
    for (left, right, left_keys, right_keys) in [
        ("input", "output", input_keys, output_keys),
        ("input", "metadata", input_keys, metadata_keys),
        ("output", "metadata", output_keys, metadata_keys),
    ] {
        let overlap: Vec<_> = left_keys.intersection(right_keys).cloned().collect();
        if !overlap.is_empty() {
            return Err(Error::Malformed(format!(
                "{left} keys and {right} keys have overlap: {}",
                overlap.join(", ")
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> BTreeSet<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    #[test]
    fn accepts_disjoint_subsets() {
        let columns = set(&["q", "a", "tag"]);
        validate_role_keys(&columns, &set(&["q"]), &set(&["a"]), &set(&["tag"])).unwrap();
    }

    #[test]
    fn rejects_missing_key() {
        let columns = set(&["q", "a"]);
        let err =
            validate_role_keys(&columns, &set(&["q"]), &set(&["answer"]), &set(&[])).unwrap_err();
        assert!(err.to_string().contains("output keys"));
        assert!(err.to_string().contains("answer"));
    }

    #[test]
    fn rejects_overlapping_roles() {
        let columns = set(&["q", "score"]);
        let err = validate_role_keys(&columns, &set(&["q"]), &set(&["score"]), &set(&["score"]))
            .unwrap_err();
        assert!(err.to_string().contains("overlap"));
        assert!(err.to_string().contains("score"));
    }
}
