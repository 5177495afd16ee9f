//! # Field groups
//!
//! Maps can be computed independently for groups of survey fields (e.g. `SHALLOW` and `DEEP`).
//! [`FieldGroups`] keeps the groups in declaration order and resolves a field label to the index of
//! the **first** group listing it.
use std::collections::HashMap;

use ahash::RandomState;
use itertools::Itertools;

use crate::fluxerr_errors::FluxErrError;

#[derive(Debug, Clone, Default)]
pub struct FieldGroups {
    names: Vec<String>,
    lists: Vec<Vec<String>>,
    lookup: HashMap<String, usize, RandomState>,
}

impl FieldGroups {
    /// Build the groups from `(group name, field labels)` pairs, in declaration order.
    pub fn new<I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let mut field_groups = FieldGroups::default();
        for (name, fields) in groups {
            let igroup = field_groups.names.len();
            for field in &fields {
                // first declared group wins
                field_groups.lookup.entry(field.clone()).or_insert(igroup);
            }
            field_groups.names.push(name);
            field_groups.lists.push(fields);
        }
        field_groups
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn name(&self, igroup: usize) -> &str {
        &self.names[igroup]
    }

    /// Iterate over `(group name, field labels)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.names
            .iter()
            .zip(&self.lists)
            .map(|(name, list)| (name.as_str(), list.as_slice()))
    }

    /// Index of the group containing `field`.
    ///
    /// Return
    /// ----------
    /// * The group index, or [`FluxErrError::FieldNotInGroup`] naming the label and the full
    ///   group mapping.
    pub fn group_of(&self, field: &str) -> Result<usize, FluxErrError> {
        self.lookup
            .get(field)
            .copied()
            .ok_or_else(|| FluxErrError::FieldNotInGroup {
                field: field.to_string(),
                groups: self.describe(),
            })
    }

    /// Human-readable mapping, e.g. `SHALLOW=[S1 S2], DEEP=[X3 C3]`.
    pub fn describe(&self) -> String {
        self.iter()
            .map(|(name, fields)| format!("{name}=[{}]", fields.iter().join(" ")))
            .join(", ")
    }
}

#[cfg(test)]
mod test_field_groups {
    use super::*;

    fn shallow_deep() -> FieldGroups {
        FieldGroups::new(vec![
            (
                "SHALLOW".to_string(),
                vec!["S1".into(), "S2".into(), "C1".into()],
            ),
            ("DEEP".to_string(), vec!["X3".into(), "C3".into()]),
        ])
    }

    #[test]
    fn test_group_lookup() {
        let groups = shallow_deep();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.group_of("S2"), Ok(0));
        assert_eq!(groups.group_of("C3"), Ok(1));
        assert_eq!(groups.name(1), "DEEP");
    }

    #[test]
    fn test_first_group_wins() {
        let groups = FieldGroups::new(vec![
            ("A".to_string(), vec!["X1".into()]),
            ("B".to_string(), vec!["X1".into(), "X2".into()]),
        ]);
        assert_eq!(groups.group_of("X1"), Ok(0));
        assert_eq!(groups.group_of("X2"), Ok(1));
    }

    #[test]
    fn test_unknown_field() {
        let groups = shallow_deep();
        assert_eq!(
            groups.group_of("E2"),
            Err(FluxErrError::FieldNotInGroup {
                field: "E2".into(),
                groups: "SHALLOW=[S1 S2 C1], DEEP=[X3 C3]".into()
            })
        );
    }

    #[test]
    fn test_empty() {
        let groups = FieldGroups::default();
        assert!(groups.is_empty());
        assert!(groups.group_of("S1").is_err());
    }
}
