// src/task/changes.rs

use std::collections::BTreeSet;
use std::fmt;

use super::Task;

/// Set of field names whose expected value differs from the actual one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    fields: BTreeSet<&'static str>,
    creating: bool,
}

impl Changes {
    /// Compare `expected` against `actual` using the task's field
    /// declarations.
    ///
    /// With no actual state every present expected field is recorded, so the
    /// delta describes the full resource.
    pub fn compute<T: Task>(actual: Option<&T>, expected: &T) -> Self {
        let mut differ = Differ::new(actual.is_none());
        match actual {
            Some(actual) => T::diff(actual, expected, &mut differ),
            None => T::diff(&T::default(), expected, &mut differ),
        }
        differ.finish()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().copied()
    }

    /// Whether this delta describes a resource that does not exist yet.
    pub fn is_creation(&self) -> bool {
        self.creating
    }
}

impl fmt::Display for Changes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for field in &self.fields {
            if !first {
                f.write_str(", ")?;
            }
            f.write_str(field)?;
            first = false;
        }
        Ok(())
    }
}

/// Collects field comparisons declared by [`Task::diff`].
#[derive(Debug)]
pub struct Differ {
    creating: bool,
    changed: BTreeSet<&'static str>,
}

impl Differ {
    fn new(creating: bool) -> Self {
        Self {
            creating,
            changed: BTreeSet::new(),
        }
    }

    /// Compare an optional field.
    ///
    /// An unset expected value means "don't care" and never produces a
    /// change.
    pub fn field<V: PartialEq>(
        &mut self,
        name: &'static str,
        actual: &Option<V>,
        expected: &Option<V>,
    ) -> &mut Self {
        if let Some(expected) = expected {
            if self.creating || actual.as_ref() != Some(expected) {
                self.changed.insert(name);
            }
        }
        self
    }

    /// Compare a field that is always specified (collections, flags).
    pub fn value<V: PartialEq>(&mut self, name: &'static str, actual: &V, expected: &V) -> &mut Self {
        if self.creating || actual != expected {
            self.changed.insert(name);
        }
        self
    }

    fn finish(self) -> Changes {
        Changes {
            fields: self.changed,
            creating: self.creating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(actual: Option<(&Option<u32>, &Option<u32>)>, expected: (&Option<u32>, &Option<u32>)) -> Changes {
        let mut differ = Differ::new(actual.is_none());
        let none = (&None, &None);
        let (aa, ab) = actual.unwrap_or(none);
        differ.field("a", aa, expected.0).field("b", ab, expected.1);
        differ.finish()
    }

    #[test]
    fn unset_expected_fields_are_ignored() {
        let changes = diff(Some((&Some(1), &Some(2))), (&Some(1), &None));
        assert!(changes.is_empty());
    }

    #[test]
    fn differing_fields_are_recorded() {
        let changes = diff(Some((&Some(1), &Some(2))), (&Some(5), &Some(2)));
        assert!(changes.contains("a"));
        assert!(!changes.contains("b"));
        assert_eq!(changes.to_string(), "a");
    }

    #[test]
    fn creation_records_every_present_field() {
        let changes = diff(None, (&Some(1), &None));
        assert!(changes.is_creation());
        assert!(changes.contains("a"));
        assert!(!changes.contains("b"));
    }
}
