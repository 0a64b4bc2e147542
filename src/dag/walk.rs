// src/dag/walk.rs

//! Structural traversal of task fields.
//!
//! Every task type implements [`Walk`] by visiting each of its fields. A
//! [`TaskRef`](crate::task::TaskRef) records itself as a dependency; scalars,
//! strings and [`ResourceHolder`](crate::task::ResourceHolder)s are leaves;
//! containers recurse into their elements.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::types::TaskKey;

/// A task reference discovered while walking, with the kind its holder
/// expects the referenced task to be.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DependencyRef {
    pub key: TaskKey,
    pub kind: &'static str,
}

pub trait Walk {
    fn walk(&self, walker: &mut Walker);
}

/// Accumulates the task references found in a value.
#[derive(Debug, Default)]
pub struct Walker {
    found: Vec<DependencyRef>,
}

impl Walker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visit<W: Walk + ?Sized>(&mut self, value: &W) -> &mut Self {
        value.walk(self);
        self
    }

    pub fn depend_on(&mut self, key: &str, kind: &'static str) {
        self.found.push(DependencyRef {
            key: key.to_string(),
            kind,
        });
    }

    /// References found so far, in visiting order (duplicates included).
    pub fn into_dependencies(self) -> Vec<DependencyRef> {
        self.found
    }
}

/// Implement [`Walk`] for a struct by visiting the listed fields.
///
/// The field list must name every field of the struct; a missing field is a
/// compile error.
#[macro_export]
macro_rules! impl_walk {
    ($ty:ident { $($field:ident),* $(,)? }) => {
        impl $crate::dag::Walk for $ty {
            fn walk(&self, walker: &mut $crate::dag::Walker) {
                let $ty { $($field),* } = self;
                $( walker.visit($field); )*
            }
        }
    };
}

macro_rules! leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Walk for $ty {
                fn walk(&self, _walker: &mut Walker) {}
            }
        )*
    };
}

leaf!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64, str,
    String, PathBuf, Duration,
);

impl<T: Walk + ?Sized> Walk for &T {
    fn walk(&self, walker: &mut Walker) {
        (**self).walk(walker);
    }
}

impl<T: Walk + ?Sized> Walk for Box<T> {
    fn walk(&self, walker: &mut Walker) {
        (**self).walk(walker);
    }
}

impl<T: Walk + ?Sized> Walk for Arc<T> {
    fn walk(&self, walker: &mut Walker) {
        (**self).walk(walker);
    }
}

impl<T: Walk> Walk for Option<T> {
    fn walk(&self, walker: &mut Walker) {
        if let Some(value) = self {
            value.walk(walker);
        }
    }
}

impl<T: Walk> Walk for [T] {
    fn walk(&self, walker: &mut Walker) {
        for value in self {
            value.walk(walker);
        }
    }
}

impl<T: Walk> Walk for Vec<T> {
    fn walk(&self, walker: &mut Walker) {
        self.as_slice().walk(walker);
    }
}

impl<T: Walk> Walk for BTreeSet<T> {
    fn walk(&self, walker: &mut Walker) {
        for value in self {
            value.walk(walker);
        }
    }
}

impl<K: Walk, V: Walk> Walk for BTreeMap<K, V> {
    fn walk(&self, walker: &mut Walker) {
        for (key, value) in self {
            key.walk(walker);
            value.walk(walker);
        }
    }
}

impl<K: Walk, V: Walk, S> Walk for HashMap<K, V, S> {
    fn walk(&self, walker: &mut Walker) {
        for (key, value) in self {
            key.walk(walker);
            value.walk(walker);
        }
    }
}
