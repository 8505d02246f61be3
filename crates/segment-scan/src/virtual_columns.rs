//! Virtual (computed) columns (`spec.md` §4.4, component C4).
//!
//! A virtual column is evaluated lazily per row/vector; nothing here
//! materializes a derived column ahead of time.

use ahash::AHashMap;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::segment::{ColumnCapabilities, Segment};
use crate::selector::{ColumnSelectorFactory, ScalarSelector, SharedOffset, SharedVectorOffset, VectorSelector};

/// A read-only view over physical columns plus previously declared virtual
/// columns, used by [`VirtualColumn::capabilities`] to answer type and
/// nullability questions without needing a live selector factory.
pub trait ColumnInspector {
    fn capabilities(&self, name: &str) -> Option<ColumnCapabilities>;
}

/// The default inspector: physical columns from a [`Segment`], shadowed by
/// any virtual column capabilities already computed in this registry.
pub struct SegmentColumnInspector<'a> {
    pub segment: &'a dyn Segment,
    pub virtual_capabilities: &'a AHashMap<String, ColumnCapabilities>,
}

impl ColumnInspector for SegmentColumnInspector<'_> {
    fn capabilities(&self, name: &str) -> Option<ColumnCapabilities> {
        if let Some(caps) = self.virtual_capabilities.get(name) {
            return Some(caps.clone());
        }
        self.segment.column(name).map(|h| h.capabilities().clone())
    }
}

/// A derived column whose values depend only on other columns of the same
/// row.
pub trait VirtualColumn: std::fmt::Debug {
    fn name(&self) -> &str;

    /// Names of columns (physical or virtual) this column reads from.
    /// Used purely for cycle detection at registration time — evaluation
    /// itself goes through the selector factory, which resolves names
    /// dynamically.
    fn dependencies(&self) -> Vec<String>;

    fn capabilities(&self, inspector: &dyn ColumnInspector) -> Option<ColumnCapabilities>;

    fn make_scalar_selector(
        &self,
        name: &str,
        factory: &ColumnSelectorFactory<'_>,
        offset: &SharedOffset,
    ) -> Box<dyn ScalarSelector>;

    fn make_vector_selector(
        &self,
        name: &str,
        factory: &ColumnSelectorFactory<'_>,
        offset: &SharedVectorOffset,
    ) -> Box<dyn VectorSelector>;

    fn can_vectorize(&self, inspector: &dyn ColumnInspector) -> bool;
}

/// The set of virtual columns declared on a [`crate::CursorBuildSpec`],
/// keyed by name.
#[derive(Default, Debug)]
pub struct VirtualColumns {
    by_name: AHashMap<String, Arc<dyn VirtualColumn>>,
}

impl VirtualColumns {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registers `column`, detecting cycles among the already-registered set
    /// (`spec.md` §4.4: "the factory must detect cycles and fail with
    /// `ConfigError::CyclicVirtualColumn`").
    ///
    /// `spec.md` §3 additionally requires virtual-column names never to
    /// shadow physical names visible through the same factory; this is
    /// enforced by the caller building the [`crate::CursorBuildSpec`]
    /// (checked against the segment in [`crate::holder::make_cursor_holder`]),
    /// not here, since this registry has no `Segment` to check against.
    pub fn register(&mut self, column: Arc<dyn VirtualColumn>) -> Result<(), ConfigError> {
        let name = column.name().to_string();
        self.by_name.insert(name.clone(), column);
        if let Some(cycle) = self.find_cycle() {
            self.by_name.remove(&name);
            return Err(ConfigError::CyclicVirtualColumn { name: cycle });
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn VirtualColumn>> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(String::as_str)
    }

    /// DFS cycle detection over the dependency graph declared by
    /// [`VirtualColumn::dependencies`], restricted to edges that land on
    /// another *virtual* column (physical columns are always leaves).
    fn find_cycle(&self) -> Option<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit(
            name: &str,
            by_name: &AHashMap<String, Arc<dyn VirtualColumn>>,
            marks: &mut AHashMap<String, Mark>,
        ) -> Option<String> {
            match marks.get(name) {
                Some(Mark::Done) => return None,
                Some(Mark::Visiting) => return Some(name.to_string()),
                None => {}
            }
            let Some(vc) = by_name.get(name) else {
                return None;
            };
            marks.insert(name.to_string(), Mark::Visiting);
            for dep in vc.dependencies() {
                if let Some(cycle) = visit(&dep, by_name, marks) {
                    return Some(cycle);
                }
            }
            marks.insert(name.to_string(), Mark::Done);
            None
        }

        let mut marks = AHashMap::new();
        for name in self.by_name.keys() {
            if let Some(cycle) = visit(name, &self.by_name, &mut marks) {
                return Some(cycle);
            }
        }
        None
    }
}

/// A virtual column computed as `input + constant`, typed `long`. Used by
/// scenario S4 (`vc = LONG + 1`) and available generally as the simplest
/// possible non-identity virtual column.
#[derive(Debug)]
pub struct AddConstantVirtualColumn {
    pub name: String,
    pub input: String,
    pub constant: i64,
}

impl VirtualColumn for AddConstantVirtualColumn {
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        vec![self.input.clone()]
    }

    fn capabilities(&self, inspector: &dyn ColumnInspector) -> Option<ColumnCapabilities> {
        inspector
            .capabilities(&self.input)
            .map(|_| ColumnCapabilities::scalar(crate::segment::ColumnType::Long))
    }

    fn make_scalar_selector(
        &self,
        _name: &str,
        factory: &ColumnSelectorFactory<'_>,
        offset: &SharedOffset,
    ) -> Box<dyn ScalarSelector> {
        Box::new(AddConstantScalarSelector {
            input: factory.make_scalar_selector(&self.input, offset),
            constant: self.constant,
        })
    }

    fn make_vector_selector(
        &self,
        _name: &str,
        factory: &ColumnSelectorFactory<'_>,
        offset: &SharedVectorOffset,
    ) -> Box<dyn VectorSelector> {
        Box::new(AddConstantVectorSelector {
            input: factory.make_vector_selector(&self.input, offset),
            constant: self.constant,
        })
    }

    fn can_vectorize(&self, _inspector: &dyn ColumnInspector) -> bool {
        true
    }
}

struct AddConstantScalarSelector {
    input: Box<dyn ScalarSelector>,
    constant: i64,
}

impl ScalarSelector for AddConstantScalarSelector {
    fn get_float(&self) -> Option<f32> {
        self.input.get_long().map(|v| (v + self.constant) as f32)
    }

    fn get_double(&self) -> Option<f64> {
        self.input.get_long().map(|v| (v + self.constant) as f64)
    }

    fn get_long(&self) -> Option<i64> {
        self.input.get_long().map(|v| v + self.constant)
    }

    fn get_object(&self) -> Option<crate::selector::ObjectValue> {
        self.get_long()
            .map(|v| crate::selector::ObjectValue::Single(v.to_string()))
    }

    fn is_null(&self) -> bool {
        self.input.is_null()
    }
}

struct AddConstantVectorSelector {
    input: Box<dyn VectorSelector>,
    constant: i64,
}

impl VectorSelector for AddConstantVectorSelector {
    fn get_doubles(&self) -> Vec<Option<f64>> {
        self.input
            .get_longs()
            .into_iter()
            .map(|v| v.map(|v| (v + self.constant) as f64))
            .collect()
    }

    fn get_longs(&self) -> Vec<Option<i64>> {
        self.input
            .get_longs()
            .into_iter()
            .map(|v| v.map(|v| v + self.constant))
            .collect()
    }

    fn get_strings(&self) -> Vec<Option<String>> {
        self.get_longs()
            .into_iter()
            .map(|v| v.map(|v| v.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct SelfReferential;
    impl VirtualColumn for SelfReferential {
        fn name(&self) -> &str {
            "loop"
        }
        fn dependencies(&self) -> Vec<String> {
            vec!["loop".to_string()]
        }
        fn capabilities(&self, _inspector: &dyn ColumnInspector) -> Option<ColumnCapabilities> {
            None
        }
        fn make_scalar_selector(
            &self,
            _name: &str,
            _factory: &ColumnSelectorFactory<'_>,
            _offset: &SharedOffset,
        ) -> Box<dyn ScalarSelector> {
            unreachable!()
        }
        fn make_vector_selector(
            &self,
            _name: &str,
            _factory: &ColumnSelectorFactory<'_>,
            _offset: &SharedVectorOffset,
        ) -> Box<dyn VectorSelector> {
            unreachable!()
        }
        fn can_vectorize(&self, _inspector: &dyn ColumnInspector) -> bool {
            true
        }
    }

    #[test]
    fn direct_self_cycle_is_rejected() {
        let mut vcs = VirtualColumns::default();
        let err = vcs.register(Arc::new(SelfReferential)).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicVirtualColumn { .. }));
    }

    #[derive(Debug)]
    struct RefersTo(&'static str, &'static str);
    impl VirtualColumn for RefersTo {
        fn name(&self) -> &str {
            self.0
        }
        fn dependencies(&self) -> Vec<String> {
            vec![self.1.to_string()]
        }
        fn capabilities(&self, _inspector: &dyn ColumnInspector) -> Option<ColumnCapabilities> {
            None
        }
        fn make_scalar_selector(
            &self,
            _name: &str,
            _factory: &ColumnSelectorFactory<'_>,
            _offset: &SharedOffset,
        ) -> Box<dyn ScalarSelector> {
            unreachable!()
        }
        fn make_vector_selector(
            &self,
            _name: &str,
            _factory: &ColumnSelectorFactory<'_>,
            _offset: &SharedVectorOffset,
        ) -> Box<dyn VectorSelector> {
            unreachable!()
        }
        fn can_vectorize(&self, _inspector: &dyn ColumnInspector) -> bool {
            true
        }
    }

    #[test]
    fn indirect_cycle_is_rejected() {
        let mut vcs = VirtualColumns::default();
        vcs.register(Arc::new(RefersTo("a", "b"))).unwrap();
        let err = vcs.register(Arc::new(RefersTo("b", "a"))).unwrap_err();
        assert!(matches!(err, ConfigError::CyclicVirtualColumn { .. }));
    }

    #[test]
    fn non_cyclic_chain_is_accepted() {
        let mut vcs = VirtualColumns::default();
        vcs.register(Arc::new(RefersTo("a", "physical"))).unwrap();
        vcs.register(Arc::new(RefersTo("b", "a"))).unwrap();
        assert!(vcs.get("b").is_some());
    }
}
