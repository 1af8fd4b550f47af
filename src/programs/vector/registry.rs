use std::collections::BTreeMap;

use crate::errors::*;
use crate::programs::vector::step::StepAlgorithm;
use crate::programs::vector::steps::*;

type StepFactory = fn() -> Box<dyn StepAlgorithm>;

fn make<T: StepAlgorithm + Default + 'static>() -> Box<dyn StepAlgorithm> {
    Box::<T>::default()
}

/// Step constructors by name.
pub struct StepRegistry {
    factories: BTreeMap<String, StepFactory>,
}

impl StepRegistry {
    pub fn empty() -> Self {
        StepRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// A registry holding every built-in step.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("read", make::<ReadStep>);
        registry.register("write", make::<WriteStep>);
        registry.register("buffer", make::<BufferStep>);
        registry.register("simplify", make::<SimplifyStep>);
        registry.register("segmentize", make::<SegmentizeStep>);
        registry.register("swap-xy", make::<SwapXyStep>);
        registry.register("make-valid", make::<MakeValidStep>);
        registry.register("set-geom-type", make::<SetGeomTypeStep>);
        registry.register("explode-collections", make::<ExplodeCollectionsStep>);
        registry.register("select", make::<SelectStep>);
        registry.register("filter", make::<FilterStep>);
        registry.register("reproject", make::<ReprojectStep>);
        registry.register("check-geometry", make::<CheckGeometryStep>);
        registry.register("collect", make::<CollectStep>);
        registry.register("sort", make::<SortStep>);
        registry.register("check-coverage", make::<CheckCoverageStep>);
        registry.register("clean-coverage", make::<CleanCoverageStep>);
        registry.register("concat", make::<ConcatStep>);
        registry
    }

    /// Register `factory` under `name`, replacing any previous step of that
    /// name.
    pub fn register(&mut self, name: &str, factory: StepFactory) {
        self.factories.insert(name.to_string(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn StepAlgorithm>> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| GdalVecError::UnknownStep(name.to_string()))
    }

    /// Registered step names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_match() -> Result<()> {
        let registry = StepRegistry::builtin();
        for name in registry.names() {
            assert_eq!(registry.create(name)?.name(), name);
        }
        assert_eq!(registry.names().count(), 18);
        assert!(matches!(
            registry.create("frobnicate"),
            Err(GdalVecError::UnknownStep(_))
        ));
        Ok(())
    }
}
