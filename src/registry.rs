//! Validator lookup by validated type.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{TypeHierarchy, ValidatorSearch, ValidatorSearchMode};
use crate::validation::Validator;

/// Source of validators for a type.
pub trait ValidatorRegistry {
    /// All validators for `type_name`, in registration order.
    fn validators(&self, type_name: &str) -> Vec<Arc<Validator>>;

    fn validator(&self, type_name: &str) -> Option<Arc<Validator>> {
        self.validators(type_name).into_iter().next()
    }
}

/// In-process registry populated up front.
#[derive(Debug, Clone, Default)]
pub struct StaticValidatorRegistry {
    by_type: HashMap<String, Vec<Arc<Validator>>>,
    types: Arc<TypeHierarchy>,
    search: ValidatorSearch,
}

impl StaticValidatorRegistry {
    pub fn new(types: Arc<TypeHierarchy>, search: ValidatorSearch) -> Self {
        Self {
            by_type: HashMap::new(),
            types,
            search,
        }
    }

    /// Register `validator` for its validated type.
    pub fn register(&mut self, validator: Arc<Validator>) {
        self.by_type
            .entry(validator.validated_type().to_string())
            .or_default()
            .push(validator);
    }

    pub fn with(mut self, validator: Arc<Validator>) -> Self {
        self.register(validator);
        self
    }

    pub fn types(&self) -> &Arc<TypeHierarchy> {
        &self.types
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn registered(&self, type_name: &str) -> &[Arc<Validator>] {
        self.by_type.get(type_name).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl ValidatorRegistry for StaticValidatorRegistry {
    fn validators(&self, type_name: &str) -> Vec<Arc<Validator>> {
        let mut found = self.registered(type_name).to_vec();

        if found.is_empty() && self.search.search_base_types {
            found = self
                .types
                .ancestors(type_name)
                .map(|base| self.registered(base))
                .find(|validators| !validators.is_empty())
                .map(<[_]>::to_vec)
                .unwrap_or_default();
        }

        if self.search.mode == ValidatorSearchMode::OneForType {
            found.truncate(1);
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(search: ValidatorSearch) -> StaticValidatorRegistry {
        let types = Arc::new(
            TypeHierarchy::new()
                .with_base("Puppy", "Dog")
                .with_base("Dog", "Animal"),
        );
        StaticValidatorRegistry::new(types, search)
            .with(Validator::builder("Animal").name("AnimalValidator").build())
            .with(Validator::builder("Person").name("First").build())
            .with(Validator::builder("Person").name("Second").build())
    }

    #[test]
    fn one_for_type_stops_at_first() {
        let registry = registry(ValidatorSearch::default());
        let found = registry.validators("Person");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "First");
    }

    #[test]
    fn many_for_type_collects_all() {
        let registry = registry(ValidatorSearch {
            mode: ValidatorSearchMode::ManyForType,
            search_base_types: true,
        });
        let names: Vec<String> = registry
            .validators("Person")
            .iter()
            .map(|v| v.name().to_string())
            .collect();
        assert_eq!(names, ["First", "Second"]);
    }

    #[test]
    fn falls_back_to_nearest_base_type() {
        let registry = registry(ValidatorSearch::default());
        let found = registry.validator("Puppy").unwrap();
        assert_eq!(found.name(), "AnimalValidator");
    }

    #[test]
    fn base_fallback_can_be_disabled() {
        let registry = registry(ValidatorSearch {
            mode: ValidatorSearchMode::OneForType,
            search_base_types: false,
        });
        assert!(registry.validator("Puppy").is_none());
        assert!(registry.validator("Unknown").is_none());
    }
}
