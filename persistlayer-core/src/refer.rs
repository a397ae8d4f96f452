//! Component references located by descriptor.
//!
//! Persistence components find their optional collaborators (a shared connection,
//! discovery services, credential stores, a logger) in a [`References`] container.
//! Each component is registered under a [`Descriptor`] of the form
//! `group:type:kind:name:version`; `*` in any position matches anything.
//!
//! Components are stored by value and handed out as clones, so shared components
//! are registered as `Arc`s:
//!
//! ```ignore
//! use std::sync::Arc;
//! use persistlayer::refer::{Descriptor, References};
//!
//! let connection = Arc::new(MongoDbConnection::new());
//! let mut references = References::new();
//! references.put(Descriptor::new("app", "connection", "mongodb", "default", "1.0"), connection.clone());
//!
//! let found: Option<Arc<MongoDbConnection>> =
//!     references.get_one_optional(&Descriptor::new("*", "connection", "mongodb", "*", "*"));
//! ```

use std::{any::Any, fmt, str::FromStr, sync::Arc};

use crate::error::PersistenceError;

/// Locator of a component: `group:type:kind:name:version`, `None` meaning `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub group: Option<String>,
    pub ty: Option<String>,
    pub kind: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
}

impl Descriptor {
    /// Creates a descriptor. Empty strings and `*` become wildcards.
    pub fn new(group: &str, ty: &str, kind: &str, name: &str, version: &str) -> Self {
        Self {
            group: Self::part(group),
            ty: Self::part(ty),
            kind: Self::part(kind),
            name: Self::part(name),
            version: Self::part(version),
        }
    }

    fn part(value: &str) -> Option<String> {
        match value {
            "" | "*" => None,
            other => Some(other.to_string()),
        }
    }

    fn part_matches(left: &Option<String>, right: &Option<String>) -> bool {
        match (left, right) {
            (Some(l), Some(r)) => l == r,
            _ => true,
        }
    }

    /// Checks whether two descriptors match, treating wildcards on either side as matching.
    pub fn matches(&self, other: &Descriptor) -> bool {
        Self::part_matches(&self.group, &other.group)
            && Self::part_matches(&self.ty, &other.ty)
            && Self::part_matches(&self.kind, &other.kind)
            && Self::part_matches(&self.name, &other.name)
            && Self::part_matches(&self.version, &other.version)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [&self.group, &self.ty, &self.kind, &self.name, &self.version]
            .map(|p| p.as_deref().unwrap_or("*"));

        write!(f, "{}", parts.join(":"))
    }
}

impl FromStr for Descriptor {
    type Err = PersistenceError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = value.split(':').map(str::trim).collect();

        match parts.as_slice() {
            [group, ty, kind, name, version] => Ok(Descriptor::new(group, ty, kind, name, version)),
            _ => Err(PersistenceError::config(
                None,
                "BAD_DESCRIPTOR",
                format!("Descriptor {value} is in wrong format"),
            )),
        }
    }
}

/// Container of components registered under descriptors.
#[derive(Clone, Default)]
pub struct References {
    entries: Vec<(Descriptor, Arc<dyn Any + Send + Sync>)>,
}

impl References {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Registers a component.
    pub fn put<T>(&mut self, descriptor: Descriptor, component: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.entries.push((descriptor, Arc::new(component)));
        self
    }

    /// Builder form of [`put`](Self::put).
    pub fn with<T>(mut self, descriptor: Descriptor, component: T) -> Self
    where
        T: Any + Send + Sync,
    {
        self.put(descriptor, component);
        self
    }

    /// Removes every component matching `locator`.
    pub fn remove_all(&mut self, locator: &Descriptor) {
        self.entries.retain(|(descriptor, _)| !descriptor.matches(locator));
    }

    /// Returns clones of all components of type `T` matching `locator`, in registration order.
    pub fn get_optional<T>(&self, locator: &Descriptor) -> Vec<T>
    where
        T: Any + Clone,
    {
        self.entries
            .iter()
            .filter(|(descriptor, _)| descriptor.matches(locator))
            .filter_map(|(_, component)| component.downcast_ref::<T>().cloned())
            .collect()
    }

    /// Returns a clone of the first component of type `T` matching `locator`.
    pub fn get_one_optional<T>(&self, locator: &Descriptor) -> Option<T>
    where
        T: Any + Clone,
    {
        self.entries
            .iter()
            .filter(|(descriptor, _)| descriptor.matches(locator))
            .find_map(|(_, component)| component.downcast_ref::<T>().cloned())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for References {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(descriptor, _)| descriptor.to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcards_match_on_either_side() {
        let concrete = Descriptor::new("app", "connection", "mongodb", "default", "1.0");

        assert!(concrete.matches(&Descriptor::new("*", "connection", "mongodb", "*", "*")));
        assert!(Descriptor::new("*", "connection", "*", "*", "1.0").matches(&concrete));
        assert!(!concrete.matches(&Descriptor::new("*", "discovery", "*", "*", "*")));
    }

    #[test]
    fn descriptors_parse_and_display() {
        let descriptor: Descriptor = "*:connection:mongodb:*:1.0".parse().unwrap();

        assert_eq!(descriptor.ty.as_deref(), Some("connection"));
        assert!(descriptor.group.is_none());
        assert_eq!(descriptor.to_string(), "*:connection:mongodb:*:1.0");

        let err = "connection:mongodb".parse::<Descriptor>().unwrap_err();
        assert_eq!(err.code(), Some("BAD_DESCRIPTOR"));
    }

    #[test]
    fn components_are_found_by_type_and_descriptor() {
        let shared = Arc::new(String::from("shared"));
        let references = References::new()
            .with(Descriptor::new("app", "connection", "mongodb", "a", "1.0"), shared.clone())
            .with(Descriptor::new("app", "connection", "mongodb", "b", "1.0"), 42_u32)
            .with(Descriptor::new("app", "logger", "null", "default", "1.0"), Arc::new(String::from("logger")));

        let locator = Descriptor::new("*", "connection", "*", "*", "*");
        let found: Option<Arc<String>> = references.get_one_optional(&locator);
        assert!(Arc::ptr_eq(&found.unwrap(), &shared));

        let numbers: Vec<u32> = references.get_optional(&locator);
        assert_eq!(numbers, vec![42]);

        let missing: Option<Arc<u64>> = references.get_one_optional(&locator);
        assert!(missing.is_none());
    }

    #[test]
    fn remove_all_drops_matching_components() {
        let mut references = References::new();
        references
            .put(Descriptor::new("app", "discovery", "memory", "a", "1.0"), 1_u8)
            .put(Descriptor::new("app", "credential-store", "memory", "a", "1.0"), 2_u8);

        references.remove_all(&Descriptor::new("*", "discovery", "*", "*", "*"));

        assert_eq!(references.len(), 1);
        assert_eq!(references.get_optional::<u8>(&Descriptor::default()), vec![2]);
    }
}
