//! Fully-qualified structural element names
//!
//! Class, function and method identities as handed over by the symbol
//! index. PHP resolves these names case-insensitively, so equality and
//! hashing go through a lowercased key while display keeps the original
//! spelling.

use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Clone)]
pub struct Fqsen {
    display: Arc<str>,
    key: Arc<str>,
}

impl Fqsen {
    /// Build from a class or function name, adding the leading `\` if missing
    pub fn new(name: &str) -> Self {
        let display: Arc<str> = if name.starts_with('\\') {
            Arc::from(name)
        } else {
            Arc::from(format!("\\{}", name))
        };
        let key = Arc::from(display.to_ascii_lowercase());
        Self { display, key }
    }

    /// `\Class::method`
    pub fn method(class: &Fqsen, method: &str) -> Self {
        Self::new(&format!("{}::{}", class.display, method))
    }

    pub fn as_str(&self) -> &str {
        &self.display
    }

    /// Lowercased key used for comparisons
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Short name without namespace or class part
    pub fn short_name(&self) -> &str {
        let tail = self.display.rsplit("::").next().unwrap_or(&self.display);
        tail.rsplit('\\').next().unwrap_or(tail)
    }

    /// Split `\Class::method` into the class part and the member name
    pub fn split_member(&self) -> Option<(Fqsen, &str)> {
        let (class, member) = self.display.split_once("::")?;
        Some((Fqsen::new(class), member))
    }

    pub fn is(&self, name: &str) -> bool {
        let name = name.strip_prefix('\\').unwrap_or(name);
        self.key[1..].eq_ignore_ascii_case(name)
    }
}

impl PartialEq for Fqsen {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Fqsen {}

impl Hash for Fqsen {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for Fqsen {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fqsen {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Debug for Fqsen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fqsen({})", self.display)
    }
}

impl fmt::Display for Fqsen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl From<&str> for Fqsen {
    fn from(name: &str) -> Self {
        Fqsen::new(name)
    }
}

impl Serialize for Fqsen {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_identity() {
        assert_eq!(Fqsen::new("Foo\\Bar"), Fqsen::new("\\foo\\BAR"));
        assert_eq!(Fqsen::new("Foo").to_string(), "\\Foo");
    }

    #[test]
    fn test_member_names() {
        let m = Fqsen::method(&Fqsen::new("App\\Repo"), "find");
        assert_eq!(m.as_str(), "\\App\\Repo::find");
        assert_eq!(m.short_name(), "find");
        let (class, member) = m.split_member().unwrap();
        assert_eq!(class, Fqsen::new("App\\Repo"));
        assert_eq!(member, "find");
        assert!(Fqsen::new("Closure").is("closure"));
    }
}
