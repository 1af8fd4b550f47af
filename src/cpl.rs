//! Name/value option lists
//!
//! Open options, creation options and layer creation options are passed around
//! as ordered `KEY=VALUE` lists, mirroring GDAL's `CSL` string lists.

use std::fmt::{Debug, Formatter};

use crate::config::test_bool;
use crate::errors::{GdalVecError, Result};

/// An ordered list of `KEY=VALUE` pairs. Keys are matched case-insensitively.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CslStringList {
    entries: Vec<(String, String)>,
}

impl CslStringList {
    /// Creates an empty string list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` to `name`.
    ///
    /// Overwrites duplicate `name`s.
    ///
    /// Returns `Ok<()>` on success, `Err<GdalVecError>` if `name` has non alphanumeric
    /// characters, or `value` has newline characters.
    pub fn set_name_value(&mut self, name: &str, value: &str) -> Result<()> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(GdalVecError::BadArgument(format!(
                "Invalid characters in name: '{}'",
                name
            )));
        }
        if value.contains(['\n', '\r']) {
            return Err(GdalVecError::BadArgument(format!(
                "Invalid characters in value: '{}'",
                value
            )));
        }
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    /// Parses a `KEY=VALUE` string (as given on a command line) and adds it.
    pub fn add_name_value_string(&mut self, s: &str) -> Result<()> {
        match s.split_once('=') {
            Some((k, v)) => self.set_name_value(k, v),
            None => Err(GdalVecError::BadArgument(format!(
                "Expected KEY=VALUE, got '{s}'"
            ))),
        }
    }

    /// Looks up the value corresponding to `key`.
    pub fn fetch_name_value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Looks up `key` and interprets it as a boolean, returning `default` when absent.
    pub fn fetch_bool(&self, key: &str, default: bool) -> bool {
        self.fetch_name_value(key).map(test_bool).unwrap_or(default)
    }

    /// Determine the number of entries in the list.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Determine if the list has any values
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get an iterator over the name/value elements of the list.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl Debug for CslStringList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (k, v) in self.iter() {
            f.write_fmt(format_args!("{k}={v}\n"))?;
        }
        Ok(())
    }
}

/// Convenience shorthand for specifying an empty `CslStringList` to functions accepting
/// `Into<CslStringList>`.
impl From<()> for CslStringList {
    fn from(_: ()) -> Self {
        CslStringList::default()
    }
}

/// Creates a [`CslStringList`] from a slice of _key_/_value_ tuples.
impl<const N: usize> TryFrom<&[(&str, &str); N]> for CslStringList {
    type Error = GdalVecError;

    fn try_from(pairs: &[(&str, &str); N]) -> Result<Self> {
        let mut result = Self::default();
        for (k, v) in pairs {
            result.set_name_value(k, v)?;
        }
        Ok(result)
    }
}

impl TryFrom<&[String]> for CslStringList {
    type Error = GdalVecError;

    fn try_from(items: &[String]) -> Result<Self> {
        let mut result = Self::default();
        for item in items {
            result.add_name_value_string(item)?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use crate::cpl::CslStringList;
    use crate::errors::Result;

    fn fixture() -> Result<CslStringList> {
        let mut l = CslStringList::new();
        l.set_name_value("ONE", "1")?;
        l.set_name_value("TWO", "2")?;
        l.set_name_value("THREE", "3")?;

        Ok(l)
    }

    #[test]
    fn basic_list() -> Result<()> {
        let l = fixture()?;
        assert_eq!(l.fetch_name_value("ONE"), Some("1"));
        assert_eq!(l.fetch_name_value("three"), Some("3"));
        assert_eq!(l.fetch_name_value("FOO"), None);

        Ok(())
    }

    #[test]
    fn overwrites_duplicates() -> Result<()> {
        let mut l = fixture()?;
        l.set_name_value("two", "22")?;
        assert_eq!(l.len(), 3);
        assert_eq!(l.fetch_name_value("TWO"), Some("22"));

        Ok(())
    }

    #[test]
    fn has_iterator() -> Result<()> {
        let f = fixture()?;
        let mut it = f.iter();
        assert_eq!(it.next(), Some(("ONE", "1")));
        assert_eq!(it.next(), Some(("TWO", "2")));
        assert_eq!(it.next(), Some(("THREE", "3")));
        assert_eq!(it.next(), None);
        Ok(())
    }

    #[test]
    fn invalid_keys() -> Result<()> {
        let mut l = fixture()?;
        assert!(l.set_name_value("l==t", "2").is_err());
        assert!(l.set_name_value("foo", "2\n4\r5").is_err());
        assert!(l.add_name_value_string("NO_EQUALS").is_err());

        Ok(())
    }

    #[test]
    fn from_strings() -> Result<()> {
        let args = vec!["SPLIT_MULTIPOINT=YES".to_string(), "LNAM_REFS=off".to_string()];
        let l = CslStringList::try_from(args.as_slice())?;
        assert!(l.fetch_bool("SPLIT_MULTIPOINT", false));
        assert!(!l.fetch_bool("LNAM_REFS", true));
        assert!(l.fetch_bool("MISSING", true));

        Ok(())
    }

    #[test]
    fn debug_fmt() -> Result<()> {
        let l = CslStringList::try_from(&[("ONE", "1"), ("TWO", "2")])?;
        let s = format!("{l:?}");
        assert!(s.contains("ONE=1"));
        assert!(s.contains("TWO=2"));

        Ok(())
    }
}
