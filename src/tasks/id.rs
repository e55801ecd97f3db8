//! # Hierarchical task identifiers.
//!
//! A [`TaskId`] is a `/`-separated path: the parent's id joined with a
//! locally-unique suffix. Ids are reused as external report keys, so their
//! length is capped (see [`Config::max_id_len`](crate::Config::max_id_len)).

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::error::ConfigError;

/// Hierarchical, length-bounded task identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(Arc<str>);

impl TaskId {
    /// Separator between hierarchy levels.
    pub const SEPARATOR: char = '/';

    /// Creates a root identifier.
    ///
    /// A root may already be path-like (`"job/7"`), but no segment may be empty.
    pub fn root(id: &str, max_len: usize) -> Result<Self, ConfigError> {
        if id.split(Self::SEPARATOR).any(str::is_empty) {
            return Err(ConfigError::InvalidId {
                segment: id.to_string(),
            });
        }
        Self::bounded(id.to_string(), max_len)
    }

    /// Creates the identifier of a child named `suffix`.
    ///
    /// # Example
    /// ```
    /// use verivisor::TaskId;
    ///
    /// let job = TaskId::root("job", 200).unwrap();
    /// let unit = job.child("unit-1", 200).unwrap();
    /// assert_eq!(unit.as_str(), "job/unit-1");
    /// assert_eq!(unit.name(), "unit-1");
    /// assert!(job.child("x".repeat(300).as_str(), 200).is_err());
    /// ```
    pub fn child(&self, suffix: &str, max_len: usize) -> Result<Self, ConfigError> {
        if suffix.is_empty() || suffix.contains(Self::SEPARATOR) {
            return Err(ConfigError::InvalidId {
                segment: suffix.to_string(),
            });
        }
        Self::bounded(format!("{}{}{}", self.0, Self::SEPARATOR, suffix), max_len)
    }

    fn bounded(id: String, max_len: usize) -> Result<Self, ConfigError> {
        let len = id.chars().count();
        if len > max_len {
            return Err(ConfigError::IdTooLong { id, len, max: max_len });
        }
        Ok(Self(Arc::from(id)))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the path.
    pub fn name(&self) -> &str {
        self.0
            .rsplit(Self::SEPARATOR)
            .next()
            .unwrap_or(&self.0)
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.0.split(Self::SEPARATOR).count()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TaskId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl From<TaskId> for Arc<str> {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

impl From<&TaskId> for Arc<str> {
    fn from(id: &TaskId) -> Self {
        Arc::clone(&id.0)
    }
}
