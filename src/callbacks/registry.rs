use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::{ConfigError, TaskError};
use crate::tasks::Task;

static GLOBAL: OnceLock<Arc<CallbackRegistry>> = OnceLock::new();
static EMPTY: OnceLock<Arc<CallbackRegistry>> = OnceLock::new();

/// Signature of an interception handler.
///
/// Receives the task the operation was invoked on; the returned value becomes
/// the operation's result when this handler is the last one executed.
pub type HandlerFn = dyn Fn(&Task) -> Result<Value, TaskError> + Send + Sync;

/// When a handler runs relative to the operation body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interception {
    /// Runs before the body; result is discarded.
    Before,
    /// Replaces the body entirely.
    Instead,
    /// Runs after the body (or its replacement); overrides the result.
    After,
}

impl Interception {
    const ALL: [Interception; 3] = [Interception::Before, Interception::Instead, Interception::After];

    #[inline]
    fn index(self) -> usize {
        match self {
            Interception::Before => 0,
            Interception::Instead => 1,
            Interception::After => 2,
        }
    }

    #[inline]
    fn prefix(self) -> &'static str {
        match self {
            Interception::Before => "before_",
            Interception::Instead => "instead_",
            Interception::After => "after_",
        }
    }

    /// Splits `before_submit` into `(Before, "submit")`.
    fn split(name: &str) -> Option<(Interception, &str)> {
        Self::ALL.into_iter().find_map(|kind| {
            name.strip_prefix(kind.prefix())
                .filter(|event| !event.is_empty())
                .map(|event| (kind, event))
        })
    }
}

impl fmt::Display for Interception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix().trim_end_matches('_'))
    }
}

impl FromStr for Interception {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(Interception::Before),
            "instead" => Ok(Interception::Instead),
            "after" => Ok(Interception::After),
            other => Err(ConfigError::InvalidHandlerName {
                name: other.to_string(),
            }),
        }
    }
}

/// A registered handler together with its owner.
#[derive(Clone)]
pub struct Handler {
    owner: Arc<str>,
    f: Arc<HandlerFn>,
}

impl Handler {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub(crate) fn call(&self, task: &Task) -> Result<Value, TaskError> {
        (self.f)(task)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("owner", &self.owner).finish()
    }
}

type Table = HashMap<String, Vec<Handler>>;

/// Frozen `(kind, event) → [(owner, handler)]` table.
///
/// Read-only after construction; lookups take no locks.
#[derive(Clone, Default, Debug)]
pub struct CallbackRegistry {
    tables: [Table; 3],
}

impl CallbackRegistry {
    /// Starts a new builder.
    pub fn builder() -> CallbackRegistryBuilder {
        CallbackRegistryBuilder::default()
    }

    /// Installs the process-wide registry. Fails if one is already installed.
    pub fn install(registry: Arc<CallbackRegistry>) -> Result<(), Arc<CallbackRegistry>> {
        GLOBAL.set(registry)
    }

    /// Returns the process-wide registry, or an empty one if none was installed.
    pub fn global() -> Arc<CallbackRegistry> {
        match GLOBAL.get() {
            Some(r) => Arc::clone(r),
            None => Arc::clone(EMPTY.get_or_init(|| Arc::new(CallbackRegistry::default()))),
        }
    }

    pub fn before(&self, event: &str) -> &[Handler] {
        self.lookup(Interception::Before, event)
    }

    pub fn instead(&self, event: &str) -> &[Handler] {
        self.lookup(Interception::Instead, event)
    }

    pub fn after(&self, event: &str) -> &[Handler] {
        self.lookup(Interception::After, event)
    }

    /// Handlers for `(kind, event)` in registration order.
    pub fn lookup(&self, kind: Interception, event: &str) -> &[Handler] {
        self.tables[kind.index()]
            .get(event)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// True if no handlers are registered at all.
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(HashMap::is_empty)
    }

    /// Returns a new frozen registry with every handler of `owner` revoked.
    ///
    /// Used when detaching a dynamically loaded extension.
    pub fn without_owner(&self, owner: &str) -> CallbackRegistry {
        let mut tables = self.tables.clone();
        for table in &mut tables {
            table.retain(|_, handlers| {
                handlers.retain(|h| h.owner() != owner);
                !handlers.is_empty()
            });
        }
        CallbackRegistry { tables }
    }
}

/// Mutable builder; registration is serialized by `&mut self`.
#[derive(Default, Debug)]
pub struct CallbackRegistryBuilder {
    inner: CallbackRegistry,
}

impl CallbackRegistryBuilder {
    /// Registers `f` for `(kind, event)` under `owner`.
    ///
    /// Fails with [`ConfigError::DuplicateHandler`] if `owner` already has a
    /// handler for the same pair.
    pub fn register<F>(
        &mut self,
        owner: &str,
        kind: Interception,
        event: &str,
        f: F,
    ) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&Task) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        let handlers = self.inner.tables[kind.index()]
            .entry(event.to_string())
            .or_default();
        if handlers.iter().any(|h| h.owner() == owner) {
            return Err(ConfigError::DuplicateHandler {
                owner: owner.to_string(),
                kind,
                event: event.to_string(),
            });
        }
        handlers.push(Handler {
            owner: Arc::from(owner),
            f: Arc::new(f),
        });
        Ok(self)
    }

    /// Registers a handler by prefixed name: `before_<event>`, `instead_<event>` or `after_<event>`.
    pub fn register_prefixed<F>(
        &mut self,
        owner: &str,
        name: &str,
        f: F,
    ) -> Result<&mut Self, ConfigError>
    where
        F: Fn(&Task) -> Result<Value, TaskError> + Send + Sync + 'static,
    {
        let (kind, event) =
            Interception::split(name).ok_or_else(|| ConfigError::InvalidHandlerName {
                name: name.to_string(),
            })?;
        self.register(owner, kind, event, f)
    }

    /// Freezes the registry.
    pub fn build(self) -> Arc<CallbackRegistry> {
        Arc::new(self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Task) -> Result<Value, TaskError> {
        Ok(Value::Null)
    }

    #[test]
    fn duplicate_owner_kind_event_is_rejected() {
        let mut b = CallbackRegistry::builder();
        b.register("ext", Interception::Before, "submit", noop).unwrap();
        let err = b
            .register("ext", Interception::Before, "submit", noop)
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateHandler { .. }));

        // Other owner, other kind or other event are fine.
        b.register("other", Interception::Before, "submit", noop).unwrap();
        b.register("ext", Interception::After, "submit", noop).unwrap();
        b.register("ext", Interception::Before, "start", noop).unwrap();

        let reg = b.build();
        let owners: Vec<&str> = reg.before("submit").iter().map(Handler::owner).collect();
        assert_eq!(owners, ["ext", "other"]);
    }

    #[test]
    fn prefixed_names_are_validated() {
        let mut b = CallbackRegistry::builder();
        b.register_prefixed("ext", "instead_submit", noop).unwrap();
        assert!(matches!(
            b.register_prefixed("ext", "around_submit", noop),
            Err(ConfigError::InvalidHandlerName { .. })
        ));
        assert!(b.register_prefixed("ext", "after_", noop).is_err());
        assert!(b.register_prefixed("ext", "instead_submit", noop).is_err());

        let reg = b.build();
        assert_eq!(reg.instead("submit").len(), 1);
        assert!(reg.before("submit").is_empty());
    }

    #[test]
    fn revoking_an_owner_keeps_the_rest() {
        let mut b = CallbackRegistry::builder();
        b.register("a", Interception::After, "join", noop).unwrap();
        b.register("b", Interception::After, "join", noop).unwrap();
        b.register("a", Interception::Before, "stop", noop).unwrap();
        let reg = b.build();

        let pruned = reg.without_owner("a");
        assert_eq!(pruned.after("join").len(), 1);
        assert_eq!(pruned.after("join")[0].owner(), "b");
        assert!(pruned.before("stop").is_empty());
        assert_eq!(reg.after("join").len(), 2);
    }

    #[test]
    fn kind_parses_and_displays() {
        assert_eq!("instead".parse::<Interception>().unwrap(), Interception::Instead);
        assert_eq!(Interception::After.to_string(), "after");
        assert!("around".parse::<Interception>().is_err());
    }
}
