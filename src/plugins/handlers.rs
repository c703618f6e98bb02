//! # Handler table: event type → handler closure.
//!
//! A [`HandlerTable`] is built once, when a plugin is registered, from explicit
//! bindings. Each handler is a closure producing a fresh future per event, the
//! same shape as a function-backed task:
//!
//! ```text
//! Fn(Arc<DomainEvent>) -> impl Future<Output = Result<(), HandlerError>>
//! ```
//!
//! ## Rules
//! - A type may be bound at most once; binding it twice fails the build
//!   with [`RegistryError::DuplicateBinding`].
//! - At most one catch-all (`on_any`) binding.
//! - A table with no bindings fails with [`RegistryError::NoBindings`].
//! - A specific binding wins over the catch-all for its type.
//! - An exclusive binding (`on_exclusive`) forbids any other plugin from
//!   handling that type; the registry enforces it.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use relayvisor::{EventType, HandlerError, HandlerTable};
//!
//! let table = HandlerTable::builder("audit")
//!     .on(EventType::DeployVm, |ev| async move {
//!         let _ = ev.vm();
//!         Ok::<_, HandlerError>(())
//!     })
//!     .on_exclusive(EventType::BackupVm, |_ev| async { Ok(()) })
//!     .build()
//!     .unwrap();
//!
//! assert!(table.handles(EventType::DeployVm));
//! assert!(!table.handles(EventType::UndeployVm));
//! assert!(table.capabilities().is_exclusive(EventType::BackupVm));
//! ```

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{HandlerError, RegistryError};
use crate::events::{DomainEvent, EventType};

/// Boxed future returned by a handler invocation.
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Type-erased handler closure.
pub type HandlerFn = Arc<dyn Fn(Arc<DomainEvent>) -> HandlerFuture + Send + Sync>;

fn erase<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Event types a plugin can handle, as seen by the registry.
///
/// Computed once from the handler table and immutable afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    types: BTreeSet<EventType>,
    exclusive: BTreeSet<EventType>,
    any: bool,
}

impl Capabilities {
    /// True if an event of this type would be routed to the plugin.
    pub fn matches(&self, event_type: EventType) -> bool {
        self.any || self.types.contains(&event_type)
    }

    /// True if the plugin claims this type exclusively.
    pub fn is_exclusive(&self, event_type: EventType) -> bool {
        self.exclusive.contains(&event_type)
    }

    /// True if the plugin has a catch-all binding.
    pub fn is_catch_all(&self) -> bool {
        self.any
    }

    /// Types bound explicitly (not through the catch-all).
    pub fn types(&self) -> impl Iterator<Item = EventType> + '_ {
        self.types.iter().copied()
    }

    /// Types claimed exclusively.
    pub fn exclusive_types(&self) -> impl Iterator<Item = EventType> + '_ {
        self.exclusive.iter().copied()
    }
}

/// Immutable mapping from event type to handler.
pub struct HandlerTable {
    plugin: String,
    typed: HashMap<EventType, HandlerFn>,
    any: Option<HandlerFn>,
    capabilities: Capabilities,
}

impl HandlerTable {
    /// Starts a table for the named plugin.
    pub fn builder(plugin: impl Into<String>) -> HandlerTableBuilder {
        HandlerTableBuilder {
            plugin: plugin.into(),
            typed: HashMap::new(),
            any: None,
            capabilities: Capabilities::default(),
            error: None,
        }
    }

    /// Plugin the table was built for.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    /// True if some binding (specific or catch-all) accepts the type.
    pub fn handles(&self, event_type: EventType) -> bool {
        self.capabilities.matches(event_type)
    }

    /// Handler for the type: the specific binding first, then the catch-all.
    pub fn resolve(&self, event_type: EventType) -> Option<&HandlerFn> {
        self.typed.get(&event_type).or(self.any.as_ref())
    }

    /// Capability summary used by the registry.
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }
}

impl std::fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerTable")
            .field("plugin", &self.plugin)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Builder for [`HandlerTable`].
///
/// The first binding error is remembered and returned by [`build`](Self::build),
/// so bindings can be chained without intermediate `?`.
pub struct HandlerTableBuilder {
    plugin: String,
    typed: HashMap<EventType, HandlerFn>,
    any: Option<HandlerFn>,
    capabilities: Capabilities,
    error: Option<RegistryError>,
}

impl HandlerTableBuilder {
    /// Binds a handler to one event type.
    pub fn on<F, Fut>(self, event_type: EventType, f: F) -> Self
    where
        F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.bind(event_type, false, erase(f))
    }

    /// Binds a handler to one event type and claims the type exclusively.
    pub fn on_exclusive<F, Fut>(self, event_type: EventType, f: F) -> Self
    where
        F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.bind(event_type, true, erase(f))
    }

    /// Binds a catch-all handler for every type without a specific binding.
    pub fn on_any<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        if self.any.is_some() {
            self.remember(RegistryError::DuplicateBinding {
                plugin: self.plugin.clone(),
                binding: "any".into(),
            });
            return self;
        }
        self.any = Some(erase(f));
        self.capabilities.any = true;
        self
    }

    fn bind(mut self, event_type: EventType, exclusive: bool, handler: HandlerFn) -> Self {
        if self.typed.contains_key(&event_type) {
            self.remember(RegistryError::DuplicateBinding {
                plugin: self.plugin.clone(),
                binding: event_type.to_string(),
            });
            return self;
        }
        self.typed.insert(event_type, handler);
        self.capabilities.types.insert(event_type);
        if exclusive {
            self.capabilities.exclusive.insert(event_type);
        }
        self
    }

    fn remember(&mut self, err: RegistryError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Finalizes the table.
    pub fn build(self) -> Result<HandlerTable, RegistryError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if self.typed.is_empty() && self.any.is_none() {
            return Err(RegistryError::NoBindings {
                plugin: self.plugin,
            });
        }
        Ok(HandlerTable {
            plugin: self.plugin,
            typed: self.typed,
            any: self.any,
            capabilities: self.capabilities,
        })
    }
}
