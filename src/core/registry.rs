//! # Plugin registry: capability matching.
//!
//! Maps each [`EventType`] to the plugins interested in it. The index is computed
//! once per registration from the plugin's [`Capabilities`]; after the relay is
//! built the registry is frozen behind an `Arc` and only read.
//!
//! ## Rules
//! - Plugin names are unique.
//! - A type claimed exclusively may be handled by one plugin only, whether the
//!   other plugin binds it explicitly or through a catch-all.
//! - Several catch-all plugins are allowed; each receives every event.
//! - Registration order is delivery order among the interested plugins.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::RegistryError;
use crate::events::EventType;
use crate::plugins::{Capabilities, PluginRuntime};

/// Registered plugins, indexed by the event types they handle.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<Arc<PluginRuntime>>,
    by_type: HashMap<EventType, Vec<Arc<PluginRuntime>>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plugin after checking name uniqueness and exclusive claims.
    ///
    /// A rejected plugin leaves the registry untouched.
    pub fn register(&mut self, runtime: Arc<PluginRuntime>) -> Result<(), RegistryError> {
        if self.plugins.iter().any(|p| p.name() == runtime.name()) {
            return Err(RegistryError::DuplicatePlugin {
                plugin: runtime.name().to_string(),
            });
        }
        for existing in &self.plugins {
            check_exclusive(existing, &runtime)?;
        }

        let caps = runtime.capabilities();
        for event_type in EventType::ALL {
            if caps.matches(event_type) {
                self.by_type
                    .entry(event_type)
                    .or_default()
                    .push(Arc::clone(&runtime));
            }
        }
        debug!(plugin = %runtime.name(), capabilities = ?caps, "plugin registered");
        self.plugins.push(runtime);
        Ok(())
    }

    /// Plugins that handle this event type, in registration order.
    pub fn interested_in(&self, event_type: EventType) -> &[Arc<PluginRuntime>] {
        self.by_type
            .get(&event_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All registered plugins, in registration order.
    pub fn plugins(&self) -> &[Arc<PluginRuntime>] {
        &self.plugins
    }

    /// Looks a plugin up by name.
    pub fn get(&self, name: &str) -> Option<&Arc<PluginRuntime>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    /// Number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// True if no plugin is registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Rejects `candidate` if it and `existing` overlap on a type either claims exclusively.
fn check_exclusive(
    existing: &PluginRuntime,
    candidate: &PluginRuntime,
) -> Result<(), RegistryError> {
    let conflict = |owner: &PluginRuntime, other: &Capabilities| {
        owner
            .capabilities()
            .exclusive_types()
            .find(|t| other.matches(*t))
    };

    if let Some(event_type) = conflict(existing, candidate.capabilities()) {
        return Err(RegistryError::ExclusiveConflict {
            event_type,
            owner: existing.name().to_string(),
            plugin: candidate.name().to_string(),
        });
    }
    if let Some(event_type) = conflict(candidate, existing.capabilities()) {
        return Err(RegistryError::ExclusiveConflict {
            event_type,
            owner: existing.name().to_string(),
            plugin: candidate.name().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::events::DomainEvent;
    use crate::plugins::{HandlerTable, Plugin};
    use crate::notify::TracingNotifier;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    enum Binding {
        Shared(EventType),
        Exclusive(EventType),
        Any,
    }

    struct Stub {
        name: &'static str,
        bindings: Vec<Binding>,
    }

    #[async_trait]
    impl Plugin for Stub {
        fn name(&self) -> &str {
            self.name
        }

        fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
            let mut table = HandlerTable::builder(self.name);
            for binding in &self.bindings {
                let ok = |_: Arc<DomainEvent>| async { Ok::<_, HandlerError>(()) };
                table = match binding {
                    Binding::Shared(t) => table.on(*t, ok),
                    Binding::Exclusive(t) => table.on_exclusive(*t, ok),
                    Binding::Any => table.on_any(ok),
                };
            }
            table.build()
        }
    }

    fn runtime(name: &'static str, bindings: Vec<Binding>) -> Arc<PluginRuntime> {
        let plugin = Arc::new(Stub { name, bindings });
        Arc::new(
            PluginRuntime::new(
                plugin,
                None,
                Duration::from_secs(1),
                CancellationToken::new(),
                Arc::new(TracingNotifier),
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_interest_follows_bindings_and_catch_all() {
        let mut reg = PluginRegistry::new();
        reg.register(runtime("deploys", vec![Binding::Shared(EventType::DeployVm)]))
            .unwrap();
        reg.register(runtime("audit", vec![Binding::Any])).unwrap();
        reg.register(runtime("mirror", vec![Binding::Any])).unwrap();

        let names = |t| {
            reg.interested_in(t)
                .iter()
                .map(|p| p.name().to_string())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(EventType::DeployVm), vec!["deploys", "audit", "mirror"]);
        assert_eq!(names(EventType::BackupVm), vec!["audit", "mirror"]);
        assert_eq!(reg.len(), 3);
    }

    #[test]
    fn test_no_interest_is_empty_slice() {
        let mut reg = PluginRegistry::new();
        reg.register(runtime("deploys", vec![Binding::Shared(EventType::DeployVm)]))
            .unwrap();
        assert!(reg.interested_in(EventType::UndeployVm).is_empty());
    }

    #[test]
    fn test_exclusive_conflicts_both_directions() {
        let mut reg = PluginRegistry::new();
        reg.register(runtime("backup", vec![Binding::Exclusive(EventType::BackupVm)]))
            .unwrap();

        let err = reg
            .register(runtime("other", vec![Binding::Shared(EventType::BackupVm)]))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::ExclusiveConflict {
                event_type: EventType::BackupVm,
                owner: "backup".into(),
                plugin: "other".into()
            }
        );

        let err = reg.register(runtime("audit", vec![Binding::Any])).unwrap_err();
        assert_eq!(err.as_label(), "registry_exclusive_conflict");

        let mut reg = PluginRegistry::new();
        reg.register(runtime("deploys", vec![Binding::Shared(EventType::DeployVm)]))
            .unwrap();
        let err = reg
            .register(runtime("owner", vec![Binding::Exclusive(EventType::DeployVm)]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ExclusiveConflict { .. }));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = PluginRegistry::new();
        reg.register(runtime("p", vec![Binding::Any])).unwrap();
        let err = reg
            .register(runtime("p", vec![Binding::Shared(EventType::Generic)]))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicatePlugin { plugin: "p".into() });
        assert!(reg.get("p").is_some());
    }
}
