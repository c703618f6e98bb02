use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{
    config::Config,
    dispatcher::Dispatcher,
    outstanding::Outstanding,
    pool::WorkerPool,
    registry::PluginRegistry,
    relay::{LoopHandle, Relay},
    tracker::CompletionTracker,
};
use crate::error::RuntimeError;
use crate::notify::{Notification, NotifierRef, TracingNotifier};
use crate::plugins::{PluginRef, PluginRuntime};
use crate::results::{ReconcileWriter, SourcePoller, result_channels};
use crate::store::StoreRef;

/// Builder for constructing a [`Relay`].
///
/// Everything the relay uses (plugins, notification sink, metadata store,
/// configuration) is injected here; there is no global state.
pub struct RelayBuilder {
    cfg: Config,
    plugins: Vec<PluginRef>,
    notifier: Option<NotifierRef>,
    store: Option<StoreRef>,
}

impl RelayBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            plugins: Vec::new(),
            notifier: None,
            store: None,
        }
    }

    /// Adds a plugin. Registration order is delivery order.
    pub fn with_plugin(mut self, plugin: PluginRef) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Adds several plugins.
    pub fn with_plugins(mut self, plugins: impl IntoIterator<Item = PluginRef>) -> Self {
        self.plugins.extend(plugins);
        self
    }

    /// Sets the notification sink (defaults to [`TracingNotifier`]).
    pub fn with_notifier(mut self, notifier: NotifierRef) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Sets the metadata store results are reconciled into.
    ///
    /// Without a store no writer runs and result sources are not polled.
    pub fn with_store(mut self, store: StoreRef) -> Self {
        self.store = Some(store);
        self
    }

    /// Registers every plugin, then starts the background loops.
    ///
    /// Must be called within a Tokio runtime. Registration errors are reported
    /// before anything is spawned.
    pub fn build(self) -> Result<Relay, RuntimeError> {
        let cfg = self.cfg;
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier));
        let runtime_token = CancellationToken::new();

        let mut registry = PluginRegistry::new();
        for plugin in &self.plugins {
            let capacity = match plugin.queue_capacity() {
                Some(0) => None,
                Some(n) => Some(n),
                None => cfg.plugin_queue_limit(),
            };
            let runtime = PluginRuntime::new(
                Arc::clone(plugin),
                capacity,
                cfg.plugin_poll_interval,
                runtime_token.child_token(),
                Arc::clone(&notifier),
            )?;
            registry.register(Arc::new(runtime))?;
        }
        let registry = Arc::new(registry);

        let outstanding = Arc::new(Outstanding::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            WorkerPool::new(cfg.pool_limit()),
            Arc::clone(&outstanding),
        );
        let tracker = Arc::new(CompletionTracker::new(
            Arc::clone(&outstanding),
            cfg.tracker_poll_timeout,
            cfg.outstanding_alarm(),
            cfg.stale_alarm(),
            Arc::clone(&notifier),
        ));

        let mut loops = Vec::new();
        for runtime in registry.plugins() {
            loops.push(LoopHandle {
                name: format!("plugin:{}", runtime.name()),
                join: tokio::spawn(Arc::clone(runtime).run()),
            });
        }
        loops.push(LoopHandle {
            name: "tracker".into(),
            join: tokio::spawn(
                Arc::clone(&tracker).run(cfg.tracker_interval, runtime_token.child_token()),
            ),
        });

        let sinks = match self.store {
            Some(store) => {
                let (sinks, queues) = result_channels(cfg.result_queue_limit());
                let writer = ReconcileWriter::new(store, Arc::clone(&notifier))
                    .with_hold_limit(cfg.restore_hold_limit());
                loops.push(LoopHandle {
                    name: "writer".into(),
                    join: tokio::spawn(writer.run(queues, runtime_token.child_token())),
                });
                for runtime in registry.plugins() {
                    let source = match Arc::clone(runtime.plugin()).result_source() {
                        Ok(Some(source)) => source,
                        Ok(None) => continue,
                        Err(err) => {
                            notifier.notify(Notification::cause(
                                format!("plugin '{}' could not provide a result source", runtime.name()),
                                err,
                            ));
                            continue;
                        }
                    };
                    let name = format!("results:{}", source.name());
                    let poller = SourcePoller {
                        source,
                        sinks: sinks.clone(),
                        interval: cfg.results_interval,
                        backoff: cfg.results_backoff,
                        notifier: Arc::clone(&notifier),
                    };
                    loops.push(LoopHandle {
                        name,
                        join: tokio::spawn(poller.run(runtime_token.child_token())),
                    });
                }
                Some(sinks)
            }
            None => {
                for runtime in registry.plugins() {
                    if matches!(Arc::clone(runtime.plugin()).result_source(), Ok(Some(_))) {
                        warn!(plugin = %runtime.name(), "no metadata store configured, result source not polled");
                    }
                }
                None
            }
        };

        info!(plugins = registry.len(), loops = loops.len(), "relay started");
        Ok(Relay::new_internal(
            cfg,
            registry,
            dispatcher,
            outstanding,
            tracker,
            sinks,
            runtime_token,
            loops,
        ))
    }
}
