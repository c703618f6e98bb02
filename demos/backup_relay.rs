//! Backup relay demo.
//!
//! Two plugins consume VM events: `inventory` records deploys/undeploys, `backup`
//! owns backup requests and reports backup results that end up in the
//! in-memory metadata store.
//!
//! Run with:
//! ```text
//! RUST_LOG=relayvisor=debug,backup_relay=info cargo run --example backup_relay
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relayvisor::store::{MemoryStore, Metadata};
use relayvisor::{
    Config, DomainEvent, EventPayload, EventType, HandlerError, HandlerTable, Plugin,
    RegistryError, Relay, RestoreEnvelope, RestoreOutcome, ResultEnvelope, ResultSinks,
    ResultSource, ResultSourceRef, ResultStatus, SubResult, VmDetails,
};

#[derive(Default)]
struct Inventory {
    deployed: Mutex<Vec<String>>,
}

#[async_trait]
impl Plugin for Inventory {
    fn name(&self) -> &str {
        "inventory"
    }

    fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
        let on_deploy = Arc::clone(&self);
        let on_undeploy = Arc::clone(&self);
        HandlerTable::builder("inventory")
            .on(EventType::DeployVm, move |ev| {
                let me = Arc::clone(&on_deploy);
                async move {
                    if let Some(vm) = ev.vm() {
                        info!(vm = %vm.name, hypervisors = ?vm.hypervisor_names(), "vm deployed");
                        if let Ok(mut deployed) = me.deployed.lock() {
                            deployed.push(vm.name.clone());
                        }
                    }
                    Ok(())
                }
            })
            .on(EventType::UndeployVm, move |ev| {
                let me = Arc::clone(&on_undeploy);
                async move {
                    let vm = ev.vm().map(|vm| vm.name.clone()).unwrap_or_default();
                    if let Ok(mut deployed) = me.deployed.lock() {
                        deployed.retain(|name| *name != vm);
                    }
                    Ok(())
                }
            })
            .build()
    }
}

/// Backups requested per VM, drained by the result source.
#[derive(Default)]
struct Backup {
    requested: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl Plugin for Backup {
    fn name(&self) -> &str {
        "backup"
    }

    fn handlers(self: Arc<Self>) -> Result<HandlerTable, RegistryError> {
        HandlerTable::builder("backup")
            .on_exclusive(EventType::BackupVm, move |ev| {
                let me = Arc::clone(&self);
                async move {
                    let vm = ev
                        .vm()
                        .map(|vm| vm.name.clone())
                        .ok_or_else(|| HandlerError::fail("backup event without vm"))?;
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    if let Ok(mut requested) = me.requested.lock() {
                        *requested.entry(vm).or_default() += 1;
                    }
                    Ok(())
                }
            })
            .build()
    }

    async fn startup(&self) -> Result<(), HandlerError> {
        info!("backup agent connected");
        Ok(())
    }

    fn result_source(self: Arc<Self>) -> Result<Option<ResultSourceRef>, HandlerError> {
        Ok(Some(Arc::new(BackupResults { plugin: self })))
    }
}

struct BackupResults {
    plugin: Arc<Backup>,
}

#[async_trait]
impl ResultSource for BackupResults {
    fn name(&self) -> &str {
        "backup-results"
    }

    async fn collect(&self, sinks: &ResultSinks) -> Result<(), HandlerError> {
        let drained: Vec<(String, u32)> = match self.plugin.requested.lock() {
            Ok(mut requested) => requested.drain().collect(),
            Err(_) => return Err(HandlerError::fail("request table poisoned")),
        };
        for (vm, count) in drained {
            let now = Utc::now();
            let results = (0..count)
                .map(|i| {
                    SubResult::new(now, ResultStatus::Done)
                        .with_size(1_048_576)
                        .with_restore_point(format!("{vm}-rp-{i}"))
                })
                .collect();
            sinks
                .publish_restores(RestoreEnvelope::new(
                    vm.clone(),
                    vec![RestoreOutcome::new(format!("{vm}-rp-0"), now, ResultStatus::Done)],
                ))
                .await
                .map_err(|e| HandlerError::fail(e.to_string()))?;
            sinks
                .publish(ResultEnvelope::new(vm, results))
                .await
                .map_err(|e| HandlerError::fail(e.to_string()))?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let store = Arc::new(MemoryStore::new("mem://api/vms"));
    for vm in ["web-1", "db-1"] {
        store
            .insert(vm, Metadata::from_value(json!({ "metadata": { "owner": "ops" } }))?)
            .await;
    }

    let cfg = Config {
        tracker_interval: Duration::from_millis(250),
        results_interval: Duration::from_secs(1),
        grace: Duration::from_secs(5),
        ..Config::default()
    };

    let relay = Relay::builder(cfg)
        .with_plugin(Arc::new(Inventory::default()))
        .with_plugin(Arc::new(Backup::default()))
        .with_store(store.clone())
        .build()?;

    let mut last = None;
    for vm in ["web-1", "db-1"] {
        let details = VmDetails::new(vm)
            .with_hypervisor("kvm-01")
            .with_hypervisor_ip("10.0.0.5");
        relay
            .dispatch(DomainEvent::now(EventPayload::DeployVm(details.clone())))
            .await;
        let backup = DomainEvent::now(EventPayload::BackupVm {
            vm: details,
            schedule: json!({ "hour": 3 }),
        });
        last = Some(backup.timestamp);
        relay.dispatch(backup).await;
    }

    let mut watermark = relay.watch_watermark();
    watermark.wait_for(|mark| *mark >= last).await?;
    info!(watermark = ?relay.last_fully_processed(), "all events processed");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    for vm in ["web-1", "db-1"] {
        if let Some(doc) = store.metadata(vm).await {
            info!(vm, metadata = %doc.to_value(), "stored metadata");
        }
    }

    relay.shutdown().await?;
    Ok(())
}
