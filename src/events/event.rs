//! # Domain events delivered to plugins.
//!
//! A [`DomainEvent`] is an immutable, timestamped record of something that
//! happened upstream. Its concrete type is carried by [`EventPayload`]; the
//! payload's [`EventType`] tag is what plugins declare interest in.
//!
//! Decoding vendor payloads into these types happens outside this crate: the
//! relay only sees already-typed events. Backup schedules and generic detail
//! maps are kept as opaque JSON for plugins to interpret.
//!
//! ## Example
//! ```rust
//! use relayvisor::{DomainEvent, EventPayload, EventType, VmDetails};
//!
//! let ev = DomainEvent::now(EventPayload::UndeployVm(
//!     VmDetails::new("vm1").with_hypervisor("kvm-01").with_hypervisor_ip("10.0.0.4"),
//! ));
//!
//! assert_eq!(ev.event_type(), EventType::UndeployVm);
//! assert_eq!(ev.vm().map(|v| v.hypervisor_names()), Some(vec!["kvm-01", "10.0.0.4"]));
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type tag of a domain event; the unit of plugin capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A virtual machine requested (or is scheduled for) a backup.
    BackupVm,
    /// A virtual machine was deployed.
    DeployVm,
    /// A virtual machine was undeployed.
    UndeployVm,
    /// Any other upstream event, passed through untyped.
    Generic,
}

impl EventType {
    /// All known event types, in declaration order.
    pub const ALL: [EventType; 4] = [
        EventType::BackupVm,
        EventType::DeployVm,
        EventType::UndeployVm,
        EventType::Generic,
    ];

    /// Stable name used in logs and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::BackupVm => "BackupVm",
            EventType::DeployVm => "DeployVm",
            EventType::UndeployVm => "UndeployVm",
            EventType::Generic => "Generic",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Virtual machine details shared by all VM events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDetails {
    /// Name of the virtual machine.
    pub name: String,
    /// Name of the hypervisor hosting the machine, if known.
    pub hypervisor_name: Option<String>,
    /// Address of the hypervisor hosting the machine, if known.
    pub hypervisor_ip: Option<String>,
    /// Hypervisor technology (`KVM`, `VMX_04`, ...), if known.
    pub hypervisor_type: Option<String>,
}

impl VmDetails {
    /// Creates details for the named machine.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attaches the hypervisor name.
    #[inline]
    pub fn with_hypervisor(mut self, name: impl Into<String>) -> Self {
        self.hypervisor_name = Some(name.into());
        self
    }

    /// Attaches the hypervisor address.
    #[inline]
    pub fn with_hypervisor_ip(mut self, ip: impl Into<String>) -> Self {
        self.hypervisor_ip = Some(ip.into());
        self
    }

    /// Attaches the hypervisor technology.
    #[inline]
    pub fn with_hypervisor_type(mut self, kind: impl Into<String>) -> Self {
        self.hypervisor_type = Some(kind.into());
        self
    }

    /// Every known way to address the hypervisor: its name first, then its address.
    pub fn hypervisor_names(&self) -> Vec<&str> {
        self.hypervisor_name
            .iter()
            .chain(self.hypervisor_ip.iter())
            .map(String::as_str)
            .collect()
    }
}

/// Typed payload of a domain event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// Backup request; `schedule` is the machine's backup configuration blob
    /// (complete / snapshot / filesystem sections) left for plugins to interpret.
    BackupVm {
        /// The machine to back up.
        vm: VmDetails,
        /// Raw backup schedule configuration.
        schedule: Value,
    },
    /// Machine deployed.
    DeployVm(VmDetails),
    /// Machine undeployed.
    UndeployVm(VmDetails),
    /// Untyped upstream event with its detail map.
    Generic(Map<String, Value>),
}

impl EventPayload {
    /// Returns the type tag of this payload.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::BackupVm { .. } => EventType::BackupVm,
            EventPayload::DeployVm(_) => EventType::DeployVm,
            EventPayload::UndeployVm(_) => EventType::UndeployVm,
            EventPayload::Generic(_) => EventType::Generic,
        }
    }
}

/// Immutable, timestamped upstream event.
///
/// Timestamps are meaningful for ordering but not necessarily unique; the
/// dispatcher adds its own sequence number to break ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// When the event happened upstream.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub payload: EventPayload,
}

impl DomainEvent {
    /// Creates an event with an explicit timestamp.
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        Self { timestamp, payload }
    }

    /// Creates an event stamped with the current time.
    pub fn now(payload: EventPayload) -> Self {
        Self::new(Utc::now(), payload)
    }

    /// Returns the type tag used for capability matching.
    #[inline]
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    /// Returns the machine details for VM events.
    pub fn vm(&self) -> Option<&VmDetails> {
        match &self.payload {
            EventPayload::BackupVm { vm, .. }
            | EventPayload::DeployVm(vm)
            | EventPayload::UndeployVm(vm) => Some(vm),
            EventPayload::Generic(_) => None,
        }
    }
}

impl fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ts:{}", self.event_type(), self.timestamp.to_rfc3339())?;
        if let Some(vm) = self.vm() {
            write!(f, " vm:{}", vm.name)?;
        }
        Ok(())
    }
}
