//! Static registry of canonical object kinds.
//!
//! Every kind of object the engine can store is declared here, together with
//! the attribute names identity resolution keys on. Declaration order matters:
//! it doubles as the relation-resolution order, so leaf kinds (tags, tenants,
//! roles, sites) come before the kinds that reference them.

use serde::{Deserialize, Serialize};

/// The fixed set of object kinds the inventory can hold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// Marker tag attachable to any other object.
    Tag,
    /// Owning organization or customer.
    Tenant,
    /// Functional role of a device or VM (hypervisor, switch, ...).
    DeviceRole,
    /// Physical or logical location.
    Site,
    /// Virtual routing and forwarding domain.
    Vrf,
    /// Layer-2 VLAN.
    Vlan,
    /// IP network prefix.
    Prefix,
    /// Virtualization cluster.
    Cluster,
    /// Physical compute node.
    Device,
    /// Virtual machine.
    VirtualMachine,
    /// Physical network interface, owned by a device.
    Interface,
    /// Virtual network interface, owned by a VM.
    VmInterface,
    /// IP address, optionally assigned to an interface.
    IpAddress,
}

/// Describes how one kind is identified and exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindDescriptor {
    /// The kind this descriptor belongs to.
    pub kind: ObjectKind,
    /// Registry-facing name; also the key used in graph exports.
    pub name: &'static str,
    /// Attribute whose value identifies an object of this kind.
    pub primary_key: &'static str,
    /// Attribute used to disambiguate same-named objects, when one key is
    /// not enough (e.g. two interfaces both named "eth0" on different parents).
    pub secondary_key: Option<&'static str>,
    /// Attributes that reference another kind. Scalar values arriving under
    /// these names are promoted to reference descriptors before ingestion.
    pub relations: &'static [(&'static str, ObjectKind)],
}

impl ObjectKind {
    /// All kinds in declaration (= resolution) order.
    pub const ALL: [ObjectKind; 13] = [
        ObjectKind::Tag,
        ObjectKind::Tenant,
        ObjectKind::DeviceRole,
        ObjectKind::Site,
        ObjectKind::Vrf,
        ObjectKind::Vlan,
        ObjectKind::Prefix,
        ObjectKind::Cluster,
        ObjectKind::Device,
        ObjectKind::VirtualMachine,
        ObjectKind::Interface,
        ObjectKind::VmInterface,
        ObjectKind::IpAddress,
    ];

    /// Number of declared kinds.
    pub const COUNT: usize = Self::ALL.len();

    /// Returns the descriptor for this kind.
    pub fn descriptor(self) -> &'static KindDescriptor {
        match self {
            ObjectKind::Tag => &KindDescriptor {
                kind: ObjectKind::Tag,
                name: "tag",
                primary_key: "name",
                secondary_key: None,
                relations: &[],
            },
            ObjectKind::Tenant => &KindDescriptor {
                kind: ObjectKind::Tenant,
                name: "tenant",
                primary_key: "name",
                secondary_key: None,
                relations: &[],
            },
            ObjectKind::DeviceRole => &KindDescriptor {
                kind: ObjectKind::DeviceRole,
                name: "device_role",
                primary_key: "name",
                secondary_key: None,
                relations: &[],
            },
            ObjectKind::Site => &KindDescriptor {
                kind: ObjectKind::Site,
                name: "site",
                primary_key: "name",
                secondary_key: None,
                relations: &[("tenant", ObjectKind::Tenant)],
            },
            ObjectKind::Vrf => &KindDescriptor {
                kind: ObjectKind::Vrf,
                name: "vrf",
                primary_key: "name",
                secondary_key: None,
                relations: &[("tenant", ObjectKind::Tenant)],
            },
            ObjectKind::Vlan => &KindDescriptor {
                kind: ObjectKind::Vlan,
                name: "vlan",
                primary_key: "name",
                secondary_key: Some("site"),
                relations: &[("site", ObjectKind::Site), ("tenant", ObjectKind::Tenant)],
            },
            ObjectKind::Prefix => &KindDescriptor {
                kind: ObjectKind::Prefix,
                name: "prefix",
                primary_key: "prefix",
                secondary_key: Some("site"),
                relations: &[
                    ("site", ObjectKind::Site),
                    ("vrf", ObjectKind::Vrf),
                    ("tenant", ObjectKind::Tenant),
                    ("vlan", ObjectKind::Vlan),
                ],
            },
            ObjectKind::Cluster => &KindDescriptor {
                kind: ObjectKind::Cluster,
                name: "cluster",
                primary_key: "name",
                secondary_key: None,
                relations: &[("site", ObjectKind::Site), ("tenant", ObjectKind::Tenant)],
            },
            ObjectKind::Device => &KindDescriptor {
                kind: ObjectKind::Device,
                name: "device",
                primary_key: "name",
                secondary_key: Some("site"),
                relations: &[
                    ("site", ObjectKind::Site),
                    ("cluster", ObjectKind::Cluster),
                    ("role", ObjectKind::DeviceRole),
                    ("tenant", ObjectKind::Tenant),
                ],
            },
            ObjectKind::VirtualMachine => &KindDescriptor {
                kind: ObjectKind::VirtualMachine,
                name: "virtual_machine",
                primary_key: "name",
                secondary_key: Some("cluster"),
                relations: &[
                    ("cluster", ObjectKind::Cluster),
                    ("role", ObjectKind::DeviceRole),
                    ("tenant", ObjectKind::Tenant),
                ],
            },
            ObjectKind::Interface => &KindDescriptor {
                kind: ObjectKind::Interface,
                name: "interface",
                primary_key: "name",
                secondary_key: Some("device"),
                relations: &[("device", ObjectKind::Device)],
            },
            ObjectKind::VmInterface => &KindDescriptor {
                kind: ObjectKind::VmInterface,
                name: "vm_interface",
                primary_key: "name",
                secondary_key: Some("virtual_machine"),
                relations: &[("virtual_machine", ObjectKind::VirtualMachine)],
            },
            ObjectKind::IpAddress => &KindDescriptor {
                kind: ObjectKind::IpAddress,
                name: "ip_address",
                primary_key: "address",
                secondary_key: None,
                relations: &[
                    ("interface", ObjectKind::Interface),
                    ("vm_interface", ObjectKind::VmInterface),
                    ("vrf", ObjectKind::Vrf),
                    ("tenant", ObjectKind::Tenant),
                ],
            },
        }
    }

    /// Registry-facing name of this kind.
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Name of the attribute identifying objects of this kind.
    pub fn primary_key(self) -> &'static str {
        self.descriptor().primary_key
    }

    /// Name of the disambiguating attribute, if this kind declares one.
    pub fn secondary_key(self) -> Option<&'static str> {
        self.descriptor().secondary_key
    }

    /// The kind a relation attribute of this kind points at, if any.
    pub fn relation_target(self, attr: &str) -> Option<ObjectKind> {
        self.descriptor()
            .relations
            .iter()
            .find(|(name, _)| *name == attr)
            .map(|(_, kind)| *kind)
    }

    /// Position in the declaration order; used to index per-kind containers.
    pub fn index(self) -> usize {
        Self::ALL
            .iter()
            .position(|k| *k == self)
            .unwrap_or_default()
    }

    /// Parses a kind from its registry-facing name.
    pub fn from_name(name: &str) -> Option<ObjectKind> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
