//! Mixer data model: device kinds, protocol versions and immutable snapshots

mod kind;
mod patch;
mod snapshot;
mod version;

pub use kind::{BusSlot, DeviceKind};
pub use patch::PatchEffect;
pub use snapshot::{Bus, Routes, Snapshot, Strip};
pub use version::{ProtocolVersion, VersionError};

#[cfg(test)]
pub(crate) use snapshot::tests as fixtures;
