// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::id::{CoreId, LeafId, ServerId};
use core::{fmt, panic::Location};

pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// A contract violation raised by the load balancing core
///
/// None of these are transient: they point at a bug in the surrounding wiring or
/// in a packet owner, so callers are expected to abort the run.
#[derive(Clone, Copy, PartialEq)]
pub struct Error {
    kind: Kind,
    location: &'static Location<'static>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("crate", &"conga-core")
            .field("file", &self.file())
            .field("line", &self.location.line())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Self { kind, location } = self;
        let file = self.file();
        let line = location.line();
        write!(f, "[conga-core::{file}:{line}]: {kind}")
    }
}

impl std::error::Error for Error {}

impl Error {
    #[track_caller]
    #[inline]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    #[inline]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    /// Returns true if the error was caused by mishandling a pooled packet
    #[inline]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self.kind,
            Kind::StalePacket | Kind::UnknownFlow | Kind::CounterUnderflow
        )
    }

    #[inline]
    fn file(&self) -> &'static str {
        self.location
            .file()
            .trim_start_matches(concat!(env!("CARGO_MANIFEST_DIR"), "/src/"))
    }
}

impl From<Kind> for Error {
    #[track_caller]
    #[inline]
    fn from(kind: Kind) -> Self {
        Self::new(kind)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
pub enum Kind {
    #[error("the packet handle is not live; it was already released or never allocated")]
    StalePacket,
    #[error("the flow owning the packet does not exist")]
    UnknownFlow,
    #[error("the outstanding packet counter of the flow would go negative")]
    CounterUnderflow,
    #[error("leaf {leaf} is outside of the {leaves} leaves in the fabric")]
    LeafOutOfRange { leaf: LeafId, leaves: u32 },
    #[error("core {core} is outside of the {cores} cores in the fabric")]
    UplinkOutOfRange { core: CoreId, cores: u32 },
    #[error("no uplink has been registered for core {core}")]
    UplinkNotRegistered { core: CoreId },
    #[error("an uplink for core {core} was already registered")]
    DuplicateUplink { core: CoreId },
    #[error("no uplinks have been registered")]
    NoUplinks,
    #[error("server {server} has no downlink on this leaf")]
    UnknownServer { server: ServerId },
    #[error("no downlink toward leaf {leaf} has been registered")]
    NoDownlink { leaf: LeafId },
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: &'static str },
}

impl Kind {
    #[inline]
    #[track_caller]
    pub(crate) fn err(self) -> Error {
        Error::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location_test() {
        let error = Kind::StalePacket.err();
        let message = error.to_string();
        assert!(message.starts_with("[conga-core::error.rs:"), "{message}");
        assert!(message.ends_with("never allocated"), "{message}");
        assert!(error.is_lifecycle());
    }

    #[test]
    fn topology_errors_are_not_lifecycle_test() {
        let error = Kind::LeafOutOfRange {
            leaf: LeafId::new(4),
            leaves: 2,
        }
        .err();
        assert!(!error.is_lifecycle());
        assert_eq!(
            error.kind(),
            &Kind::LeafOutOfRange {
                leaf: LeafId::new(4),
                leaves: 2
            }
        );
    }
}
