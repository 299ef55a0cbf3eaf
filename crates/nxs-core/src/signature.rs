//! Output format signature
//!
//! The descriptor written in every container header: which channels are
//! present and which codec (if any) packed the geometry.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::components::AttributeMask;
use crate::CoreError;

bitflags! {
    /// Container-level format flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SignatureFlags: u32 {
        const PTEXTURE = 0x1;
        const MECO = 0x2;
        const CORTO = 0x4;
        const DEEPZOOM = 0x8;
    }
}

impl SignatureFlags {
    /// Every codec flag
    pub const CODECS: Self = Self::MECO.union(Self::CORTO);
}

/// Geometry codec used for `.nxz` output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Meco,
    Corto,
}

impl Codec {
    /// Signature flag marking this codec
    pub fn flag(&self) -> SignatureFlags {
        match self {
            Self::Meco => SignatureFlags::MECO,
            Self::Corto => SignatureFlags::CORTO,
        }
    }

    /// Codec name as accepted on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::Meco => "meco",
            Self::Corto => "corto",
        }
    }
}

impl FromStr for Codec {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meco" => Ok(Self::Meco),
            "corto" => Ok(Self::Corto),
            other => Err(CoreError::UnknownCodec(other.to_string())),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Format descriptor stored in container headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    /// Channels present in the container
    pub components: AttributeMask,
    /// Format flags
    pub flags: SignatureFlags,
}

impl Signature {
    /// Create a signature for the given channels with no flags set
    pub fn new(components: AttributeMask) -> Self {
        Self {
            components,
            flags: SignatureFlags::empty(),
        }
    }

    /// Copy of this signature marked as packed by `codec`.
    ///
    /// Any codec flag inherited from the source container is cleared first.
    pub fn with_codec(&self, codec: Codec) -> Self {
        let mut signature = *self;
        signature.flags.remove(SignatureFlags::CODECS);
        signature.flags.insert(codec.flag());
        signature
    }

    /// Codec recorded in the flags, if any
    pub fn codec(&self) -> Option<Codec> {
        if self.flags.contains(SignatureFlags::CORTO) {
            Some(Codec::Corto)
        } else if self.flags.contains(SignatureFlags::MECO) {
            Some(Codec::Meco)
        } else {
            None
        }
    }

    /// Whether the geometry is packed by a codec
    pub fn is_compressed(&self) -> bool {
        self.flags.intersects(SignatureFlags::CODECS)
    }
}
