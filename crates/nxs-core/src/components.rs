//! Attribute negotiation
//!
//! Decides which per-vertex and per-face channels end up in the output from
//! what the source provides and what the options ask for.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::options::AttributeOptions;

bitflags! {
    /// Channels stored in the hierarchy
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AttributeMask: u32 {
        const FACES = 0x1;
        const NORMALS = 0x2;
        const COLORS = 0x4;
        const TEXTURES = 0x8;
    }
}

impl AttributeMask {
    /// Space separated names of the enabled channels, for logs
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        if names.is_empty() {
            String::from("none")
        } else {
            names.join(" ").to_lowercase()
        }
    }
}

/// What the loaded source actually carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceCapabilities {
    pub has_normals: bool,
    pub has_colors: bool,
    pub has_textures: bool,
}

/// Compute the output attribute mask.
///
/// Each channel is decided on its own; none of the rules looks at another
/// rule's outcome.
pub fn negotiate(options: &AttributeOptions, source: SourceCapabilities) -> AttributeMask {
    let mut mask = AttributeMask::empty();

    if !options.point_cloud {
        mask |= AttributeMask::FACES;
    }

    if (!options.disable_normals && (!options.point_cloud || source.has_normals))
        || options.force_normals
    {
        mask |= AttributeMask::NORMALS;
    }

    if (source.has_colors && !options.disable_colors) || options.force_colors {
        mask |= AttributeMask::COLORS;
    }

    if source.has_textures && !options.disable_texcoords {
        mask |= AttributeMask::TEXTURES;
    }

    mask
}
