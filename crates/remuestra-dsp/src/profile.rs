//! Named conversion quality profiles.

use crate::error::{Error, Result};
use crate::ssrc::SsrcParams;

/// A quality preset: DFT filter length, stop-band attenuation, guard
/// factor and the recommended pipeline precision.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub name: &'static str,
    pub log2_dft_len: u32,
    pub aa: f64,
    pub guard: f64,
    pub double_precision: bool,
}

pub const PROFILES: &[Profile] = &[
    Profile {
        name: "insane",
        log2_dft_len: 18,
        aa: 200.0,
        guard: 8.0,
        double_precision: true,
    },
    Profile {
        name: "high",
        log2_dft_len: 16,
        aa: 170.0,
        guard: 4.0,
        double_precision: true,
    },
    Profile {
        name: "long",
        log2_dft_len: 15,
        aa: 145.0,
        guard: 4.0,
        double_precision: true,
    },
    Profile {
        name: "standard",
        log2_dft_len: 14,
        aa: 145.0,
        guard: 2.0,
        double_precision: false,
    },
    Profile {
        name: "short",
        log2_dft_len: 12,
        aa: 96.0,
        guard: 1.0,
        double_precision: false,
    },
    Profile {
        name: "fast",
        log2_dft_len: 10,
        aa: 96.0,
        guard: 1.0,
        double_precision: false,
    },
    Profile {
        name: "lightning",
        log2_dft_len: 8,
        aa: 96.0,
        guard: 1.0,
        double_precision: false,
    },
];

/// Resolves a profile by name.
pub fn find_profile(name: &str) -> Result<&'static Profile> {
    PROFILES
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::UnknownProfile(name.to_owned()))
}

impl Profile {
    /// Conversion parameters carrying this profile's filter settings.
    pub fn params(&self) -> SsrcParams {
        SsrcParams {
            log2_dft_len: self.log2_dft_len,
            aa: self.aa,
            guard: self.guard,
            ..SsrcParams::default()
        }
    }
}
