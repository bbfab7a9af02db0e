//! Device profiles: per-model, per-firmware framebuffer geometry.
//!
//! A profile is selected once at startup and immutable afterwards. It tells
//! the reader how many bytes one frame occupies and where the pixel region
//! sits inside the display server's address space, and tells clients whether
//! the texture must be flipped before presentation.
//!
//! The split points are firmware-driven: small-screen devices moved from a
//! 16-bit framebuffer to a 32-bit one (at a fixed pointer offset) in
//! firmware 3.24, and large-screen devices keep the pixel region behind a
//! GPU allocator whose layout is only discoverable at runtime (see
//! [`crate::capture`]). Finer device classification (the upstream trick of
//! hashing bytes at hard-coded framebuffer offsets to detect orientation)
//! is deliberately not reproduced here; it needs re-derivation on every
//! firmware release, and the profile table below covers the shipping
//! combinations.

use std::path::Path;

// ── DeviceModel ──────────────────────────────────────────────────

/// The tablet hardware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceModel {
    /// Small-screen device (1872×1404 panel).
    Small,
    /// Large-screen device (2154×1624 panel, GPU-managed framebuffer).
    Large,
}

// ── FirmwareVersion ──────────────────────────────────────────────

/// A `major.minor` firmware version, ordered so cutoff checks are plain
/// comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u32,
    pub minor: u32,
}

/// First small-screen firmware with the 32-bit framebuffer layout.
pub const MODERN_FIRMWARE: FirmwareVersion = FirmwareVersion {
    major: 3,
    minor: 24,
};

impl FirmwareVersion {
    /// Parse a version string by splitting on `.` and reading the first two
    /// integers. Trailing components (`3.24.1.2`) are ignored.
    pub fn parse(text: &str) -> Result<Self, crate::StreamError> {
        let mut parts = text.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| crate::StreamError::Firmware(format!("no major version in {text:?}")))?;
        let minor = parts
            .next()
            .and_then(|p| p.parse::<u32>().ok())
            .ok_or_else(|| crate::StreamError::Firmware(format!("no minor version in {text:?}")))?;
        Ok(Self { major, minor })
    }

    /// Read and parse the version file (first line).
    pub fn read_from(path: &Path) -> Result<Self, crate::StreamError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| crate::StreamError::Firmware(format!("{}: {e}", path.display())))?;
        Self::parse(text.lines().next().unwrap_or(""))
    }
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ── DeviceProfile ────────────────────────────────────────────────

/// Immutable framebuffer geometry for one device × firmware combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    /// Screen width in pixels.
    pub width: u32,
    /// Screen height in pixels.
    pub height: u32,
    /// Bytes per pixel (2 on legacy firmware, 4 otherwise).
    pub bytes_per_pixel: u32,
    /// Fixed offset of the pixel region inside the mapped framebuffer
    /// device. Zero for profiles that discover the region at runtime.
    pub pointer_offset: u64,
    /// Whether clients must flip the texture vertically before display.
    pub texture_flipped: bool,
}

impl DeviceProfile {
    /// Small-screen device on firmware < 3.24: 16-bit pixels at the start
    /// of the mapped region.
    pub const fn legacy_small() -> Self {
        Self {
            width: 1872,
            height: 1404,
            bytes_per_pixel: 2,
            pointer_offset: 0,
            texture_flipped: false,
        }
    }

    /// Small-screen device on firmware ≥ 3.24: 32-bit pixels at a fixed
    /// offset inside the mapped region.
    pub const fn modern_small() -> Self {
        Self {
            width: 1404,
            height: 1872,
            bytes_per_pixel: 4,
            pointer_offset: 2_629_632,
            texture_flipped: true,
        }
    }

    /// Large-screen device: 32-bit pixels, region discovered at runtime by
    /// walking the GPU allocator's block headers.
    pub const fn large() -> Self {
        Self {
            width: 2154,
            height: 1624,
            bytes_per_pixel: 4,
            pointer_offset: 0,
            texture_flipped: true,
        }
    }

    /// Bytes in one complete frame.
    pub const fn frame_size(&self) -> usize {
        (self.width * self.height * self.bytes_per_pixel) as usize
    }

    /// Select the profile for a model and (optional) firmware version.
    pub fn select(model: DeviceModel, firmware: Option<FirmwareVersion>) -> Self {
        match model {
            DeviceModel::Large => Self::large(),
            DeviceModel::Small => match firmware {
                Some(v) if v >= MODERN_FIRMWARE => Self::modern_small(),
                _ => Self::legacy_small(),
            },
        }
    }

    /// Determine the profile at startup, reading the firmware version from
    /// `version_file`. An unreadable version file demotes small-screen
    /// devices to the legacy profile with a logged warning.
    pub fn detect(model: DeviceModel, version_file: &Path) -> Self {
        if model == DeviceModel::Large {
            return Self::large();
        }
        match FirmwareVersion::read_from(version_file) {
            Ok(version) => {
                tracing::info!(%version, "firmware version detected");
                Self::select(model, Some(version))
            }
            Err(e) => {
                tracing::warn!("{e}; assuming legacy firmware");
                Self::legacy_small()
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parse_takes_first_two_components() {
        let v = FirmwareVersion::parse("3.24.1.100").unwrap();
        assert_eq!(v, FirmwareVersion { major: 3, minor: 24 });

        let v = FirmwareVersion::parse("2.15\n").unwrap();
        assert_eq!(v, FirmwareVersion { major: 2, minor: 15 });
    }

    #[test]
    fn version_parse_rejects_garbage() {
        assert!(FirmwareVersion::parse("").is_err());
        assert!(FirmwareVersion::parse("three.two").is_err());
        assert!(FirmwareVersion::parse("3").is_err());
    }

    #[test]
    fn version_ordering_matches_cutoff() {
        let old = FirmwareVersion { major: 3, minor: 9 };
        let new = FirmwareVersion { major: 3, minor: 24 };
        let newer = FirmwareVersion { major: 4, minor: 0 };
        assert!(old < MODERN_FIRMWARE);
        assert!(new >= MODERN_FIRMWARE);
        assert!(newer >= MODERN_FIRMWARE);
    }

    #[test]
    fn profile_selection() {
        let legacy = DeviceProfile::select(
            DeviceModel::Small,
            Some(FirmwareVersion { major: 3, minor: 11 }),
        );
        assert_eq!(legacy, DeviceProfile::legacy_small());
        assert_eq!(legacy.frame_size(), 1872 * 1404 * 2);
        assert!(!legacy.texture_flipped);

        let modern = DeviceProfile::select(
            DeviceModel::Small,
            Some(FirmwareVersion { major: 3, minor: 24 }),
        );
        assert_eq!(modern, DeviceProfile::modern_small());
        assert_eq!(modern.pointer_offset, 2_629_632);

        // Firmware is irrelevant for the large device.
        let large = DeviceProfile::select(DeviceModel::Large, None);
        assert_eq!(large, DeviceProfile::large());
        assert_eq!(large.frame_size(), 2154 * 1624 * 4);
    }

    #[test]
    fn unknown_firmware_falls_back_to_legacy() {
        assert_eq!(
            DeviceProfile::select(DeviceModel::Small, None),
            DeviceProfile::legacy_small()
        );
    }

    #[test]
    fn detect_with_missing_file_is_legacy() {
        let profile = DeviceProfile::detect(
            DeviceModel::Small,
            Path::new("/nonexistent/version-file"),
        );
        assert_eq!(profile, DeviceProfile::legacy_small());
    }
}
