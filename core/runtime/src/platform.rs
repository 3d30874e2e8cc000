//! Platform detection for runtime bundles.
//!
//! Each vendor names its archives differently, so a [`Platform`] knows the
//! OS/architecture spelling used by Node.js and Adoptium download URLs as
//! well as the executable suffixes of the binaries inside the bundles.
//!
//! ## Supported Platforms
//!
//! - Linux `x86_64` and ARM64
//! - macOS `x86_64` and ARM64
//! - Windows `x86_64`

use std::fmt;

use crate::errors::InstallError;

/// A supported OS/architecture combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    /// Linux on `x86_64`
    LinuxX64,
    /// Linux on ARM64
    LinuxArm64,
    /// macOS on Intel
    MacosX64,
    /// macOS on Apple Silicon
    MacosArm64,
    /// Windows on `x86_64`
    WindowsX64,
}

impl Platform {
    /// Every platform the catalog knows about.
    pub const ALL: [Platform; 5] = [
        Self::LinuxX64,
        Self::LinuxArm64,
        Self::MacosX64,
        Self::MacosArm64,
        Self::WindowsX64,
    ];

    /// Detects the current platform based on compile-time configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InstallError::UnsupportedPlatform`] if the current OS/architecture
    /// combination has no runtime bundles.
    pub fn detect() -> Result<Self, InstallError> {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            return Ok(Self::LinuxX64);
        }

        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        {
            return Ok(Self::LinuxArm64);
        }

        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        {
            return Ok(Self::MacosX64);
        }

        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            return Ok(Self::MacosArm64);
        }

        #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
        {
            return Ok(Self::WindowsX64);
        }

        #[allow(unreachable_code)]
        {
            return Err(InstallError::UnsupportedPlatform {
                os: std::env::consts::OS.to_string(),
                arch: std::env::consts::ARCH.to_string(),
            });
        }
    }

    /// Returns the platform identifier used in log lines and archive file names.
    #[must_use = "returns the platform string without side effects"]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LinuxX64 => "linux-x64",
            Self::LinuxArm64 => "linux-arm64",
            Self::MacosX64 => "macos-x64",
            Self::MacosArm64 => "macos-arm64",
            Self::WindowsX64 => "windows-x64",
        }
    }

    /// Returns whether this platform is Windows.
    #[must_use = "returns platform check result without side effects"]
    pub fn is_windows(self) -> bool {
        matches!(self, Self::WindowsX64)
    }

    /// Returns the executable suffix (`.exe` on Windows).
    #[must_use = "returns the extension string without side effects"]
    pub fn executable_extension(self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }

    /// Returns the batch-script suffix used by `npm`, `ng` and `mvn` on Windows.
    #[must_use = "returns the extension string without side effects"]
    pub fn script_extension(self) -> &'static str {
        if self.is_windows() { ".cmd" } else { "" }
    }

    /// OS segment of Node.js distribution file names (`node-v20.18.0-<os>-<arch>`).
    #[must_use = "returns the OS string without side effects"]
    pub fn node_os(self) -> &'static str {
        match self {
            Self::LinuxX64 | Self::LinuxArm64 => "linux",
            Self::MacosX64 | Self::MacosArm64 => "darwin",
            Self::WindowsX64 => "win",
        }
    }

    /// Architecture segment of Node.js distribution file names.
    #[must_use = "returns the architecture string without side effects"]
    pub fn node_arch(self) -> &'static str {
        match self {
            Self::LinuxX64 | Self::MacosX64 | Self::WindowsX64 => "x64",
            Self::LinuxArm64 | Self::MacosArm64 => "arm64",
        }
    }

    /// OS segment of the Adoptium binary API.
    #[must_use = "returns the OS string without side effects"]
    pub fn adoptium_os(self) -> &'static str {
        match self {
            Self::LinuxX64 | Self::LinuxArm64 => "linux",
            Self::MacosX64 | Self::MacosArm64 => "mac",
            Self::WindowsX64 => "windows",
        }
    }

    /// Architecture segment of the Adoptium binary API.
    #[must_use = "returns the architecture string without side effects"]
    pub fn adoptium_arch(self) -> &'static str {
        match self {
            Self::LinuxX64 | Self::MacosX64 | Self::WindowsX64 => "x64",
            Self::LinuxArm64 | Self::MacosArm64 => "aarch64",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
