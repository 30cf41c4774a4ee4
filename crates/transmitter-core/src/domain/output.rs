//! Synthetic output and seat descriptors.
//!
//! Each remote contributes one virtual output (the remote display as seen by
//! the host compositor) and one seat (the remote's input devices).  The host
//! turns these descriptors into its own output/seat objects; this crate only
//! describes them.

use serde::{Deserialize, Serialize};

/// Physical width reported for every remote output, in millimetres.
pub const PHYSICAL_WIDTH_MM: i32 = 1024;

/// Physical height reported for every remote output, in millimetres.
pub const PHYSICAL_HEIGHT_MM: i32 = 768;

/// Mode used when the remote is configured without an explicit geometry.
pub const DEFAULT_MODE: OutputMode = OutputMode {
    flags: OutputMode::CURRENT | OutputMode::PREFERRED,
    width: 800,
    height: 600,
    refresh: 51519,
};

/// Refresh rate used with an explicitly configured geometry.
pub const CONFIGURED_REFRESH: i32 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Subpixel {
    #[default]
    Unknown,
    None,
    HorizontalRgb,
    HorizontalBgr,
    VerticalRgb,
    VerticalBgr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Transform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

/// One display mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMode {
    /// Bitmask of [`OutputMode::CURRENT`] and [`OutputMode::PREFERRED`].
    pub flags: u32,
    pub width: i32,
    pub height: i32,
    pub refresh: i32,
}

impl OutputMode {
    pub const CURRENT: u32 = 1 << 0;
    pub const PREFERRED: u32 = 1 << 1;

    /// Mode for a remote configured with `width` × `height`.
    ///
    /// A zero in either dimension means "not configured" and selects
    /// [`DEFAULT_MODE`].
    pub fn for_geometry(width: i32, height: i32) -> Self {
        if width != 0 && height != 0 {
            Self {
                flags: Self::CURRENT | Self::PREFERRED,
                width,
                height,
                refresh: CONFIGURED_REFRESH,
            }
        } else {
            DEFAULT_MODE
        }
    }
}

/// Everything the host needs to create the output of one remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputInfo {
    pub subpixel: Subpixel,
    pub transform: Transform,
    pub scale: i32,
    /// Position of the output in the host's global space.
    pub x: i32,
    pub y: i32,
    /// Physical size in millimetres.
    pub physical_width: i32,
    pub physical_height: i32,
    /// Display model name, taken from the remote's configuration.
    pub model: String,
    pub mode: OutputMode,
}

impl OutputInfo {
    /// Builds the descriptor for a remote with the given model name and
    /// configured geometry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use transmitter_core::domain::output::{OutputInfo, DEFAULT_MODE};
    ///
    /// let info = OutputInfo::for_remote("transmitter_1", 0, 0);
    /// assert_eq!(info.mode, DEFAULT_MODE);
    /// assert_eq!(OutputInfo::for_remote("x", 1920, 720).mode.refresh, 60);
    /// ```
    pub fn for_remote(model: &str, width: i32, height: i32) -> Self {
        Self {
            subpixel: Subpixel::Unknown,
            transform: Transform::Normal,
            scale: 1,
            x: 0,
            y: 0,
            physical_width: PHYSICAL_WIDTH_MM,
            physical_height: PHYSICAL_HEIGHT_MM,
            model: model.to_string(),
            mode: OutputMode::for_geometry(width, height),
        }
    }
}

/// Input capabilities of a remote seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeatCapabilities {
    pub pointer: bool,
    pub keyboard: bool,
    pub touch: bool,
}

/// Descriptor of the seat a remote contributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatInfo {
    pub name: String,
    pub capabilities: SeatCapabilities,
}

impl SeatInfo {
    pub fn for_remote(model: &str) -> Self {
        Self {
            name: format!("{model}-seat"),
            capabilities: SeatCapabilities::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_geometry_uses_configured_size_at_60_hz() {
        // Arrange / Act
        let mode = OutputMode::for_geometry(1920, 720);

        // Assert
        assert_eq!((mode.width, mode.height, mode.refresh), (1920, 720, 60));
        assert_eq!(mode.flags, OutputMode::CURRENT | OutputMode::PREFERRED);
    }

    #[test]
    fn test_for_geometry_with_one_zero_dimension_falls_back_to_default() {
        assert_eq!(OutputMode::for_geometry(1920, 0), DEFAULT_MODE);
        assert_eq!(OutputMode::for_geometry(0, 720), DEFAULT_MODE);
    }

    #[test]
    fn test_output_info_reports_fixed_physical_size_and_model() {
        let info = OutputInfo::for_remote("rear-display", 0, 0);
        assert_eq!(info.physical_width, 1024);
        assert_eq!(info.physical_height, 768);
        assert_eq!(info.model, "rear-display");
        assert_eq!(info.scale, 1);
        assert_eq!(info.transform, Transform::Normal);
    }

    #[test]
    fn test_seat_info_starts_without_capabilities() {
        let seat = SeatInfo::for_remote("rear-display");
        assert_eq!(seat.name, "rear-display-seat");
        assert_eq!(seat.capabilities, SeatCapabilities::default());
    }
}
