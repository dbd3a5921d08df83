//! Battery state to visual mapping.
//!
//! Pure functions, no side effects: a battery reading picks an icon from the
//! discrete band table, and the instance settings shape the title text. The
//! compositor consumes the selected [`Icon`] to produce the final image.

use crate::instance::Instance;

/// Discharge band boundaries, descending. Each has its own icon asset.
pub const LEVEL_BANDS: [u8; 12] = [100, 95, 90, 80, 70, 60, 50, 40, 30, 20, 10, 0];

/// Icon selector produced by the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    /// Charging at 80% or above
    ChargingHigh,
    /// Charging at 40..=79%
    ChargingMid,
    /// Charging below 40%
    ChargingLow,
    /// Discharging, at the given band boundary (one of [`LEVEL_BANDS`])
    Level(u8),
    /// Device unreachable
    Asleep,
}

impl Icon {
    /// File name of the icon asset, relative to the configured asset
    /// directory.
    pub fn asset_name(&self) -> String {
        match self {
            Icon::ChargingHigh => "charging_high.png".to_string(),
            Icon::ChargingMid => "charging_mid.png".to_string(),
            Icon::ChargingLow => "charging_low.png".to_string(),
            Icon::Level(band) => format!("battery_{band}.png"),
            Icon::Asleep => "asleep.png".to_string(),
        }
    }
}

/// Pick the icon for a battery reading.
pub fn select_icon(percentage: u8, charging: bool) -> Icon {
    if charging {
        return if percentage >= 80 {
            Icon::ChargingHigh
        } else if percentage >= 40 {
            Icon::ChargingMid
        } else {
            Icon::ChargingLow
        };
    }

    // The step table has no icon of its own for 1-9%; that range borrows
    // the 10% icon. Exactly 0 gets the empty icon.
    if percentage > 0 && percentage < 10 {
        return Icon::Level(10);
    }

    let band = LEVEL_BANDS
        .iter()
        .copied()
        .find(|&band| band <= percentage)
        .unwrap_or(0);
    Icon::Level(band)
}

/// Build the widget title: the display name (when set), the configured
/// number of blank lines, then the percentage.
pub fn compose_title(display_name: &str, percentage: u8, spacing_lines: u8) -> String {
    if display_name.is_empty() {
        format!("{percentage}%")
    } else {
        let spacing = "\n".repeat(spacing_lines as usize);
        format!("{display_name}{spacing}{percentage}%")
    }
}

/// The full visual for an instance: icon plus title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visual {
    pub icon: Icon,
    pub title: String,
}

/// Map an instance's current state to its visual.
///
/// The asleep state overrides everything else: asleep icon, empty title.
pub fn visual_for(instance: &Instance) -> Visual {
    if instance.asleep {
        return Visual {
            icon: Icon::Asleep,
            title: String::new(),
        };
    }

    Visual {
        icon: select_icon(instance.percentage, instance.charging),
        title: compose_title(
            &instance.display_name,
            instance.percentage,
            instance.title_spacing,
        ),
    }
}
