//! Camera GPS Protocol
//!
//! Characteristic identifiers and command bytes used to switch the camera
//! into "location from phone" mode.

use crate::domain::models::CharacteristicInfo;
use std::fmt;
use uuid::Uuid;

/// Fragment of the characteristic that arms GPS reception
pub const ENABLE_FRAGMENT: &str = "0000dd30";

/// Fragment of the characteristic that confirms GPS reception
pub const CONFIRM_FRAGMENT: &str = "0000dd31";

/// Fragment of the characteristic receiving location packets
pub const TELEMETRY_FRAGMENT: &str = "0000dd11";

/// Value written to both handshake characteristics
pub const ENABLE_GPS_COMMAND: [u8; 1] = [0x01];

/// Role a characteristic plays in the GPS protocol.
///
/// Firmware revisions differ in the full UUID, so characteristics are
/// located by a fixed fragment of their hyphenated lowercase form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicRole {
    Enable,
    Confirm,
    Telemetry,
}

impl CharacteristicRole {
    pub fn fragment(&self) -> &'static str {
        match self {
            Self::Enable => ENABLE_FRAGMENT,
            Self::Confirm => CONFIRM_FRAGMENT,
            Self::Telemetry => TELEMETRY_FRAGMENT,
        }
    }

    pub fn matches(&self, uuid: &Uuid) -> bool {
        uuid.hyphenated().to_string().contains(self.fragment())
    }
}

impl fmt::Display for CharacteristicRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enable => write!(f, "enable ({})", ENABLE_FRAGMENT),
            Self::Confirm => write!(f, "confirm ({})", CONFIRM_FRAGMENT),
            Self::Telemetry => write!(f, "telemetry ({})", TELEMETRY_FRAGMENT),
        }
    }
}

/// Find the characteristic for `role`. Several matches resolve to the first in discovery order.
pub fn find_characteristic(
    characteristics: &[CharacteristicInfo],
    role: CharacteristicRole,
) -> Option<&CharacteristicInfo> {
    characteristics.iter().find(|c| role.matches(&c.uuid))
}

/// Status code reported by the platform GATT stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GattStatus(pub i32);

impl GattStatus {
    pub const SUCCESS: GattStatus = GattStatus(0);
    /// Generic stack error, usually "device not in range yet"
    pub const ERROR: GattStatus = GattStatus(133);

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for GattStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
