//! Command codes carried in message headers.

/// Operation requested by a message.
///
/// The wire encoding is a big-endian `i32` at header offset 28. Parsers
/// reject values outside this set; two codes are accepted on the wire even
/// though their semantics are undocumented on current firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Command {
    /// Reflect the body back to the sender.
    Echo = 1,
    /// Write a firmware image to the primary flash partition.
    FlashPrimary = 3,
    /// Observed on the wire between the flash commands; semantics
    /// undocumented.
    Reserved4 = 4,
    /// Write a firmware image to the secondary flash partition.
    FlashSecondary = 5,
    /// Write a bootloader image.
    FlashBootloader = 6,
    /// Read one or more properties.
    GetProperty = 0x14,
    /// Write one or more properties.
    SetProperty = 0x15,
    /// Invoke a named action on the station.
    Perform = 0x16,
    /// Observed on the wire next to `Perform`; semantics undocumented.
    Reserved23 = 0x17,
    /// Subscribe to unsolicited change events.
    Monitor = 0x18,
    /// Remote procedure call with plist-encoded arguments.
    Rpc = 0x19,
    /// SRP authentication exchange.
    Authenticate = 0x1a,
    /// Read the station's capability list.
    GetFeatures = 0x1b,
}

impl Command {
    /// Wire encoding of this command.
    #[must_use]
    pub fn to_i32(self) -> i32 {
        self as i32
    }

    /// Decode a wire value. `None` if the code is not recognized.
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Echo),
            3 => Some(Self::FlashPrimary),
            4 => Some(Self::Reserved4),
            5 => Some(Self::FlashSecondary),
            6 => Some(Self::FlashBootloader),
            0x14 => Some(Self::GetProperty),
            0x15 => Some(Self::SetProperty),
            0x16 => Some(Self::Perform),
            0x17 => Some(Self::Reserved23),
            0x18 => Some(Self::Monitor),
            0x19 => Some(Self::Rpc),
            0x1a => Some(Self::Authenticate),
            0x1b => Some(Self::GetFeatures),
            _ => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Echo => "echo",
            Self::FlashPrimary => "flash-primary",
            Self::Reserved4 => "reserved-4",
            Self::FlashSecondary => "flash-secondary",
            Self::FlashBootloader => "flash-bootloader",
            Self::GetProperty => "get-property",
            Self::SetProperty => "set-property",
            Self::Perform => "perform",
            Self::Reserved23 => "reserved-23",
            Self::Monitor => "monitor",
            Self::Rpc => "rpc",
            Self::Authenticate => "authenticate",
            Self::GetFeatures => "get-features",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_known_code() {
        let all = [
            Command::Echo,
            Command::FlashPrimary,
            Command::Reserved4,
            Command::FlashSecondary,
            Command::FlashBootloader,
            Command::GetProperty,
            Command::SetProperty,
            Command::Perform,
            Command::Reserved23,
            Command::Monitor,
            Command::Rpc,
            Command::Authenticate,
            Command::GetFeatures,
        ];
        for cmd in all {
            assert_eq!(Command::from_i32(cmd.to_i32()), Some(cmd));
        }
    }

    #[test]
    fn rejects_unknown_codes() {
        for value in [0, 2, 7, 0x13, 0x1c, -1, i32::MAX] {
            assert_eq!(Command::from_i32(value), None);
        }
    }

    #[test]
    fn wire_values() {
        assert_eq!(Command::GetProperty.to_i32(), 20);
        assert_eq!(Command::Authenticate.to_i32(), 26);
    }
}
