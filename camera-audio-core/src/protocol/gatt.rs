//! GATT service and characteristic identifiers plus command byte codes.
//!
//! All identifiers are 16-bit short forms placed in the Bluetooth base UUID
//! `0000xxxx-0000-1000-8000-00805f9b34fb`.

use uuid::Uuid;

/// Bluetooth base UUID with the 16-bit slot zeroed.
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5f9b_34fb;

/// Expand a 16-bit short identifier into a full UUID.
pub const fn short_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Audio Source service: camera microphone → controller.
pub mod source {
    use super::short_uuid;
    use uuid::Uuid;

    pub const SERVICE: Uuid = short_uuid(0x2B8F);
    pub const CONTROL: Uuid = short_uuid(0x2B80);
    pub const STATUS: Uuid = short_uuid(0x2B81);
    pub const DATA: Uuid = short_uuid(0x2B82);
    pub const CONFIG: Uuid = short_uuid(0x2B83);
    pub const LEVELS: Uuid = short_uuid(0x2B84);
    pub const INPUT_SETTINGS: Uuid = short_uuid(0x2B85);
    pub const CAPABILITIES: Uuid = short_uuid(0x2B86);
}

/// Audio Sink service: controller talkback → camera speaker.
pub mod sink {
    use super::short_uuid;
    use uuid::Uuid;

    pub const SERVICE: Uuid = short_uuid(0x2B9F);
    pub const CONTROL: Uuid = short_uuid(0x2B90);
    pub const STATUS: Uuid = short_uuid(0x2B91);
    pub const DATA_IN: Uuid = short_uuid(0x2B92);
    pub const CONFIG: Uuid = short_uuid(0x2B93);
    pub const OUTPUT_SETTINGS: Uuid = short_uuid(0x2B94);
    pub const CODEC_NEGOTIATION: Uuid = short_uuid(0x2B95);
    pub const TALKBACK_CONTROL: Uuid = short_uuid(0x2B96);
}

/// Commands written to the source control characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SourceCommand {
    Start = 0x01,
    Stop = 0x02,
    Pause = 0x03,
    Resume = 0x04,
    ConfigureInput = 0x05,
    GetLevels = 0x06,
    GetCapabilities = 0x07,
}

/// Commands written to the sink control, negotiation and talkback-control characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SinkCommand {
    StartTalkback = 0x01,
    StopTalkback = 0x02,
    ConfigureOutput = 0x03,
    NegotiateCodec = 0x04,
    GetSupportedCodecs = 0x05,
    SetTalkbackLevel = 0x06,
    MuteOutput = 0x07,
    UnmuteOutput = 0x08,
}
