//! Fixed-layout binary frames exchanged over the audio characteristics.
//!
//! Every encoder returns a buffer of the frame's declared size with unused
//! bytes zeroed. Multi-byte fields are little-endian. Identifier fields hold
//! UTF-8 truncated to the field width and end at the first zero byte.
//!
//! Enumerated bytes decode leniently: unknown quality, codec and channel
//! values become `Medium`, `Pcm` and `Stereo`, because the camera firmware may
//! send values this crate does not know yet.

use chrono::Utc;

use crate::models::audio_models::{
    AudioCapabilities, AudioFrame, AudioMeterData, ChannelLevel, HardwareFeatures,
};
use crate::models::config::{AudioCodec, AudioConfig, AudioQuality, ChannelLayout};
use crate::models::error::DecodeError;
use crate::models::settings::{
    AudioInputSettings, AudioOutputSettings, InputSource, OutputDestination,
};
use crate::models::state::StreamState;
use crate::protocol::gatt::{SinkCommand, SourceCommand};

pub const SOURCE_COMMAND_LEN: usize = 32;
pub const SOURCE_CONFIG_LEN: usize = 64;
pub const SOURCE_STATUS_LEN: usize = 32;
pub const SINK_COMMAND_LEN: usize = 64;
pub const SINK_CONFIG_LEN: usize = 64;
pub const SINK_STATUS_LEN: usize = 64;
pub const INPUT_SETTINGS_LEN: usize = 32;
pub const OUTPUT_SETTINGS_LEN: usize = 16;
pub const TALKBACK_CONTROL_LEN: usize = 8;

/// Bytes per channel block in a meter frame.
pub const METER_CHANNEL_LEN: usize = 13;

/// Most codecs a supported-codecs reply may list.
pub const MAX_CODEC_LIST: usize = 8;

/// Stream id width in source command frames.
pub const SOURCE_COMMAND_ID_LEN: usize = 15;
/// Stream id width in source config and status frames.
pub const SOURCE_ID_LEN: usize = 16;
/// Talkback id width in sink command frames.
pub const SINK_COMMAND_ID_LEN: usize = 31;
/// Talkback id width in sink config and status frames.
pub const SINK_ID_LEN: usize = 32;

// Bytes actually read from a status frame.
const SOURCE_STATUS_MIN: usize = 21;
const SINK_STATUS_MIN: usize = 38;
const INPUT_SETTINGS_MIN: usize = 12;
const OUTPUT_SETTINGS_MIN: usize = 7;
const CAPABILITIES_HEADER_LEN: usize = 12;

/// Decoded command frame (source or sink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub command: u8,
    pub id: String,
    pub config: AudioConfig,
    /// Present only on sink codec-negotiation frames.
    pub preferred_codec: Option<AudioCodec>,
}

/// Decoded per-stream or per-session configuration frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFrame {
    pub id: String,
    pub config: AudioConfig,
}

/// Source status notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub stream_id: String,
    pub state: StreamState,
    pub latency_ms: u32,
}

/// Sink status notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkStatus {
    pub talkback_id: String,
    pub active: bool,
    pub level: u8,
    pub bytes_received: u32,
}

// --- Identifier helpers ---

/// Longest prefix of `s` that fits in `budget` bytes without splitting a character.
pub fn truncate_utf8(s: &str, budget: usize) -> &str {
    if s.len() <= budget {
        return s;
    }
    let mut end = budget;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Whether an id decoded from a `budget`-wide field refers to `local`.
pub fn id_matches(local: &str, wire: &str, budget: usize) -> bool {
    !wire.is_empty() && truncate_utf8(local, budget) == wire
}

fn write_id(field: &mut [u8], id: &str) {
    let id = truncate_utf8(id, field.len());
    field[..id.len()].copy_from_slice(id.as_bytes());
}

fn read_id(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn ensure_len(frame: &'static str, buf: &[u8], expected: usize) -> Result<(), DecodeError> {
    if buf.len() < expected {
        return Err(DecodeError::Truncated {
            frame,
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_f32(buf: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn optional_u32(value: u32) -> Option<u32> {
    (value != 0).then_some(value)
}

// --- Format block ---

/// 8-byte format block shared by command and config frames:
/// ```text
/// [0]     quality
/// [1]     codec
/// [2]     channel count
/// [3-6]   sample rate (u32)
/// [7]     bit depth
/// ```
fn write_format(block: &mut [u8], config: &AudioConfig) {
    block[0] = config.quality.wire();
    block[1] = config.codec.wire();
    block[2] = config.channels.channel_count();
    block[3..7].copy_from_slice(&config.sample_rate.to_le_bytes());
    block[7] = config.bit_depth;
}

fn read_format(block: &[u8]) -> AudioConfig {
    AudioConfig {
        quality: AudioQuality::from_wire(block[0]),
        codec: AudioCodec::from_wire(block[1]),
        channels: ChannelLayout::from_channel_count(block[2]),
        sample_rate: read_u32(block, 3),
        bit_depth: block[7],
        bit_rate: None,
        buffer_size: None,
    }
}

// --- Source frames ---

/// Encode a 32-byte source command frame.
///
/// Layout:
/// ```text
/// [0]       command
/// [1-15]    stream id
/// [16-23]   format block (zero when `config` is None)
/// ```
pub fn encode_source_command(
    command: SourceCommand,
    stream_id: &str,
    config: Option<&AudioConfig>,
) -> [u8; SOURCE_COMMAND_LEN] {
    let mut frame = [0u8; SOURCE_COMMAND_LEN];
    frame[0] = command as u8;
    write_id(&mut frame[1..16], stream_id);
    if let Some(config) = config {
        write_format(&mut frame[16..24], config);
    }
    frame
}

pub fn decode_source_command(buf: &[u8]) -> Result<CommandFrame, DecodeError> {
    ensure_len("source command", buf, 24)?;
    Ok(CommandFrame {
        command: buf[0],
        id: read_id(&buf[1..16]),
        config: read_format(&buf[16..24]),
        preferred_codec: None,
    })
}

/// Encode a 64-byte per-stream configuration frame.
///
/// Layout:
/// ```text
/// [0-15]    stream id
/// [16-23]   format block
/// [24-27]   bit rate (u32, 0 = unset)
/// [28-31]   buffer size (u32, 0 = unset)
/// ```
pub fn encode_source_config(stream_id: &str, config: &AudioConfig) -> [u8; SOURCE_CONFIG_LEN] {
    let mut frame = [0u8; SOURCE_CONFIG_LEN];
    write_id(&mut frame[0..16], stream_id);
    write_format(&mut frame[16..24], config);
    frame[24..28].copy_from_slice(&config.bit_rate.unwrap_or(0).to_le_bytes());
    frame[28..32].copy_from_slice(&config.buffer_size.unwrap_or(0).to_le_bytes());
    frame
}

pub fn decode_source_config(buf: &[u8]) -> Result<ConfigFrame, DecodeError> {
    ensure_len("source config", buf, 32)?;
    let mut config = read_format(&buf[16..24]);
    config.bit_rate = optional_u32(read_u32(buf, 24));
    config.buffer_size = optional_u32(read_u32(buf, 28));
    Ok(ConfigFrame {
        id: read_id(&buf[0..16]),
        config,
    })
}

/// Encode a 32-byte source status frame.
///
/// Layout:
/// ```text
/// [0-15]    stream id
/// [16]      state
/// [17-20]   latency in ms (u32)
/// ```
pub fn encode_source_status(
    stream_id: &str,
    state: StreamState,
    latency_ms: u32,
) -> [u8; SOURCE_STATUS_LEN] {
    let mut frame = [0u8; SOURCE_STATUS_LEN];
    write_id(&mut frame[0..16], stream_id);
    frame[16] = state.wire();
    frame[17..21].copy_from_slice(&latency_ms.to_le_bytes());
    frame
}

pub fn decode_source_status(buf: &[u8]) -> Result<SourceStatus, DecodeError> {
    ensure_len("source status", buf, SOURCE_STATUS_MIN)?;
    Ok(SourceStatus {
        stream_id: read_id(&buf[0..16]),
        state: StreamState::from_wire(buf[16])?,
        latency_ms: read_u32(buf, 17),
    })
}

/// Encode a 32-byte input settings frame.
///
/// Layout:
/// ```text
/// [0]   muted            [6]   compressor
/// [1]   phantom power    [7]   limiter
/// [2]   low-cut filter   [8]   noise suppression
/// [3]   wind reduction   [9]   gain
/// [4]   monitoring       [10]  monitor level
/// [5]   auto gain        [11]  input source
/// ```
pub fn encode_input_settings(settings: &AudioInputSettings) -> [u8; INPUT_SETTINGS_LEN] {
    let mut frame = [0u8; INPUT_SETTINGS_LEN];
    frame[0] = settings.muted as u8;
    frame[1] = settings.phantom_power as u8;
    frame[2] = settings.low_cut_filter as u8;
    frame[3] = settings.wind_noise_reduction as u8;
    frame[4] = settings.monitoring as u8;
    frame[5] = settings.auto_gain as u8;
    frame[6] = settings.compressor as u8;
    frame[7] = settings.limiter as u8;
    frame[8] = settings.noise_suppression as u8;
    frame[9] = settings.gain;
    frame[10] = settings.monitor_level;
    frame[11] = settings.source.wire();
    frame
}

pub fn decode_input_settings(buf: &[u8]) -> Result<AudioInputSettings, DecodeError> {
    ensure_len("input settings", buf, INPUT_SETTINGS_MIN)?;
    Ok(AudioInputSettings {
        muted: buf[0] != 0,
        phantom_power: buf[1] != 0,
        low_cut_filter: buf[2] != 0,
        wind_noise_reduction: buf[3] != 0,
        monitoring: buf[4] != 0,
        auto_gain: buf[5] != 0,
        compressor: buf[6] != 0,
        limiter: buf[7] != 0,
        noise_suppression: buf[8] != 0,
        gain: buf[9],
        monitor_level: buf[10],
        source: InputSource::from_wire(buf[11]),
    })
}

/// Encode a meter frame: channel count, then one 13-byte block per channel
/// (level f32, peak f32, VU f32, overload flag). At most 255 channels are written.
pub fn encode_meter_data(channels: &[ChannelLevel]) -> Vec<u8> {
    let channels = &channels[..channels.len().min(u8::MAX as usize)];
    let mut buf = Vec::with_capacity(1 + channels.len() * METER_CHANNEL_LEN);
    buf.push(channels.len() as u8);
    for channel in channels {
        buf.extend_from_slice(&channel.level.to_le_bytes());
        buf.extend_from_slice(&channel.peak.to_le_bytes());
        buf.extend_from_slice(&channel.vu.to_le_bytes());
        buf.push(channel.overload as u8);
    }
    buf
}

/// Decode a meter frame, rejecting one whose channel count overruns the buffer.
pub fn decode_meter_data(buf: &[u8]) -> Result<AudioMeterData, DecodeError> {
    let Some(&count) = buf.first() else {
        return Err(DecodeError::Empty("meter"));
    };
    let expected = 1 + count as usize * METER_CHANNEL_LEN;
    ensure_len("meter", buf, expected)?;

    let channels = buf[1..expected]
        .chunks_exact(METER_CHANNEL_LEN)
        .map(|block| ChannelLevel {
            level: read_f32(block, 0),
            peak: read_f32(block, 4),
            vu: read_f32(block, 8),
            overload: block[12] != 0,
        })
        .collect();

    Ok(AudioMeterData {
        channels,
        timestamp: Utc::now(),
    })
}

/// Wrap a data notification as an audio frame tagged with the stream's codec.
pub fn decode_audio_frame(
    stream_id: &str,
    codec: AudioCodec,
    payload: &[u8],
) -> Result<AudioFrame, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::Empty("audio data"));
    }
    Ok(AudioFrame {
        stream_id: stream_id.to_string(),
        codec,
        data: payload.to_vec(),
        received_at: Utc::now(),
    })
}

// --- Capabilities ---

fn features_to_bits(f: &HardwareFeatures) -> u16 {
    let flags = [
        f.internal_mic,
        f.external_input,
        f.xlr_input,
        f.phantom_power,
        f.headphone_output,
        f.line_output,
        f.auto_gain,
        f.noise_reduction,
        f.compressor,
        f.limiter,
        f.low_cut_filter,
    ];
    flags
        .iter()
        .enumerate()
        .fold(0u16, |bits, (i, &on)| if on { bits | (1 << i) } else { bits })
}

fn features_from_bits(bits: u16) -> HardwareFeatures {
    let bit = |i: u16| bits & (1 << i) != 0;
    HardwareFeatures {
        internal_mic: bit(0),
        external_input: bit(1),
        xlr_input: bit(2),
        phantom_power: bit(3),
        headphone_output: bit(4),
        line_output: bit(5),
        auto_gain: bit(6),
        noise_reduction: bit(7),
        compressor: bit(8),
        limiter: bit(9),
        low_cut_filter: bit(10),
    }
}

fn mask_of<T: PartialEq + Copy>(table: &[T], present: &[T]) -> u8 {
    table
        .iter()
        .enumerate()
        .filter(|(_, v)| present.contains(*v))
        .fold(0u8, |mask, (i, _)| mask | (1 << i))
}

fn unmask<T: Copy>(table: &[T], mask: u8) -> Vec<T> {
    table
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << *i) != 0)
        .map(|(_, v)| *v)
        .collect()
}

/// Sequential reader for the variable-length capabilities frame.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self.pos + n;
        ensure_len("capabilities", self.buf, end)?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(read_u32(self.take(4)?, 0))
    }
}

/// Encode a capabilities frame.
///
/// Layout:
/// ```text
/// [0-1]    hardware feature bits (u16)
/// [2]      codec mask        [3]  quality mask
/// [4]      channel mask      [5]  max concurrent streams
/// [6-9]    max bit rate (u32)
/// [10-11]  min latency in ms (u16)
/// [12..]   n, n × sample rate (u32); m, m × bit depth (u8); k, k × buffer size (u32)
/// ```
/// Each list is capped at 255 entries.
pub fn encode_capabilities(caps: &AudioCapabilities) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        CAPABILITIES_HEADER_LEN
            + 3
            + caps.sample_rates.len() * 4
            + caps.bit_depths.len()
            + caps.buffer_sizes.len() * 4,
    );
    buf.extend_from_slice(&features_to_bits(&caps.features).to_le_bytes());
    buf.push(mask_of(&AudioCodec::ALL, &caps.codecs));
    buf.push(mask_of(&AudioQuality::ALL, &caps.qualities));
    buf.push(mask_of(&ChannelLayout::ALL, &caps.channel_layouts));
    buf.push(caps.max_concurrent_streams);
    buf.extend_from_slice(&caps.max_bit_rate.to_le_bytes());
    buf.extend_from_slice(&caps.min_latency_ms.to_le_bytes());

    let rates = &caps.sample_rates[..caps.sample_rates.len().min(255)];
    buf.push(rates.len() as u8);
    rates.iter().for_each(|r| buf.extend_from_slice(&r.to_le_bytes()));

    let depths = &caps.bit_depths[..caps.bit_depths.len().min(255)];
    buf.push(depths.len() as u8);
    buf.extend_from_slice(depths);

    let sizes = &caps.buffer_sizes[..caps.buffer_sizes.len().min(255)];
    buf.push(sizes.len() as u8);
    sizes.iter().for_each(|s| buf.extend_from_slice(&s.to_le_bytes()));
    buf
}

pub fn decode_capabilities(buf: &[u8]) -> Result<AudioCapabilities, DecodeError> {
    ensure_len("capabilities", buf, CAPABILITIES_HEADER_LEN)?;
    let mut cursor = Cursor {
        buf,
        pos: CAPABILITIES_HEADER_LEN,
    };

    let rate_count = cursor.u8()?;
    let sample_rates = (0..rate_count).map(|_| cursor.u32()).collect::<Result<Vec<_>, _>>()?;
    let depth_count = cursor.u8()? as usize;
    let bit_depths = cursor.take(depth_count)?.to_vec();
    let size_count = cursor.u8()?;
    let buffer_sizes = (0..size_count).map(|_| cursor.u32()).collect::<Result<Vec<_>, _>>()?;

    Ok(AudioCapabilities {
        codecs: unmask(&AudioCodec::ALL, buf[2]),
        qualities: unmask(&AudioQuality::ALL, buf[3]),
        channel_layouts: unmask(&ChannelLayout::ALL, buf[4]),
        sample_rates,
        bit_depths,
        features: features_from_bits(u16::from_le_bytes([buf[0], buf[1]])),
        max_concurrent_streams: buf[5],
        max_bit_rate: read_u32(buf, 6),
        min_latency_ms: u16::from_le_bytes([buf[10], buf[11]]),
        buffer_sizes,
    })
}

// --- Sink frames ---

/// Encode a 64-byte sink command frame.
///
/// Layout:
/// ```text
/// [0]       command
/// [1-31]    talkback id
/// [32-39]   format block (zero when `config` is None)
/// [40]      preferred codec (negotiation only)
/// ```
pub fn encode_sink_command(
    command: SinkCommand,
    talkback_id: &str,
    config: Option<&AudioConfig>,
    preferred_codec: Option<AudioCodec>,
) -> [u8; SINK_COMMAND_LEN] {
    let mut frame = [0u8; SINK_COMMAND_LEN];
    frame[0] = command as u8;
    write_id(&mut frame[1..32], talkback_id);
    if let Some(config) = config {
        write_format(&mut frame[32..40], config);
    }
    if let Some(codec) = preferred_codec {
        frame[40] = codec.wire();
    }
    frame
}

pub fn decode_sink_command(buf: &[u8]) -> Result<CommandFrame, DecodeError> {
    ensure_len("sink command", buf, 41)?;
    let preferred_codec =
        (buf[0] == SinkCommand::NegotiateCodec as u8).then(|| AudioCodec::from_wire(buf[40]));
    Ok(CommandFrame {
        command: buf[0],
        id: read_id(&buf[1..32]),
        config: read_format(&buf[32..40]),
        preferred_codec,
    })
}

/// Encode a 64-byte per-session talkback configuration frame.
///
/// Layout:
/// ```text
/// [0-31]    talkback id
/// [32-39]   format block
/// [40-43]   bit rate (u32, 0 = unset)
/// [44-47]   buffer size (u32, 0 = unset)
/// ```
pub fn encode_sink_config(talkback_id: &str, config: &AudioConfig) -> [u8; SINK_CONFIG_LEN] {
    let mut frame = [0u8; SINK_CONFIG_LEN];
    write_id(&mut frame[0..32], talkback_id);
    write_format(&mut frame[32..40], config);
    frame[40..44].copy_from_slice(&config.bit_rate.unwrap_or(0).to_le_bytes());
    frame[44..48].copy_from_slice(&config.buffer_size.unwrap_or(0).to_le_bytes());
    frame
}

pub fn decode_sink_config(buf: &[u8]) -> Result<ConfigFrame, DecodeError> {
    ensure_len("sink config", buf, 48)?;
    let mut config = read_format(&buf[32..40]);
    config.bit_rate = optional_u32(read_u32(buf, 40));
    config.buffer_size = optional_u32(read_u32(buf, 44));
    Ok(ConfigFrame {
        id: read_id(&buf[0..32]),
        config,
    })
}

/// Encode a 64-byte sink status frame.
///
/// Layout:
/// ```text
/// [0-31]    talkback id
/// [32]      active flag
/// [33]      output level
/// [34-37]   bytes received (u32)
/// ```
pub fn encode_sink_status(
    talkback_id: &str,
    active: bool,
    level: u8,
    bytes_received: u32,
) -> [u8; SINK_STATUS_LEN] {
    let mut frame = [0u8; SINK_STATUS_LEN];
    write_id(&mut frame[0..32], talkback_id);
    frame[32] = active as u8;
    frame[33] = level;
    frame[34..38].copy_from_slice(&bytes_received.to_le_bytes());
    frame
}

pub fn decode_sink_status(buf: &[u8]) -> Result<SinkStatus, DecodeError> {
    ensure_len("sink status", buf, SINK_STATUS_MIN)?;
    Ok(SinkStatus {
        talkback_id: read_id(&buf[0..32]),
        active: buf[32] != 0,
        level: buf[33],
        bytes_received: read_u32(buf, 34),
    })
}

/// Encode a 16-byte output settings frame.
///
/// Layout:
/// ```text
/// [0]  muted               [4]  playback level
/// [1]  talkback enabled    [5]  talkback level
/// [2]  noise suppression   [6]  destination
/// [3]  limiter
/// ```
pub fn encode_output_settings(settings: &AudioOutputSettings) -> [u8; OUTPUT_SETTINGS_LEN] {
    let mut frame = [0u8; OUTPUT_SETTINGS_LEN];
    frame[0] = settings.muted as u8;
    frame[1] = settings.talkback_enabled as u8;
    frame[2] = settings.noise_suppression as u8;
    frame[3] = settings.limiter as u8;
    frame[4] = settings.playback_level;
    frame[5] = settings.talkback_level;
    frame[6] = settings.destination.wire();
    frame
}

pub fn decode_output_settings(buf: &[u8]) -> Result<AudioOutputSettings, DecodeError> {
    ensure_len("output settings", buf, OUTPUT_SETTINGS_MIN)?;
    Ok(AudioOutputSettings {
        muted: buf[0] != 0,
        talkback_enabled: buf[1] != 0,
        noise_suppression: buf[2] != 0,
        limiter: buf[3] != 0,
        playback_level: buf[4],
        talkback_level: buf[5],
        destination: OutputDestination::from_wire(buf[6]),
    })
}

/// Encode an 8-byte talkback-control frame: command, level, muted flag.
pub fn encode_talkback_control(
    command: SinkCommand,
    level: u8,
    muted: bool,
) -> [u8; TALKBACK_CONTROL_LEN] {
    let mut frame = [0u8; TALKBACK_CONTROL_LEN];
    frame[0] = command as u8;
    frame[1] = level;
    frame[2] = muted as u8;
    frame
}

/// Encode a supported-codecs reply: count, then one codec byte each.
pub fn encode_codec_list(codecs: &[AudioCodec]) -> Vec<u8> {
    let codecs = &codecs[..codecs.len().min(MAX_CODEC_LIST)];
    let mut buf = Vec::with_capacity(1 + codecs.len());
    buf.push(codecs.len() as u8);
    buf.extend(codecs.iter().map(|c| c.wire()));
    buf
}

/// Decode a supported-codecs reply, clamping the count to eight and to the payload.
pub fn decode_codec_list(buf: &[u8]) -> Result<Vec<AudioCodec>, DecodeError> {
    let Some((&count, entries)) = buf.split_first() else {
        return Err(DecodeError::Empty("codec list"));
    };
    let count = (count as usize).min(MAX_CODEC_LIST).min(entries.len());
    Ok(entries[..count].iter().map(|&b| AudioCodec::from_wire(b)).collect())
}

pub fn decode_negotiated_codec(buf: &[u8]) -> Result<AudioCodec, DecodeError> {
    buf.first()
        .map(|&b| AudioCodec::from_wire(b))
        .ok_or(DecodeError::Empty("codec negotiation"))
}
