//! Payload decoders for the ten RT-130 packet types.
//!
//! Every decoder takes the full 1024-byte packet buffer and reads at
//! absolute offsets (the 16-byte header occupies bytes 0..16). ASCII
//! fields are kept verbatim where downstream log output reproduces them
//! and trimmed where only the value matters.

use crate::bcd::{bcd, read_i16_be, read_i32_be};
use crate::codes;
use crate::header::PACKET_SIZE;
use crate::steim::{decode_steim1, decode_steim2};
use crate::{Result, Rt130Error};

/// DT sample data area: 1000 bytes following the 8-byte data header.
pub const DATA_AREA_OFFSET: usize = 24;
/// Up to fifteen 64-byte Steim frames fit in the data area.
pub const STEIM_AREA_SIZE: usize = 960;

fn check_len(buf: &[u8]) -> Result<()> {
    if buf.len() < PACKET_SIZE {
        return Err(Rt130Error::ShortRead {
            wanted: PACKET_SIZE,
            got: buf.len(),
        });
    }
    Ok(())
}

fn ascii(buf: &[u8], offset: usize, len: usize) -> String {
    String::from_utf8_lossy(&buf[offset..offset + len]).into_owned()
}

fn ascii_trim(buf: &[u8], offset: usize, len: usize) -> String {
    ascii(buf, offset, len).trim().to_string()
}

fn ascii_char(buf: &[u8], offset: usize) -> char {
    buf[offset] as char
}

/// Insert colons into a 16-character `YYYYDDDHHMMSSTTT` field.
pub fn colonize(s: &str) -> String {
    if s.len() < 16 {
        return s.to_string();
    }
    format!(
        "{}:{}:{}:{}:{}:{}",
        &s[0..4],
        &s[4..7],
        &s[7..9],
        &s[9..11],
        &s[11..13],
        &s[13..16]
    )
}

// ---------------------------------------------------------------------------
// DT
// ---------------------------------------------------------------------------

/// Sample encoding carried in byte 23 of a DT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// 16-bit signed integers (code 0x16).
    Int16,
    /// 32-bit signed integers (code 0x32).
    Int32,
    /// Steim1 compressed (code 0xC0).
    Steim1,
    /// Steim2 compressed (code 0xC2).
    Steim2,
}

impl SampleFormat {
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x16 => Ok(Self::Int16),
            0x32 => Ok(Self::Int32),
            0xC0 => Ok(Self::Steim1),
            0xC2 => Ok(Self::Steim2),
            _ => Err(Rt130Error::UnsupportedFormat(code)),
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Int16 => 0x16,
            Self::Int32 => 0x32,
            Self::Steim1 => 0xC0,
            Self::Steim2 => 0xC2,
        }
    }

    /// Overscaled variants of the supported encodings. The recorder
    /// emits these when the A/D saturated; the payload layout differs
    /// and is not decodable here.
    pub fn is_overscaled(code: u8) -> bool {
        matches!(code, 0x33 | 0xC1 | 0xC3)
    }
}

/// Flag bits from byte 22 of a DT packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataFlags(pub u8);

impl DataFlags {
    pub fn calibration(self) -> bool {
        self.0 & 0x80 != 0
    }
    pub fn overscaled(self) -> bool {
        self.0 & 0x40 != 0
    }
    pub fn stacked(self) -> bool {
        self.0 & 0x20 != 0
    }
    pub fn second_eh_et(self) -> bool {
        self.0 & 0x04 != 0
    }
    pub fn last_data_packet(self) -> bool {
        self.0 & 0x02 != 0
    }
    pub fn first_data_packet(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// A decoded DT packet: routing fields plus samples.
///
/// Stream and channel are 0-based as on the wire; display output adds
/// one.
#[derive(Debug, Clone)]
pub struct DataPacket {
    pub event: u16,
    pub data_stream: u16,
    pub channel: u16,
    pub samples: u16,
    pub flags: DataFlags,
    pub format_code: u8,
    pub format: SampleFormat,
    pub data: Vec<i32>,
    /// Forward integration constant, Steim encodings only.
    pub x0: Option<i32>,
    /// Reverse integration constant, Steim encodings only.
    pub xn: Option<i32>,
}

impl DataPacket {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf)?;
        let event = bcd(buf, 32, 4)? as u16;
        let data_stream = bcd(buf, 36, 2)? as u16;
        let channel = bcd(buf, 38, 2)? as u16;
        let samples = bcd(buf, 40, 4)? as u16;
        let flags = DataFlags(buf[22]);
        let format_code = buf[23];
        let format = SampleFormat::from_code(format_code)?;

        let n = samples as usize;
        let area = &buf[DATA_AREA_OFFSET..];
        let (data, x0, xn) = match format {
            SampleFormat::Int16 => {
                if n * 2 > area.len() {
                    return Err(Rt130Error::CorruptPacket(format!(
                        "int16 sample count {n} exceeds data area"
                    )));
                }
                let v = (0..n).map(|i| i32::from(read_i16_be(area, i * 2))).collect();
                (v, None, None)
            }
            SampleFormat::Int32 => {
                if n * 4 > area.len() {
                    return Err(Rt130Error::CorruptPacket(format!(
                        "int32 sample count {n} exceeds data area"
                    )));
                }
                let v = (0..n).map(|i| read_i32_be(area, i * 4)).collect();
                (v, None, None)
            }
            SampleFormat::Steim1 => {
                let out = decode_steim1(&area[..STEIM_AREA_SIZE], n)?;
                (out.samples, Some(out.x0), Some(out.xn))
            }
            SampleFormat::Steim2 => {
                let out = decode_steim2(&area[..STEIM_AREA_SIZE], n)?;
                (out.samples, Some(out.x0), Some(out.xn))
            }
        };

        Ok(Self {
            event,
            data_stream,
            channel,
            samples,
            flags,
            format_code,
            format,
            data,
            x0,
            xn,
        })
    }
}

// ---------------------------------------------------------------------------
// EH / ET
// ---------------------------------------------------------------------------

/// A decoded event header or trailer (EH and ET share one layout).
///
/// Per-channel lists hold 16 slots even though a single data stream
/// records at most 6 channels; the extra slots mirror the wire format.
#[derive(Debug, Clone)]
pub struct EventHeader {
    pub event: u16,
    pub data_stream: u16,
    pub flags: u8,
    /// Sample encoding byte rendered as lowercase hex, e.g. `0xc0`.
    pub data_format: String,
    pub trigger_time_message: String,
    pub time_source: Option<&'static str>,
    pub time_quality: Option<&'static str>,
    /// Extended prefix character plus the 4-character station name.
    pub station_name: String,
    pub stream_name: String,
    /// Raw 4-character field; may be blank when the recorder omitted it.
    pub sample_rate: String,
    pub trigger_type: String,
    /// Raw `YYYYDDDHHMMSSTTT` fields; blank when unset.
    pub trigger_time: String,
    pub first_sample_time: String,
    pub detrigger_time: String,
    pub last_sample_time: String,
    pub nominal_bit_weight: Vec<String>,
    pub true_bit_weight: Vec<String>,
    /// Code-table lookups; `None` where the wire carried an unmapped code.
    pub gain: Vec<Option<&'static str>>,
    pub ad_resolution: Vec<Option<&'static str>>,
    pub full_scale_analog: Vec<Option<&'static str>>,
    pub channel_code: Vec<String>,
    pub sensor_fsa: Vec<Option<&'static str>>,
    pub sensor_vpu: Vec<String>,
    pub sensor_units: String,
    pub station_number: String,
    pub total_channels: Option<u16>,
    pub comment: String,
    pub filter_list: String,
    pub position: String,
}

impl EventHeader {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf)?;
        let event = bcd(buf, 32, 4)? as u16;
        let data_stream = bcd(buf, 36, 2)? as u16;
        let flags = buf[22];
        let data_format = format!("{:#x}", buf[23]);

        let bit_weights = |offset: usize| -> Vec<String> {
            (0..16).map(|i| ascii(buf, offset + i * 8, 8)).collect()
        };
        let code_table = |offset: usize, table: fn(char) -> Option<&'static str>| {
            (0..16)
                .map(|i| table(ascii_char(buf, offset + i)))
                .collect::<Vec<_>>()
        };

        Ok(Self {
            event,
            data_stream,
            flags,
            data_format,
            trigger_time_message: ascii(buf, 24, 33),
            time_source: codes::time_source(ascii_char(buf, 57)),
            time_quality: codes::time_quality(ascii_char(buf, 58)),
            station_name: ascii_trim(buf, 59, 5),
            stream_name: ascii(buf, 64, 16),
            sample_rate: ascii(buf, 88, 4),
            trigger_type: ascii(buf, 92, 4),
            trigger_time: ascii(buf, 96, 16),
            first_sample_time: ascii(buf, 112, 16),
            detrigger_time: ascii(buf, 128, 16),
            last_sample_time: ascii(buf, 144, 16),
            nominal_bit_weight: bit_weights(160),
            true_bit_weight: bit_weights(288),
            gain: code_table(416, codes::gain),
            ad_resolution: code_table(432, codes::ad_resolution),
            full_scale_analog: code_table(448, codes::full_scale_analog),
            channel_code: (0..16).map(|i| ascii(buf, 464 + i * 4, 4)).collect(),
            sensor_fsa: code_table(528, codes::full_scale_analog),
            sensor_vpu: (0..16).map(|i| ascii(buf, 544 + i * 6, 6)).collect(),
            sensor_units: ascii(buf, 640, 16),
            station_number: ascii_trim(buf, 656, 48),
            total_channels: ascii_trim(buf, 860, 2).parse().ok(),
            comment: ascii(buf, 862, 40),
            filter_list: ascii(buf, 902, 16),
            position: ascii(buf, 918, 26),
        })
    }
}

// ---------------------------------------------------------------------------
// SH
// ---------------------------------------------------------------------------

/// Extract state-of-health text lines: the 1000-byte block at byte 24,
/// split on CRLF, keeping lines that do not start with a space.
pub fn soh_lines(buf: &[u8]) -> Result<Vec<String>> {
    check_len(buf)?;
    let text = ascii(buf, 24, 1000);
    Ok(text
        .split("\r\n")
        .filter(|line| !line.is_empty() && !line.starts_with(' '))
        .map(|line| line.trim_end_matches('\0').to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

// ---------------------------------------------------------------------------
// SC
// ---------------------------------------------------------------------------

/// One of the five channel blocks in a station/channel packet.
#[derive(Debug, Clone)]
pub struct ScChannel {
    pub channel: String,
    pub name: String,
    pub azimuth: String,
    pub inclination: String,
    pub x_coordinate: String,
    pub y_coordinate: String,
    pub z_coordinate: String,
    pub xy_units: String,
    pub z_units: String,
    pub preamp_gain: String,
    pub sensor_model: String,
    pub sensor_serial: String,
    pub comments: String,
    pub adjusted_nominal_bit_weight: String,
}

/// Decoded station/channel definition (SC) packet.
#[derive(Debug, Clone)]
pub struct StationChannel {
    pub experiment_number: String,
    pub experiment_name: String,
    pub experiment_comment: String,
    pub station_number: String,
    pub station_name: String,
    pub station_comment: String,
    pub das_model: String,
    pub das_serial: String,
    pub experiment_start: String,
    pub clock_type: String,
    pub clock_serial: String,
    /// Blocks whose channel field is blank are omitted.
    pub channels: Vec<ScChannel>,
    pub implement_time: String,
}

impl StationChannel {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf)?;
        let mut channels = Vec::new();
        for i in 0..5 {
            let base = 202 + i * 146;
            let channel = ascii(buf, base, 2);
            if channel == "  " {
                continue;
            }
            channels.push(ScChannel {
                channel,
                name: ascii(buf, base + 2, 10),
                azimuth: ascii(buf, base + 12, 10),
                inclination: ascii(buf, base + 22, 10),
                x_coordinate: ascii(buf, base + 32, 10),
                y_coordinate: ascii(buf, base + 42, 10),
                z_coordinate: ascii(buf, base + 52, 10),
                xy_units: ascii(buf, base + 62, 4),
                z_units: ascii(buf, base + 66, 4),
                preamp_gain: ascii(buf, base + 70, 4),
                sensor_model: ascii(buf, base + 74, 12),
                sensor_serial: ascii(buf, base + 86, 12),
                comments: ascii(buf, base + 98, 40),
                adjusted_nominal_bit_weight: ascii(buf, base + 138, 8),
            });
        }
        Ok(Self {
            experiment_number: ascii(buf, 16, 2),
            experiment_name: ascii(buf, 18, 24),
            experiment_comment: ascii(buf, 42, 40),
            station_number: ascii(buf, 82, 4),
            station_name: ascii(buf, 86, 24),
            station_comment: ascii(buf, 110, 40),
            das_model: ascii(buf, 150, 12),
            das_serial: ascii(buf, 162, 12),
            experiment_start: ascii(buf, 174, 14),
            clock_type: ascii(buf, 188, 4),
            clock_serial: ascii(buf, 192, 10),
            channels,
            implement_time: ascii(buf, 1008, 16),
        })
    }
}

// ---------------------------------------------------------------------------
// AD
// ---------------------------------------------------------------------------

/// Decoded auxiliary data parameter (AD) packet.
#[derive(Debug, Clone)]
pub struct AuxData {
    pub marker: String,
    /// Raw 16-character channel mask; non-space positions are active.
    pub channels: String,
    pub sample_period: String,
    pub data_format: String,
    pub record_length: String,
    pub recording_destination: String,
    pub implement_time: String,
}

impl AuxData {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf)?;
        Ok(Self {
            marker: ascii(buf, 16, 2),
            channels: ascii(buf, 18, 16),
            sample_period: ascii(buf, 34, 8),
            data_format: ascii(buf, 42, 2),
            record_length: ascii(buf, 44, 8),
            recording_destination: ascii(buf, 52, 4),
            implement_time: ascii(buf, 1006, 16),
        })
    }

    /// Active channel numbers rendered as `"1, 2,"` style entries.
    pub fn channel_list(&self) -> String {
        channel_mask_list(&self.channels)
    }
}

/// Render a 16-character channel mask as the `"1, 2,"` list form the
/// log output uses.
pub fn channel_mask_list(mask: &str) -> String {
    mask.chars()
        .enumerate()
        .filter(|(_, c)| *c != ' ')
        .map(|(i, _)| format!("{},", i + 1))
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// CD
// ---------------------------------------------------------------------------

/// 72A-style calibration block.
#[derive(Debug, Clone)]
pub struct Calibration72A {
    pub start_time: String,
    pub repeat_interval: String,
    pub intervals: String,
    pub length: String,
    pub step_on_off: String,
    pub step_period: String,
    pub step_size: String,
    pub step_amplitude: String,
    pub step_output: String,
}

/// RT-130 sensor auto-center block.
#[derive(Debug, Clone)]
pub struct AutoCenter130 {
    pub sensor: String,
    pub enable: String,
    pub reading_interval: String,
    pub cycle_interval: String,
    pub level: String,
    pub attempts: String,
    pub attempt_interval: String,
}

/// RT-130 sensor calibration block.
#[derive(Debug, Clone)]
pub struct Calibration130 {
    pub sensor: String,
    pub enable: String,
    pub duration: String,
    pub amplitude: String,
    pub signal: String,
    pub step_interval: String,
    pub step_width: String,
    pub sine_frequency: String,
}

/// RT-130 calibration sequence block.
#[derive(Debug, Clone)]
pub struct CalibrationSequence130 {
    pub sequence: String,
    pub enable: String,
    pub start_time: String,
    pub interval: String,
    pub count: String,
    pub record_length: String,
}

/// Decoded calibration definition (CD) packet. Blank blocks (leading
/// space in the sensor/sequence/start-time field) are omitted.
#[derive(Debug, Clone)]
pub struct CalibrationDef {
    pub cal_72a: Option<Calibration72A>,
    pub auto_center: Vec<AutoCenter130>,
    pub calibration: Vec<Calibration130>,
    pub sequence: Vec<CalibrationSequence130>,
    pub implement_time: String,
}

impl CalibrationDef {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf)?;

        let cal_72a = if ascii_char(buf, 16) != ' ' {
            Some(Calibration72A {
                start_time: ascii(buf, 16, 14),
                repeat_interval: ascii(buf, 30, 8),
                intervals: ascii(buf, 38, 4),
                length: ascii(buf, 42, 8),
                step_on_off: ascii(buf, 50, 4),
                step_period: ascii(buf, 54, 8),
                step_size: ascii(buf, 62, 8),
                step_amplitude: ascii(buf, 70, 8),
                step_output: ascii(buf, 78, 4),
            })
        } else {
            None
        };

        let mut auto_center = Vec::new();
        for i in 0..4 {
            let base = 120 + i * 16;
            if ascii_char(buf, base) == ' ' {
                continue;
            }
            auto_center.push(AutoCenter130 {
                sensor: ascii(buf, base, 1),
                enable: ascii(buf, base + 1, 1),
                reading_interval: ascii(buf, base + 2, 4),
                cycle_interval: ascii(buf, base + 6, 2),
                level: ascii(buf, base + 8, 4),
                attempts: ascii(buf, base + 12, 2),
                attempt_interval: ascii(buf, base + 14, 2),
            });
        }

        let mut calibration = Vec::new();
        for i in 0..4 {
            let base = 184 + i * 28;
            if ascii_char(buf, base) == ' ' {
                continue;
            }
            calibration.push(Calibration130 {
                sensor: ascii(buf, base, 1),
                enable: ascii(buf, base + 1, 1),
                duration: ascii(buf, base + 4, 4),
                amplitude: ascii(buf, base + 8, 4),
                signal: ascii(buf, base + 12, 4),
                step_interval: ascii(buf, base + 16, 4),
                step_width: ascii(buf, base + 20, 4),
                sine_frequency: ascii(buf, base + 24, 4),
            });
        }

        let mut sequence = Vec::new();
        for i in 0..4 {
            let base = 296 + i * 58;
            if ascii_char(buf, base) == ' ' {
                continue;
            }
            sequence.push(CalibrationSequence130 {
                sequence: ascii(buf, base, 1),
                enable: ascii(buf, base + 1, 1),
                start_time: ascii(buf, base + 4, 14),
                interval: ascii(buf, base + 18, 8),
                count: ascii(buf, base + 26, 2),
                record_length: ascii(buf, base + 28, 8),
            });
        }

        Ok(Self {
            cal_72a,
            auto_center,
            calibration,
            sequence,
            implement_time: ascii(buf, 998, 16),
        })
    }
}

// ---------------------------------------------------------------------------
// DS
// ---------------------------------------------------------------------------

/// Decoded data stream definition. Trigger parameters are kept as
/// name/value pairs in wire order so log output can replay them.
#[derive(Debug, Clone)]
pub struct DataStreamDef {
    pub data_stream: String,
    pub name: String,
    pub recording_destination: String,
    /// `"1, 2,"` style list derived from the 16-character mask.
    pub channels_included: String,
    pub sample_rate: String,
    pub data_format: String,
    pub trigger_type: String,
    pub trigger: Vec<(&'static str, String)>,
    /// Raw description text kept when the trigger tag is not recognized.
    pub raw_trigger_description: Option<String>,
    pub implement_time: String,
}

fn decode_trigger(tag: &str, buf: &[u8]) -> Option<Vec<(&'static str, String)>> {
    let field = |offset: usize, len: usize| ascii(buf, offset, len);
    let pairs = match tag {
        "CON" => vec![
            ("RecordLength", field(0, 8)),
            ("StartTime", field(8, 14)),
        ],
        "CRS" => vec![
            ("TriggerStreamNo", field(0, 2)),
            ("PretriggerLength", field(2, 8)),
            ("RecordLength", field(10, 8)),
        ],
        "EVT" => vec![
            ("TriggerChannels", field(0, 16)),
            ("MinimumChannels", field(16, 2)),
            ("TriggerWindow", field(18, 8)),
            ("PretriggerLength", field(26, 8)),
            ("PosttriggerLength", field(34, 8)),
            ("RecordLength", field(42, 8)),
            ("STALength", field(58, 8)),
            ("LTALength", field(66, 8)),
            ("MeanRemoval", field(74, 8)),
            ("TriggerRatio", field(82, 8)),
            ("DetriggerRatio", field(90, 8)),
            ("LTAHold", field(98, 4)),
            ("LowPassCornerFreq", field(102, 4)),
            ("HighPassCornerFreq", field(106, 4)),
        ],
        "EXT" => vec![
            ("PretriggerLength", field(0, 8)),
            ("RecordLength", field(8, 8)),
        ],
        "LEV" => vec![
            ("Level", field(0, 8)),
            ("PretriggerLength", field(8, 8)),
            ("RecordLength", field(16, 8)),
            ("LowPassCornerFreq", field(24, 4)),
            ("HighPassCornerFreq", field(28, 4)),
        ],
        "TIM" => vec![
            ("StartTime", field(0, 14)),
            ("RepeatInterval", field(14, 8)),
            ("Intervals", field(22, 4)),
            ("RecordLength", field(34, 8)),
        ],
        // RAD streams carry a TML-shaped description
        "TML" | "RAD" => {
            let mut pairs: Vec<(&'static str, String)> = Vec::with_capacity(12);
            const NAMES: [&str; 11] = [
                "StartTime01",
                "StartTime02",
                "StartTime03",
                "StartTime04",
                "StartTime05",
                "StartTime06",
                "StartTime07",
                "StartTime08",
                "StartTime09",
                "StartTime10",
                "StartTime11",
            ];
            for (i, name) in NAMES.iter().enumerate() {
                pairs.push((name, field(i * 14, 14)));
            }
            pairs.push(("RecordLength", field(154, 8)));
            pairs
        }
        _ => return None,
    };
    Some(pairs)
}

/// Decode a DS packet into the stream definitions it carries (up to
/// four; blank slots are skipped).
pub fn decode_ds(buf: &[u8]) -> Result<Vec<DataStreamDef>> {
    check_len(buf)?;
    let implement_time = ascii(buf, 1008, 16);
    let mut defs = Vec::new();
    for i in 0..4 {
        let base = 16 + i * 230;
        let data_stream = ascii(buf, base, 2);
        if data_stream.starts_with(' ') {
            continue;
        }
        let trigger_type = ascii(buf, base + 48, 4);
        let desc = &buf[base + 52..base + 214];
        let (trigger, raw_trigger_description) =
            match decode_trigger(trigger_type.trim(), desc) {
                Some(pairs) => (pairs, None),
                None => (Vec::new(), Some(String::from_utf8_lossy(desc).into_owned())),
            };
        defs.push(DataStreamDef {
            data_stream,
            name: ascii(buf, base + 2, 16),
            recording_destination: ascii(buf, base + 18, 4),
            channels_included: channel_mask_list(&ascii(buf, base + 26, 16)),
            sample_rate: ascii(buf, base + 42, 4),
            data_format: ascii(buf, base + 46, 2),
            trigger_type,
            trigger,
            raw_trigger_description,
            implement_time: implement_time.clone(),
        });
    }
    Ok(defs)
}

// ---------------------------------------------------------------------------
// FD
// ---------------------------------------------------------------------------

/// One filter block from an FD packet.
#[derive(Debug, Clone)]
pub struct FilterBlock {
    pub block_count: u8,
    pub id: char,
    pub decimation: u8,
    pub scaler: u8,
    pub coefficient_count: u8,
    pub packet_coefficient_count: u8,
    pub coefficient_packet_count: u8,
    pub coefficient_format: u8,
    pub coefficients: Vec<i32>,
}

/// Decoded filter description (FD) packet.
#[derive(Debug, Clone)]
pub struct FilterDescription {
    pub blocks: Vec<FilterBlock>,
    pub implement_time: String,
}

impl FilterDescription {
    /// Walk the filter info region: 8-byte block headers each followed
    /// by that block's coefficients, terminated by a zero block count.
    /// Coefficient width is the BCD value of the format byte (16 or 32).
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf)?;
        let region = &buf[16..140];
        let mut blocks = Vec::new();
        let mut ptr = 0usize;
        while ptr + 8 <= region.len() {
            let block_count = region[ptr];
            if block_count == 0 {
                break;
            }
            let coefficient_format = region[ptr + 7];
            let width = bcd(region, (ptr + 7) * 2, 2)? as usize;
            if width != 16 && width != 32 {
                return Err(Rt130Error::CorruptPacket(format!(
                    "filter coefficient format {coefficient_format:#04x}"
                )));
            }
            let packet_coefficient_count = region[ptr + 5];
            let n = packet_coefficient_count as usize;
            let coeff_bytes = n * width / 8;
            if ptr + 8 + coeff_bytes > region.len() {
                return Err(Rt130Error::CorruptPacket(
                    "filter coefficients overrun info region".into(),
                ));
            }
            let coeff_base = ptr + 8;
            let coefficients = (0..n)
                .map(|i| {
                    if width == 16 {
                        i32::from(read_i16_be(region, coeff_base + i * 2))
                    } else {
                        read_i32_be(region, coeff_base + i * 4)
                    }
                })
                .collect();
            blocks.push(FilterBlock {
                block_count,
                id: region[ptr + 1] as char,
                decimation: region[ptr + 2],
                scaler: region[ptr + 3],
                coefficient_count: region[ptr + 4],
                packet_coefficient_count,
                coefficient_packet_count: region[ptr + 6],
                coefficient_format,
                coefficients,
            });
            ptr += 8 + coeff_bytes;
        }
        Ok(Self {
            blocks,
            implement_time: ascii(buf, 140, 16),
        })
    }
}

// ---------------------------------------------------------------------------
// OM
// ---------------------------------------------------------------------------

/// Decoded operating mode (OM) packet. The 72A-prefixed fields only
/// apply to the older recorder generation but still occupy wire space.
#[derive(Debug, Clone)]
pub struct OperatingMode {
    pub power_state_72a: String,
    pub recording_mode: String,
    pub auto_dump_on_et: String,
    pub auto_dump_threshold: String,
    pub power_down_delay_72a: String,
    pub disk_wrap: String,
    pub disk_power_72a: String,
    pub terminator_power_72a: String,
    pub disk_retry: String,
    pub wakeup_start_time_72a: String,
    pub wakeup_duration_72a: String,
    pub wakeup_repeat_interval_72a: String,
    pub wakeup_number_of_intervals_72a: String,
    pub implement_time: String,
}

impl OperatingMode {
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf)?;
        Ok(Self {
            power_state_72a: ascii(buf, 16, 2),
            recording_mode: ascii(buf, 18, 2),
            auto_dump_on_et: ascii(buf, 24, 1),
            auto_dump_threshold: ascii(buf, 26, 2),
            power_down_delay_72a: ascii(buf, 28, 4),
            disk_wrap: ascii(buf, 32, 1),
            disk_power_72a: ascii(buf, 34, 1),
            terminator_power_72a: ascii(buf, 35, 1),
            disk_retry: ascii(buf, 36, 1),
            wakeup_start_time_72a: ascii(buf, 50, 12),
            wakeup_duration_72a: ascii(buf, 62, 6),
            wakeup_repeat_interval_72a: ascii(buf, 68, 6),
            wakeup_number_of_intervals_72a: ascii(buf, 74, 2),
            implement_time: ascii(buf, 1008, 16),
        })
    }
}
