//! Event assembly: turns the EH/DT/ET packet stream into per-channel
//! [`Event130`] accumulators, one set per data stream.
//!
//! The assembler owns the live event slots. A completed event moves to
//! the stream's emitted slot and is handed to the caller through the
//! driver; on every hand-off the live slot restarts clean.

use std::collections::HashMap;

use tracing::{error, warn};

use crate::codes;
use crate::header::PacketHeader;
use crate::packets::{colonize, DataPacket, EventHeader};
use crate::time::PacketTime;

/// Data streams multiplexed in a packet sequence.
pub const NUM_STREAMS: usize = 9;
/// Sensor channels per stream.
pub const NUM_CHANNELS: usize = 6;

/// One decoded trace fragment: the packet timestamp and its samples.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSegment {
    pub time: PacketTime,
    pub data: Vec<i32>,
}

/// Per (stream, channel) accumulator for one recording event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event130 {
    /// Recorder serial number, four hex digits.
    pub unit_id: String,
    /// `None` until the channel has been seeded by a header or a data
    /// packet.
    pub event: Option<u16>,
    /// First-sample time from the event header, or the first data
    /// packet's own timestamp when the header was missing.
    pub start: PacketTime,
    pub sample_rate: Option<f64>,
    pub sample_count: u64,
    pub channel_number: usize,
    pub stream_number: usize,
    pub trace: Vec<TraceSegment>,
    pub gain: Option<String>,
    pub bit_weight: Option<String>,
    /// Raw `YYYYDDDHHMMSSTTT` field from the event trailer.
    pub last_sample_time: Option<String>,
}

/// All channels of one stream's event.
pub type StreamEvents = [Event130; NUM_CHANNELS];

/// Log, error and state-of-health lines accumulated during processing.
/// The caller drains these; they grow until drained.
#[derive(Debug, Default)]
pub struct Reports {
    pub logs: Vec<String>,
    pub errs: Vec<String>,
    pub soh: Vec<String>,
}

/// What finishing a stream's event: header for a newer event, the
/// trailer, a data packet for a newer event, or a timing break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKind {
    Header,
    Trailer,
    Data,
    Gap,
    Overlap,
}

/// Result of feeding one packet to the assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Packet absorbed, no event boundary.
    Continue,
    /// A stream's event is ready for the caller.
    EndOfEvent {
        stream: usize,
        points: u64,
        kind: EndKind,
    },
    /// Packet could not be used; it was skipped.
    Corrupt,
    /// Packet deliberately dropped (out-of-range stream or channel).
    Ignore,
}

/// External metadata consulted when a data packet arrives with no event
/// header, keyed `das:channel:stream` (1-based display numbers).
#[derive(Debug, Clone)]
pub struct ParEntry {
    pub sample_rate: f64,
    pub gain: String,
}

/// Continuity state per (das, channel, stream): when the previous data
/// packet should have ended, and the current packet's start for the
/// report line.
#[derive(Debug, Clone)]
struct TimeCheck {
    start_asc: String,
    start_secs: i64,
    start_ms: i64,
    end_secs: i64,
    end_ms: i64,
}

impl TimeCheck {
    /// End time is the expected start of the next packet's first
    /// sample, at millisecond resolution.
    fn from_packet(time: &PacketTime, samples: u16, sample_rate: f64) -> Self {
        let start_secs = time.epoch_seconds().trunc() as i64;
        let start_ms = i64::from(time.millisecond);
        let span = f64::from(samples) / sample_rate;
        let mut end_secs = start_secs + span.trunc() as i64;
        let mut end_ms = start_ms + ((span.fract() + 0.0005) * 1000.0) as i64;
        if end_ms >= 1000 {
            end_ms -= 1000;
            end_secs += 1;
        }
        Self {
            start_asc: time.to_string(),
            start_secs,
            start_ms,
            end_secs,
            end_ms,
        }
    }
}

fn event_time(t: &PacketTime) -> String {
    format!(
        "{:04} {:03}:{:02}:{:02}:{:02}:{:03}",
        t.year, t.doy, t.hour, t.minute, t.second, t.millisecond
    )
}

fn empty_stream_events() -> StreamEvents {
    std::array::from_fn(|_| Event130::default())
}

/// Fresh buffers that keep each channel's metadata but drop its samples,
/// renumbered to `event`.
fn continuation(events: &StreamEvents, event: u16) -> StreamEvents {
    std::array::from_fn(|i| Event130 {
        event: events[i].event.map(|_| event),
        sample_count: 0,
        trace: Vec::new(),
        ..events[i].clone()
    })
}

/// Per-stream event state machine.
pub struct Assembler {
    current: [Option<StreamEvents>; NUM_STREAMS],
    previous: [Option<StreamEvents>; NUM_STREAMS],
    points: [u64; NUM_STREAMS],
    last_packet_time: HashMap<String, TimeCheck>,
    par: HashMap<String, ParEntry>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    pub fn new() -> Self {
        Self::with_par(HashMap::new())
    }

    /// Build with an external parameter table for headerless streams.
    pub fn with_par(par: HashMap<String, ParEntry>) -> Self {
        Self {
            current: std::array::from_fn(|_| None),
            previous: std::array::from_fn(|_| None),
            points: [0; NUM_STREAMS],
            last_packet_time: HashMap::new(),
            par,
        }
    }

    /// An event header opens a new event on its stream; a newer event
    /// number finishes the one in progress first.
    pub fn handle_eh(
        &mut self,
        eh: &EventHeader,
        header: &PacketHeader,
        rpt: &mut Reports,
    ) -> Outcome {
        let stream = eh.data_stream as usize;
        if stream >= NUM_STREAMS {
            rpt.errs
                .push(format!("Warning: Ignoring event header for stream {stream}."));
            warn!(stream, "event header for out-of-range stream");
            return Outcome::Ignore;
        }
        let num_channels = self.declared_channels(eh, true, rpt);

        let fst = PacketTime::from_ascii(&eh.first_sample_time);
        let mut new_events = empty_stream_events();
        for (i, ev) in new_events.iter_mut().enumerate().take(num_channels) {
            *ev = Event130 {
                unit_id: header.unit_id.clone(),
                event: Some(eh.event),
                start: fst,
                sample_rate: eh.sample_rate.trim().parse().ok(),
                sample_count: 0,
                channel_number: i,
                stream_number: stream,
                trace: Vec::new(),
                gain: eh.gain.get(i).copied().flatten().map(String::from),
                bit_weight: eh.true_bit_weight.get(i).cloned(),
                last_sample_time: None,
            };
        }

        let mut outcome = Outcome::Continue;
        if let Some(events) = self.current[stream].take() {
            let open = events.iter().find_map(|ev| ev.event);
            if open.is_some_and(|e| eh.event > e) {
                outcome = Outcome::EndOfEvent {
                    stream,
                    points: self.points[stream],
                    kind: EndKind::Header,
                };
            }
            self.previous[stream] = Some(events);
        }
        self.current[stream] = Some(new_events);

        self.event_banner("Event Header", eh, stream, &header.unit_id, rpt);
        if let Outcome::EndOfEvent { .. } = outcome {
            self.points[stream] = 0;
        }
        outcome
    }

    /// An event trailer finishes its stream's event, recording the last
    /// sample time on every declared channel.
    pub fn handle_et(
        &mut self,
        et: &EventHeader,
        header: &PacketHeader,
        rpt: &mut Reports,
    ) -> Outcome {
        let stream = et.data_stream as usize;
        if stream >= NUM_STREAMS {
            rpt.errs
                .push(format!("Warning: Ignoring event trailer for stream {stream}."));
            warn!(stream, "event trailer for out-of-range stream");
            return Outcome::Ignore;
        }
        let num_channels = self.declared_channels(et, false, rpt);

        if let Some(events) = self.current[stream].as_mut() {
            for (chan, ev) in events.iter_mut().enumerate().take(num_channels) {
                if ev.event == Some(et.event) {
                    ev.last_sample_time = Some(et.last_sample_time.clone());
                } else {
                    rpt.errs.push(format!(
                        "Error: Event trailer before any event data. Event {} Channel {}",
                        et.event, chan
                    ));
                    error!(event = et.event, chan, "event trailer before any event data");
                }
            }
            self.previous[stream] = self.current[stream].take();
        } else {
            rpt.errs.push(format!(
                "Error: Event trailer before event data. Event {}",
                et.event
            ));
            error!(event = et.event, "event trailer before event data");
        }

        self.event_banner("Event Trailer", et, stream, &header.unit_id, rpt);
        Outcome::EndOfEvent {
            stream,
            points: std::mem::take(&mut self.points[stream]),
            kind: EndKind::Trailer,
        }
    }

    /// A data packet appends samples to its channel. A newer event
    /// number or a timing break finishes the event in progress; the
    /// packet then lands in a fresh buffer.
    pub fn handle_dt(
        &mut self,
        dt: DataPacket,
        header: &PacketHeader,
        rpt: &mut Reports,
    ) -> Outcome {
        let stream = dt.data_stream as usize;
        let channel = dt.channel as usize;
        if stream >= NUM_STREAMS || channel >= NUM_CHANNELS {
            rpt.errs.push(format!(
                "Warning: Ignoring packet for stream {} channel {}.",
                dt.data_stream, dt.channel
            ));
            warn!(stream, channel, "data packet out of range");
            return Outcome::Ignore;
        }

        rpt.logs.push(format!(
            "ns = {} evt = {} ds = {} chan = {} data = {:x}",
            dt.samples,
            dt.event,
            stream + 1,
            channel + 1,
            dt.format_code
        ));

        let mut kind = None;
        if let Some(events) = &self.current[stream] {
            if events[channel].event.is_some_and(|e| dt.event > e) {
                kind = Some(EndKind::Data);
            }
        }

        let seeded = self.current[stream]
            .as_ref()
            .is_some_and(|ev| ev[channel].sample_rate.is_some());
        if !seeded {
            rpt.errs.push(format!(
                "Error: Data packet with no event header. {} Das: {} Channel: {} Stream: {}",
                header.time,
                header.unit_id,
                channel + 1,
                stream + 1
            ));
            error!(%header.unit_id, channel, stream, "data packet with no event header");
            self.synthesize_channel(&dt, header, rpt);
        }
        let sample_rate = self.current[stream]
            .as_ref()
            .and_then(|ev| ev[channel].sample_rate)
            .unwrap_or(999.0);

        // continuity check, keyed by recorder/channel/stream
        let key = format!("{}:{}:{}", header.unit_id, channel, stream);
        let check = TimeCheck::from_packet(&header.time, dt.samples, sample_rate);
        if let Some(prev) = self.last_packet_time.get(&key) {
            let delta = (check.start_secs - prev.end_secs) as f64
                + (check.start_ms - prev.end_ms) as f64 / 1000.0;
            if delta > 0.0 {
                rpt.errs.push(format!(
                    "{} Chan: {} Strm: {} Time gap: {} of {delta:7.3} secs",
                    header.unit_id,
                    channel + 1,
                    stream + 1,
                    check.start_asc
                ));
                warn!(delta, "time gap");
                kind = Some(EndKind::Gap);
            } else if delta < 0.0 {
                rpt.errs.push(format!(
                    "{} Chan: {} Strm: {} Time overlap: {} of {delta:7.3} secs",
                    header.unit_id,
                    channel + 1,
                    stream + 1,
                    check.start_asc
                ));
                warn!(delta, "time overlap");
                kind = Some(EndKind::Overlap);
            }
        }
        self.last_packet_time.insert(key, check);

        let mut outcome = Outcome::Continue;
        if let Some(kind) = kind {
            if let Some(events) = self.current[stream].take() {
                self.current[stream] = Some(continuation(&events, dt.event));
                self.previous[stream] = Some(events);
            }
            outcome = Outcome::EndOfEvent {
                stream,
                points: std::mem::take(&mut self.points[stream]),
                kind,
            };
        }

        if let Some(events) = self.current[stream].as_mut() {
            let samples = u64::from(dt.samples);
            let ev = &mut events[channel];
            ev.trace.push(TraceSegment {
                time: header.time,
                data: dt.data,
            });
            ev.sample_count += samples;
            self.points[stream] += samples;
        }
        outcome
    }

    /// Take the emitted event for one stream, if any.
    pub fn take_stream(&mut self, stream: usize) -> Option<StreamEvents> {
        self.previous.get_mut(stream).and_then(Option::take)
    }

    /// Drain every pending event, emitted and in progress, in stream
    /// order. Used at end of input.
    pub fn take_all(&mut self) -> Vec<(usize, StreamEvents)> {
        let mut out = Vec::new();
        for stream in 0..NUM_STREAMS {
            if let Some(events) = self.previous[stream].take() {
                out.push((stream, events));
            }
            if let Some(events) = self.current[stream].take() {
                if events.iter().any(|ev| ev.event.is_some()) {
                    out.push((stream, events));
                }
            }
        }
        out
    }

    /// Sample total accumulated across all streams since the last
    /// per-stream reset.
    pub fn total_points(&self) -> u64 {
        self.points.iter().sum()
    }

    /// Whether a stream has an event in progress (seeded by an event
    /// header, a trailer, or synthesis).
    pub fn has_open_event(&self, stream: usize) -> bool {
        self.current
            .get(stream)
            .and_then(Option::as_ref)
            .is_some_and(|events| events.iter().any(|ev| ev.event.is_some()))
    }

    fn declared_channels(&self, eh: &EventHeader, warn_missing: bool, rpt: &mut Reports) -> usize {
        match eh.total_channels {
            Some(n) => (n as usize).min(NUM_CHANNELS),
            None => {
                if warn_missing {
                    rpt.errs.push(format!(
                        "Warning: No total number of channels for EH packet given. Setting to {NUM_CHANNELS}."
                    ));
                    warn!("no total channel count in event header");
                }
                NUM_CHANNELS
            }
        }
    }

    /// Seed one channel from a data packet when no event header was
    /// seen: the parameter table first, then the fixed defaults.
    fn synthesize_channel(&mut self, dt: &DataPacket, header: &PacketHeader, rpt: &mut Reports) {
        let stream = dt.data_stream as usize;
        let channel = dt.channel as usize;
        let key = format!("{}:{}:{}", header.unit_id, channel + 1, stream + 1);
        let events = self.current[stream].get_or_insert_with(empty_stream_events);
        let ev = &mut events[channel];
        ev.unit_id = header.unit_id.clone();
        ev.event = Some(dt.event);
        ev.start = header.time;
        ev.sample_count = 0;
        ev.channel_number = channel;
        ev.stream_number = stream;

        let mut degraded = false;
        if let Some(par) = self.par.get(&key) {
            ev.sample_rate = Some(par.sample_rate);
            ev.gain = Some(par.gain.clone());
        } else if stream == NUM_STREAMS - 1 {
            // the auxiliary stream records at a tenth of a sample per second
            ev.sample_rate = Some(0.1);
            ev.gain = Some("x1".to_string());
        } else {
            rpt.errs
                .push("Warning: No sample rate available. Setting it to 999.".to_string());
            warn!("no sample rate available, defaulting to 999");
            ev.sample_rate = Some(999.0);
            rpt.errs
                .push("Warning: No gain available. Setting it to 2.".to_string());
            warn!("no gain available, defaulting to x2");
            ev.gain = Some("x2".to_string());
            degraded = true;
        }

        match ev.gain.as_deref().and_then(codes::bit_weight) {
            Some(w) => ev.bit_weight = Some(w.to_string()),
            None if stream == NUM_STREAMS - 1 => ev.bit_weight = Some("637.0uV".to_string()),
            None => {
                rpt.errs.push(
                    "Warning: No bit weight available. Setting it to 1.0e-6.".to_string(),
                );
                warn!("no bit weight available, defaulting to 1.0e-6");
                ev.bit_weight = Some("1.0e-6 V".to_string());
                degraded = true;
            }
        }

        if degraded {
            rpt.errs
                .push("Warning: Could not determine sample rate, gain, or bit weight".to_string());
        }
    }

    fn event_banner(
        &self,
        label: &str,
        eh: &EventHeader,
        stream: usize,
        unit: &str,
        rpt: &mut Reports,
    ) {
        let logs = &mut rpt.logs;
        logs.push(label.to_string());
        logs.push(format!("  event = {}", eh.event));
        logs.push(format!("  stream = {}", stream + 1));
        logs.push(format!("  format = {}", eh.data_format));
        logs.push(format!("  stream name = {}", eh.stream_name));
        logs.push(format!("  sample rate = {}", eh.sample_rate));
        logs.push(format!("  trigger type = {}", eh.trigger_type));
        logs.push(format!(
            "  trigger time = {}",
            event_time(&PacketTime::from_ascii(&eh.trigger_time))
        ));
        logs.push(format!(
            "  first sample = {}",
            event_time(&PacketTime::from_ascii(&eh.first_sample_time))
        ));
        logs.push(format!(
            "  last sample = {}",
            event_time(&PacketTime::from_ascii(&eh.last_sample_time))
        ));
        logs.push(format!(
            "  bit weights = {}",
            eh.nominal_bit_weight.join(" ").trim()
        ));
        logs.push(format!(
            "  true weights = {}",
            eh.true_bit_weight.join(" ").trim()
        ));
        logs.push(format!(
            "DAS: {} EV: {:04} DS: {} FST = {} TT = {} NS: {} SPS: {}ETO: 0",
            unit,
            eh.event,
            stream + 1,
            colonize(&eh.first_sample_time),
            colonize(&eh.trigger_time),
            self.points[stream],
            eh.sample_rate
        ));
    }
}
