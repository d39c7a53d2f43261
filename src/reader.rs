//! The `Rt130Reader` driver: pulls packets out of a container, dispatches
//! them by type into the event assembler and the status log emitters, and
//! exposes the pull API callers consume events through.
//!
//! One reader owns one container. Completed events are announced by
//! [`Rt130Reader::get_event`] and collected with
//! [`Rt130Reader::get_stream_event`]; log, error and state-of-health text
//! accumulate until drained.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, error, warn};

use crate::assembler::{Assembler, Outcome, ParEntry, Reports, StreamEvents, NUM_STREAMS};
use crate::container::{open_container, InputKind, PeekBuffer};
use crate::header::{PacketHeader, PacketType, PACKET_SIZE};
use crate::packets::{
    colonize, decode_ds, soh_lines, AuxData, CalibrationDef, DataPacket, DataStreamDef,
    EventHeader, FilterDescription, OperatingMode, StationChannel,
};
use crate::{Result, Rt130Error};

/// Per-type packet tallies for one container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCounts {
    pub dt: u64,
    pub eh: u64,
    pub et: u64,
    pub sh: u64,
    pub sc: u64,
    pub ad: u64,
    pub cd: u64,
    pub ds: u64,
    pub fd: u64,
    pub om: u64,
}

impl PacketCounts {
    pub fn total(&self) -> u64 {
        self.dt
            + self.eh
            + self.et
            + self.sh
            + self.sc
            + self.ad
            + self.cd
            + self.ds
            + self.fd
            + self.om
    }
}

/// Driver over one RT-130 container.
pub struct Rt130Reader {
    source: PeekBuffer,
    assembler: Assembler,
    reports: Reports,
    counts: PacketCounts,
    entry_num: u64,
    verbose: bool,
    last_dt_stream: Option<usize>,
}

impl Rt130Reader {
    /// Open a container, guessing its layout from the path when `kind`
    /// is not given. A path that opens into zero members is reported as
    /// a warning, not an error.
    pub fn new(path: impl Into<PathBuf>, kind: Option<InputKind>) -> Result<Self> {
        Self::with_par(path, kind, HashMap::new())
    }

    /// Like [`new`](Self::new), with an external parameter table
    /// (`das:channel:stream` keys, 1-based) consulted when data packets
    /// arrive with no event header.
    pub fn with_par(
        path: impl Into<PathBuf>,
        kind: Option<InputKind>,
        par: HashMap<String, ParEntry>,
    ) -> Result<Self> {
        let path = path.into();
        let mut source = open_container(&path, kind);
        let members = source.open()?;
        let mut reports = Reports::default();
        if members == 0 {
            reports
                .errs
                .push(format!("Warning: open of {} failed!", path.display()));
            warn!(path = %path.display(), "open found no members");
        }
        Ok(Self {
            source,
            assembler: Assembler::with_par(par),
            reports,
            counts: PacketCounts::default(),
            entry_num: 0,
            verbose: false,
            last_dt_stream: None,
        })
    }

    /// Verbose mode adds per-packet taglines to the log output and the
    /// Steim reverse-integration check on data packets.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn counts(&self) -> &PacketCounts {
        &self.counts
    }

    /// Read until a stream's event completes. Returns
    /// `(stream, points, end_of_file)`; at end of input the stream is
    /// the last data packet's stream (`None` when no data was seen) and
    /// the points are the samples still pending in open events.
    pub fn get_event(&mut self) -> Result<(Option<usize>, u64, bool)> {
        let mut seen = [false; NUM_STREAMS];
        loop {
            let Some(pbuf) = self.next_packet(&mut seen)? else {
                return Ok((self.last_dt_stream, self.assembler.total_points(), true));
            };
            match self.parse_packet(&pbuf) {
                Outcome::Continue | Outcome::Corrupt | Outcome::Ignore => continue,
                Outcome::EndOfEvent { stream, points, .. } => {
                    return Ok((Some(stream), points, false))
                }
            }
        }
    }

    /// Collect completed events: one stream's, or every pending event
    /// (emitted and still open) when `stream` is `None` at end of input.
    pub fn get_stream_event(&mut self, stream: Option<usize>) -> Vec<(usize, StreamEvents)> {
        match stream {
            Some(s) => self
                .assembler
                .take_stream(s)
                .map(|events| vec![(s, events)])
                .unwrap_or_default(),
            None => self.assembler.take_all(),
        }
    }

    /// Accumulated log lines; clears the list.
    pub fn get_logs(&mut self) -> Vec<String> {
        std::mem::take(&mut self.reports.logs)
    }

    /// Accumulated error and warning lines, container read errors first;
    /// clears both lists.
    pub fn get_errs(&mut self) -> Vec<String> {
        let mut out = self.source.take_errors();
        out.append(&mut self.reports.errs);
        out
    }

    /// Accumulated state-of-health lines; clears the list.
    pub fn get_soh(&mut self) -> Vec<String> {
        std::mem::take(&mut self.reports.soh)
    }

    /// Release the container. Idempotent.
    pub fn close(&mut self) {
        self.source.close();
    }

    /// Pull the next packet, running missing-header recovery when a
    /// data packet shows up for a stream with no event open and no
    /// header seen this call.
    fn next_packet(&mut self, seen: &mut [bool; NUM_STREAMS]) -> Result<Option<Vec<u8>>> {
        let Some(pbuf) = self.source.get_packet() else {
            return Ok(None);
        };
        let Ok(header) = PacketHeader::decode(&pbuf) else {
            return Ok(Some(pbuf));
        };
        match header.packet_type {
            PacketType::Eh | PacketType::Et => {
                if let Ok(eh) = EventHeader::decode(&pbuf) {
                    if let Some(flag) = seen.get_mut(eh.data_stream as usize) {
                        *flag = true;
                    }
                }
                Ok(Some(pbuf))
            }
            PacketType::Dt => {
                let Ok(dt) = DataPacket::decode(&pbuf) else {
                    return Ok(Some(pbuf));
                };
                let stream = dt.data_stream as usize;
                if stream >= NUM_STREAMS
                    || seen[stream]
                    || self.assembler.has_open_event(stream)
                {
                    return Ok(Some(pbuf));
                }
                seen[stream] = true;
                self.recover_missing_header(&header, seen)
            }
            _ => Ok(Some(pbuf)),
        }
    }

    /// A data packet arrived with no event header. Scan forward for the
    /// framing packet, build a header from the event trailer when one
    /// matches, then rewind so every scanned packet replays through the
    /// normal dispatch path.
    fn recover_missing_header(
        &mut self,
        dt_header: &PacketHeader,
        seen: &mut [bool; NUM_STREAMS],
    ) -> Result<Option<Vec<u8>>> {
        let tstr = dt_header.time.to_compact();
        self.reports.errs.push(format!(
            "Warning: DT packet forward of EH at {tstr}. Attempting to use ET."
        ));
        warn!(time = %dt_header.time, "data packet forward of event header");

        let mut back = PACKET_SIZE;
        loop {
            let Some(pbuf) = self.source.get_packet() else {
                self.reports
                    .errs
                    .push("Error: No ET found. Yikes!".to_string());
                error!("no event trailer found during recovery");
                return Err(Rt130Error::Recovery(
                    "no event trailer found for headerless data packet".to_string(),
                ));
            };
            back += PACKET_SIZE;
            let Ok(header) = PacketHeader::decode(&pbuf) else {
                continue;
            };
            let is_trailer = header.packet_type == PacketType::Et;
            if !is_trailer && header.packet_type != PacketType::Eh {
                continue;
            }
            let Ok(mut eh) = EventHeader::decode(&pbuf) else {
                continue;
            };
            if let Some(flag) = seen.get_mut(eh.data_stream as usize) {
                *flag = true;
            }
            if is_trailer {
                // Stand in for the missing header: the trailer's
                // metadata, the stranded packet's time as first sample.
                self.counts.eh += 1;
                eh.first_sample_time = tstr.clone();
                let synth_header = PacketHeader {
                    time: dt_header.time,
                    ..header
                };
                if self.verbose {
                    self.reports.logs.push(tagline(
                        self.entry_num,
                        &synth_header,
                    ));
                }
                let _ = self
                    .assembler
                    .handle_eh(&eh, &synth_header, &mut self.reports);
            }
            self.source.rewind_subfile(back);
            return Ok(self.source.get_packet());
        }
    }

    /// Dispatch one packet by type. Per-packet failures become log/error
    /// entries and a `Corrupt` or `Ignore` outcome, never an `Err`.
    fn parse_packet(&mut self, pbuf: &[u8]) -> Outcome {
        let header = match PacketHeader::decode(pbuf) {
            Ok(header) => header,
            Err(Rt130Error::UnknownPacketType(code)) => {
                self.entry_num += 1;
                self.reports.errs.push(format!(
                    "Error: Unknown packet type at packet number {}! Skipping.",
                    self.entry_num
                ));
                error!(code, "unknown packet type");
                return Outcome::Corrupt;
            }
            Err(e) => {
                warn!("failed to parse packet header: {e}");
                return Outcome::Corrupt;
            }
        };
        self.entry_num += 1;
        debug!(%header.packet_type, %header.unit_id, header.sequence, "parsing");

        match header.packet_type {
            PacketType::Dt => self.do_dt(pbuf, &header),
            PacketType::Eh => {
                self.counts.eh += 1;
                match EventHeader::decode(pbuf) {
                    Ok(eh) => {
                        self.push_tagline(&header);
                        self.assembler.handle_eh(&eh, &header, &mut self.reports)
                    }
                    Err(e) => self.corrupt(e),
                }
            }
            PacketType::Et => {
                self.counts.et += 1;
                match EventHeader::decode(pbuf) {
                    Ok(et) => {
                        self.push_tagline(&header);
                        self.assembler.handle_et(&et, &header, &mut self.reports)
                    }
                    Err(e) => self.corrupt(e),
                }
            }
            PacketType::Sh => {
                self.counts.sh += 1;
                match soh_lines(pbuf) {
                    Ok(lines) => {
                        self.log_sh(lines, &header);
                        Outcome::Continue
                    }
                    Err(e) => self.corrupt(e),
                }
            }
            PacketType::Sc => {
                self.counts.sc += 1;
                match StationChannel::decode(pbuf) {
                    Ok(sc) => {
                        self.log_sc(&sc, &header);
                        Outcome::Continue
                    }
                    Err(e) => self.corrupt(e),
                }
            }
            PacketType::Ad => {
                self.counts.ad += 1;
                match AuxData::decode(pbuf) {
                    Ok(ad) => {
                        self.log_ad(&ad, &header);
                        Outcome::Continue
                    }
                    Err(e) => self.corrupt(e),
                }
            }
            PacketType::Cd => {
                self.counts.cd += 1;
                match CalibrationDef::decode(pbuf) {
                    Ok(cd) => {
                        self.log_cd(&cd, &header);
                        Outcome::Continue
                    }
                    Err(e) => self.corrupt(e),
                }
            }
            PacketType::Ds => {
                self.counts.ds += 1;
                match decode_ds(pbuf) {
                    Ok(defs) => {
                        self.log_ds(&defs, &header);
                        Outcome::Continue
                    }
                    Err(e) => self.corrupt(e),
                }
            }
            PacketType::Fd => {
                self.counts.fd += 1;
                match FilterDescription::decode(pbuf) {
                    Ok(fd) => {
                        self.log_fd(&fd, &header);
                        Outcome::Continue
                    }
                    Err(e) => self.corrupt(e),
                }
            }
            PacketType::Om => {
                self.counts.om += 1;
                match OperatingMode::decode(pbuf) {
                    Ok(om) => {
                        self.log_om(&om, &header);
                        Outcome::Continue
                    }
                    Err(e) => self.corrupt(e),
                }
            }
        }
    }

    fn do_dt(&mut self, pbuf: &[u8], header: &PacketHeader) -> Outcome {
        self.counts.dt += 1;
        let dt = match DataPacket::decode(pbuf) {
            Ok(dt) => dt,
            Err(e) => {
                self.reports
                    .errs
                    .push("Found corrupt packet. Discarding.".to_string());
                warn!("corrupt data packet: {e}");
                return Outcome::Corrupt;
            }
        };
        let stream = dt.data_stream as usize;
        if stream >= NUM_STREAMS || dt.channel as usize >= crate::assembler::NUM_CHANNELS {
            self.reports.errs.push(format!(
                "Warning: Ignoring packet for stream {} channel {}.",
                dt.data_stream, dt.channel
            ));
            warn!(stream, channel = dt.channel, "data packet out of range");
            return Outcome::Ignore;
        }
        if self.verbose {
            self.check_reverse_integration(&dt, header);
        }
        self.push_tagline(header);
        let outcome = self.assembler.handle_dt(dt, header, &mut self.reports);
        self.last_dt_stream = Some(stream);
        outcome
    }

    /// The last decoded sample must equal the Steim reverse integration
    /// constant; a mismatch means the packet was damaged in transit.
    fn check_reverse_integration(&mut self, dt: &DataPacket, header: &PacketHeader) {
        let (Some(xn), Some(last)) = (dt.xn, dt.data.last()) else {
            return;
        };
        if xn != *last {
            let t = &header.time;
            self.reports.errs.push(format!(
                "Garbled data packet at: {}:{:03}:{:02}:{:02}:{:02} {:03}ms contains {} samples",
                t.year, t.doy, t.hour, t.minute, t.second, t.millisecond, dt.samples
            ));
            warn!(xn, last, "reverse integration constant mismatch");
        }
    }

    fn corrupt(&mut self, e: Rt130Error) -> Outcome {
        self.reports.errs.push(e.to_string());
        warn!("{e}");
        Outcome::Corrupt
    }

    fn push_tagline(&mut self, header: &PacketHeader) {
        if self.verbose {
            self.reports.logs.push(tagline(self.entry_num, header));
        }
    }

    fn log_sh(&mut self, lines: Vec<String>, header: &PacketHeader) {
        let soh = &mut self.reports.soh;
        if self.verbose {
            soh.push(tagline(self.entry_num, header));
        }
        // year prefix trimmed to two digits in the banner
        let stamp = header.time.to_string();
        soh.push(format!(
            "State of Health  {}   ST: {}",
            &stamp[2..],
            header.unit_id
        ));
        soh.extend(lines);
    }

    fn log_sc(&mut self, sc: &StationChannel, header: &PacketHeader) {
        self.push_tagline(header);
        let logs = &mut self.reports.logs;
        logs.push(format!(
            "Station Channel Definition  {}   ST: {}",
            colonize(&sc.implement_time),
            header.unit_id
        ));
        logs.push(format!(" Experiment Number = {}", sc.experiment_number));
        logs.push(format!(" Experiment Name = {}", sc.experiment_name));
        logs.push(format!("  Comments - {}", sc.experiment_comment));
        logs.push(format!(" Station Number = {}", sc.station_number));
        logs.push(format!(" Station Name = {}", sc.station_name));
        logs.push(format!("  Station Comments - {}", sc.station_comment));
        logs.push(format!(" DAS Model Number = {}", sc.das_model));
        logs.push(format!(" DAS Serial Number = {}", sc.das_serial));
        logs.push(format!(" Experiment Start Time = {}", sc.experiment_start));
        logs.push(format!(" Time Clock Type = {}", sc.clock_type));
        logs.push(format!(" Clock Serial Number = {}", sc.clock_serial));
        for ch in &sc.channels {
            logs.push(format!("  Channel Number = {}", ch.channel));
            logs.push(format!("     Name - {}", ch.name));
            logs.push(format!("     Azimuth - {}", ch.azimuth));
            logs.push("     Location".to_string());
            logs.push(format!("     Inclination - {}", ch.inclination));
            logs.push(format!(
                "     X - {}  Y - {}  Z - {}",
                ch.x_coordinate, ch.y_coordinate, ch.z_coordinate
            ));
            logs.push(format!(
                "     XY Units - {}  Z Units - {}",
                ch.xy_units, ch.z_units
            ));
            logs.push(format!("     Preamplifier Gain = {}", ch.preamp_gain));
            logs.push(format!("     Sensor Model - {}", ch.sensor_model));
            logs.push(format!("     Sensor Serial Number - {}", ch.sensor_serial));
            logs.push(format!(
                "     Volts per Bit = {}",
                ch.adjusted_nominal_bit_weight
            ));
            logs.push(format!("     Comments - {}", ch.comments));
        }
    }

    fn log_ds(&mut self, defs: &[DataStreamDef], header: &PacketHeader) {
        self.push_tagline(header);
        for d in defs {
            let logs = &mut self.reports.logs;
            logs.push(format!(
                "Data Stream Definition {} ST: {}",
                colonize(&d.implement_time),
                header.unit_id
            ));
            logs.push(format!(
                "  Data Stream {} {} {}",
                d.data_stream, d.name, d.recording_destination
            ));
            logs.push(format!("  Channels {}", d.channels_included));
            logs.push(format!(
                "  Sample rate {} samples per second",
                d.sample_rate
            ));
            logs.push(format!("  Data Format {}", d.data_format));
            logs.push(format!("  Trigger Type {}", d.trigger_type));
            for (name, value) in &d.trigger {
                logs.push(format!("     Trigger {name} {value}"));
            }
            if d.raw_trigger_description.is_some() {
                self.reports.errs.push(format!(
                    "Warning: Unknown trigger type {}.",
                    d.trigger_type.trim()
                ));
                warn!(trigger = %d.trigger_type.trim(), "unknown trigger type");
            }
        }
    }

    fn log_ad(&mut self, ad: &AuxData, header: &PacketHeader) {
        self.push_tagline(header);
        let logs = &mut self.reports.logs;
        logs.push(format!(
            "Auxiliary Data Parameter {} ST: {}",
            ad.implement_time, header.unit_id
        ));
        logs.push(format!("  Channels {}", ad.channel_list()));
        logs.push(format!("  Sample Period {}", ad.sample_period));
        logs.push(format!("  Data Format {}", ad.data_format));
        logs.push(format!("  Record Length {}", ad.record_length));
        logs.push(format!(
            "  Recording Destination {}",
            ad.recording_destination
        ));
    }

    fn log_cd(&mut self, cd: &CalibrationDef, header: &PacketHeader) {
        self.push_tagline(header);
        let logs = &mut self.reports.logs;
        logs.push(format!(
            "Calibration Definition {} ST: {}",
            colonize(&cd.implement_time),
            header.unit_id
        ));
        if let Some(cal) = &cd.cal_72a {
            logs.push(format!("  72A Calibration Start Time {}", cal.start_time));
            logs.push(format!(
                "  72A Calibration Repeat Interval {}",
                cal.repeat_interval
            ));
            logs.push(format!("  72A Calibration Intervals {}", cal.intervals));
            logs.push(format!("  72A Calibration Length {}", cal.length));
            logs.push(format!("  72A Calibration Step On/Off {}", cal.step_on_off));
            logs.push(format!("  72A Calibration Step Period {}", cal.step_period));
            logs.push(format!("  72A Calibration Step Size {}", cal.step_size));
            logs.push(format!(
                "  72A Calibration Step Amplitude {}",
                cal.step_amplitude
            ));
            logs.push(format!("  72A Calibration Step Output {}", cal.step_output));
        }
        for ac in &cd.auto_center {
            logs.push(format!("  130 Auto Center Sensor {}", ac.sensor));
            logs.push(format!("  130 Auto Center Enable {}", ac.enable));
            logs.push(format!(
                "  130 Auto Center Reading Interval {}",
                ac.reading_interval
            ));
            logs.push(format!(
                "  130 Auto Center Cycle Interval {}",
                ac.cycle_interval
            ));
            logs.push(format!("  130 Auto Center Level {}", ac.level));
            logs.push(format!("  130 Auto Center Attempts {}", ac.attempts));
            logs.push(format!(
                "  130 Auto Center Attempt Interval {}",
                ac.attempt_interval
            ));
        }
        for cal in &cd.calibration {
            logs.push(format!("  130 Calibration Sensor {}", cal.sensor));
            logs.push(format!("  130 Calibration Enable {}", cal.enable));
            logs.push(format!("  130 Calibration Duration {}", cal.duration));
            logs.push(format!("  130 Calibration Amplitude {}", cal.amplitude));
            logs.push(format!("  130 Calibration Signal {}", cal.signal));
            logs.push(format!(
                "  130 Calibration Step Interval {}",
                cal.step_interval
            ));
            logs.push(format!("  130 Calibration Step Width {}", cal.step_width));
            logs.push(format!(
                "  130 Calibration Sine Frequency {}",
                cal.sine_frequency
            ));
        }
        for seq in &cd.sequence {
            logs.push(format!("  130 Calibration Sequence {}", seq.sequence));
            logs.push(format!("  130 Calibration Sequence Enable {}", seq.enable));
            logs.push(format!(
                "  130 Calibration Sequence Start Time {}",
                seq.start_time
            ));
            logs.push(format!(
                "  130 Calibration Sequence Interval {}",
                seq.interval
            ));
            logs.push(format!("  130 Calibration Sequence Count {}", seq.count));
            logs.push(format!(
                "  130 Calibration Sequence Record Length {}",
                seq.record_length
            ));
        }
    }

    fn log_fd(&mut self, fd: &FilterDescription, header: &PacketHeader) {
        self.push_tagline(header);
        let logs = &mut self.reports.logs;
        for block in &fd.blocks {
            logs.push(format!(
                "Filter Description {} ST: {}",
                fd.implement_time, header.unit_id
            ));
            logs.push(format!("     Filter Block Count {}", block.block_count));
            logs.push(format!("     Filter ID {}", block.id));
            logs.push(format!("     Filter Decimation {}", block.decimation));
            logs.push(format!("     Filter Scaler {}", block.scaler));
            logs.push(format!(
                "     Filter Coefficient Count {}",
                block.coefficient_count
            ));
            logs.push(format!(
                "     Filter Packet Coefficient Count {}",
                block.packet_coefficient_count
            ));
            logs.push(format!(
                "     Filter Coefficient Packet Count {}",
                block.coefficient_packet_count
            ));
            logs.push(format!(
                "     Filter Coefficient Format {}",
                block.coefficient_format
            ));
            logs.push("     Filter Coefficients:".to_string());
            for coeff in &block.coefficients {
                logs.push(format!("  {coeff}"));
            }
        }
    }

    fn log_om(&mut self, om: &OperatingMode, header: &PacketHeader) {
        self.push_tagline(header);
        let logs = &mut self.reports.logs;
        logs.push(format!(
            "Operating Mode Definition {} ST: {}",
            colonize(&om.implement_time),
            header.unit_id
        ));
        logs.push(format!(
            "  Operating Mode 72A Power State {}",
            om.power_state_72a
        ));
        logs.push(format!(
            "  Operating Mode Recording Mode {}",
            om.recording_mode
        ));
        logs.push(format!(
            "  Operating Mode Auto Dump on ET {}",
            om.auto_dump_on_et
        ));
        logs.push(format!(
            "  Operating Mode Auto Dump Threshold {}",
            om.auto_dump_threshold
        ));
        logs.push(format!(
            "  Operating Mode 72A Power Down Delay {}",
            om.power_down_delay_72a
        ));
        logs.push(format!("  Operating Mode Disk Wrap {}", om.disk_wrap));
        logs.push(format!(
            "  Operating Mode 72A Disk Power {}",
            om.disk_power_72a
        ));
        logs.push(format!(
            "  Operating Mode 72A Terminator Power {}",
            om.terminator_power_72a
        ));
        logs.push(format!(
            "  Operating Mode 72A Wake Up Start Time {}",
            om.wakeup_start_time_72a
        ));
        logs.push(format!(
            "  Operating Mode 72A Wake Up Duration {}",
            om.wakeup_duration_72a
        ));
        logs.push(format!(
            "  Operating Mode 72A Wake Up Repeat Interval {}",
            om.wakeup_repeat_interval_72a
        ));
        logs.push(format!(
            "  Operating Mode 72A Number of Wake Up Intervals {}",
            om.wakeup_number_of_intervals_72a
        ));
    }
}

fn tagline(entry_num: u64, header: &PacketHeader) -> String {
    format!(
        "\n{:07} {} exp {:02} bytes {:04} {} ID: {} seq {:04}",
        entry_num,
        header.packet_type,
        header.experiment,
        header.byte_count,
        header.time,
        header.unit_id,
        header.sequence
    )
}
