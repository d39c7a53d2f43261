//! End-to-end tests: the same recording read through every container
//! layout must come out as the same events, counts and log text.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use rt130::{InputKind, PacketCounts, Rt130Reader, StreamEvents};

/// Route tracing output through the test harness so `RUST_LOG` works
/// when debugging a failure.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const MEMBER_A: &str = "221301000_0036EE80";
const MEMBER_B: &str = "221302000_0036EE80";
const SOH_MEMBER: &str = "STATION0.SOH.RT";

fn pack2(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

/// 16-byte header: unit 9D30, experiment 1, 2017:123:01:02:03.ttt.
fn raw_header(type_code: &[u8; 2], ttt: u16, sequence: u16) -> [u8; 16] {
    let mut h = [0u8; 16];
    h[0] = type_code[0];
    h[1] = type_code[1];
    h[2] = pack2(1);
    h[3] = pack2(17);
    h[4..6].copy_from_slice(&0x9D30u16.to_be_bytes());
    let digits = [
        1,
        2,
        3, // day 123
        0,
        1, // 01
        0,
        2, // 02
        0,
        3, // 03
        (ttt / 100) as u8,
        (ttt / 10 % 10) as u8,
        (ttt % 10) as u8,
    ];
    for (i, d) in digits.iter().enumerate() {
        let byte = 6 + i / 2;
        if i % 2 == 0 {
            h[byte] = d << 4;
        } else {
            h[byte] |= d;
        }
    }
    h[12] = pack2(10);
    h[13] = pack2(24);
    h[14] = pack2((sequence / 100) as u8);
    h[15] = pack2((sequence % 100) as u8);
    h
}

fn blank_packet(type_code: &[u8; 2], ttt: u16, sequence: u16) -> Vec<u8> {
    let mut p = vec![b' '; 1024];
    p[..16].copy_from_slice(&raw_header(type_code, ttt, sequence));
    p
}

fn put(p: &mut [u8], offset: usize, s: &str) {
    p[offset..offset + s.len()].copy_from_slice(s.as_bytes());
}

fn eh_packet(event: u16, stream: u8, rate: &str) -> Vec<u8> {
    let mut p = blank_packet(b"EH", 4, 0);
    p[16] = pack2((event / 100) as u8);
    p[17] = pack2((event % 100) as u8);
    p[18] = pack2(stream);
    p[22] = 0;
    p[23] = 0xC0;
    put(&mut p, 88, rate);
    put(&mut p, 112, "2017123010203004");
    put(&mut p, 860, " 6");
    p
}

fn et_packet(event: u16, stream: u8, rate: &str, last: &str) -> Vec<u8> {
    let mut p = eh_packet(event, stream, rate);
    p[0..2].copy_from_slice(b"ET");
    put(&mut p, 144, last);
    p
}

fn dt_packet(event: u16, stream: u8, channel: u8, ttt: u16, samples: &[i16]) -> Vec<u8> {
    let mut p = blank_packet(b"DT", ttt, 1);
    p[16] = pack2((event / 100) as u8);
    p[17] = pack2((event % 100) as u8);
    p[18] = pack2(stream);
    p[19] = pack2(channel);
    p[20] = pack2((samples.len() / 100) as u8);
    p[21] = pack2((samples.len() % 100) as u8);
    p[22] = 0x00;
    p[23] = 0x16;
    for (i, s) in samples.iter().enumerate() {
        p[24 + i * 2..26 + i * 2].copy_from_slice(&s.to_be_bytes());
    }
    p
}

fn concat(packets: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in packets {
        out.extend_from_slice(p);
    }
    out
}

type RunResult = (
    Option<usize>,
    u64,
    bool,
    Vec<(usize, StreamEvents)>,
    PacketCounts,
    Vec<String>,
    Vec<String>,
);

/// Open, pull one event, drain everything.
fn run(path: &Path, kind: Option<InputKind>) -> RunResult {
    let mut reader = Rt130Reader::new(path, kind).unwrap();
    let (stream, points, eof) = reader.get_event().unwrap();
    let events = reader.get_stream_event(stream);
    let counts = *reader.counts();
    let logs = reader.get_logs();
    let errs = reader.get_errs();
    reader.close();
    (stream, points, eof, events, counts, logs, errs)
}

#[test]
fn test_same_recording_through_every_backend() {
    init_tracing();
    let samples: Vec<i16> = (0..100).collect();
    let bytes = concat(&[
        eh_packet(1, 0, " 100"),
        dt_packet(1, 0, 0, 4, &samples),
        et_packet(1, 0, " 100", "2017123010203994"),
    ]);

    let data_dir = tempfile::tempdir().unwrap();
    let member = data_dir.path().join(MEMBER_A);
    fs::write(&member, &bytes).unwrap();

    let arch_dir = tempfile::tempdir().unwrap();
    let zip_path = arch_dir.path().join("unit.zip");
    let mut writer = zip::ZipWriter::new(File::create(&zip_path).unwrap());
    writer
        .start_file(MEMBER_A, zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(&bytes).unwrap();
    writer.finish().unwrap();

    let tar_path = arch_dir.path().join("unit.tar");
    let mut builder = tar::Builder::new(File::create(&tar_path).unwrap());
    let mut header = tar::Header::new_gnu();
    header.set_size(bytes.len() as u64);
    header.set_cksum();
    builder
        .append_data(&mut header, MEMBER_A, bytes.as_slice())
        .unwrap();
    builder.finish().unwrap();

    let raw = run(data_dir.path(), None);
    let flat = run(&member, None);
    let zipped = run(&zip_path, None);
    let tarred = run(&tar_path, None);

    assert_eq!(raw.0, Some(0));
    assert_eq!(raw.1, 100);
    assert!(!raw.2);
    assert!(raw.6.is_empty());
    let ev = &raw.3[0].1[0];
    assert_eq!(ev.event, Some(1));
    assert_eq!(ev.sample_count, 100);
    assert_eq!(ev.sample_rate, Some(100.0));
    assert_eq!(ev.last_sample_time.as_deref(), Some("2017123010203994"));

    assert_eq!(raw, flat);
    assert_eq!(raw, zipped);
    assert_eq!(raw, tarred);
}

#[test]
fn test_event_spans_member_boundary() {
    init_tracing();
    let first: Vec<i16> = (0..50).collect();
    let second: Vec<i16> = (50..100).collect();
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(MEMBER_A),
        concat(&[eh_packet(1, 0, " 100"), dt_packet(1, 0, 0, 4, &first)]),
    )
    .unwrap();
    // second half starts exactly where the first left off
    fs::write(
        dir.path().join(MEMBER_B),
        concat(&[
            dt_packet(1, 0, 0, 504, &second),
            et_packet(1, 0, " 100", "2017123010203994"),
        ]),
    )
    .unwrap();

    let mut reader = Rt130Reader::new(dir.path(), None).unwrap();
    let (stream, points, eof) = reader.get_event().unwrap();
    assert_eq!(stream, Some(0));
    assert_eq!(points, 100);
    assert!(!eof);

    let events = reader.get_stream_event(stream);
    let ev = &events[0].1[0];
    assert_eq!(ev.sample_count, 100);
    assert_eq!(ev.trace.len(), 2);
    assert_eq!(ev.trace[0].data.len(), 50);
    assert_eq!(ev.trace[1].data.len(), 50);
    assert!(reader.get_errs().is_empty());
}

#[test]
fn test_soh_member_collects_state_of_health() {
    init_tracing();
    let mut p = blank_packet(b"SH", 4, 0);
    for b in &mut p[24..] {
        *b = 0;
    }
    put(&mut p, 24, "Powerup\r\nBattery 12.6V\r\n");

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(SOH_MEMBER), p).unwrap();

    let mut reader = Rt130Reader::new(dir.path(), None).unwrap();
    let (stream, points, eof) = reader.get_event().unwrap();
    assert_eq!((stream, points, eof), (None, 0, true));
    assert_eq!(reader.counts().sh, 1);

    let soh = reader.get_soh();
    assert!(soh.contains(&"State of Health  17:123:01:02:03:004   ST: 9D30".to_string()));
    assert!(soh.contains(&"Powerup".to_string()));
    assert!(soh.contains(&"Battery 12.6V".to_string()));
    assert!(reader.get_soh().is_empty());
}

#[test]
fn test_short_member_tail_reported() {
    init_tracing();
    let mut bytes = blank_packet(b"SH", 4, 0);
    bytes.extend_from_slice(&[0u8; 10]);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(MEMBER_A);
    fs::write(&path, bytes).unwrap();

    let mut reader = Rt130Reader::new(&path, None).unwrap();
    let (stream, points, eof) = reader.get_event().unwrap();
    assert_eq!((stream, points, eof), (None, 0, true));
    let errs = reader.get_errs();
    assert_eq!(errs, vec!["Read Error: read 10 of 1024".to_string()]);
    assert!(reader.get_errs().is_empty());
}

#[test]
fn test_archive_with_no_members_warns() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let zip_path = dir.path().join("empty.zip");
    let mut writer = zip::ZipWriter::new(File::create(&zip_path).unwrap());
    writer
        .start_file("notes.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"nothing here").unwrap();
    writer.finish().unwrap();

    let mut reader = Rt130Reader::new(&zip_path, None).unwrap();
    assert!(reader
        .get_errs()
        .contains(&format!("Warning: open of {} failed!", zip_path.display())));
    assert_eq!(reader.get_event().unwrap(), (None, 0, true));
}
