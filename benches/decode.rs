use std::fs;

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use rt130::steim::{decode_steim1, decode_steim2};
use rt130::{DataPacket, PacketHeader, Rt130Reader};

/// Generate seismic-like samples: slow drift plus small variation, so
/// consecutive diffs stay within one byte.
fn seismic_samples(n: usize) -> Vec<i32> {
    let mut v = Vec::with_capacity(n);
    for i in 0..n {
        let drift = (i as f64 * 0.05).sin() * 50.0;
        let wiggle = ((i as f64 * 1.7).sin() * 10.0) as i32;
        v.push(1000 + drift as i32 + wiggle);
    }
    v
}

fn pack2(v: u8) -> u8 {
    ((v / 10) << 4) | (v % 10)
}

/// 16-byte BCD header: unit 9D30, 2017:123:01:02:ss.ttt.
fn raw_header(type_code: &[u8; 2], ss: u8, ttt: u16) -> [u8; 16] {
    let mut h = [0u8; 16];
    h[0] = type_code[0];
    h[1] = type_code[1];
    h[2] = pack2(1);
    h[3] = pack2(17);
    h[4..6].copy_from_slice(&0x9D30u16.to_be_bytes());
    let digits = [
        1,
        2,
        3,
        0,
        1,
        0,
        2,
        ss / 10,
        ss % 10,
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
    h[15] = pack2(1);
    h
}

/// Pack samples into the 960-byte Steim area as four 8-bit diffs per
/// word, the densest layout the generator's diffs always fit.
fn steim1_area(samples: &[i32]) -> Vec<u8> {
    let mut words = vec![0u32; 240];
    let mut diffs = vec![0i32];
    diffs.extend(samples.windows(2).map(|w| w[1] - w[0]));
    let mut it = diffs.iter();
    'fill: for frame in 0..15 {
        let base = frame * 16;
        let first = if frame == 0 { 3 } else { 1 };
        for w in first..16 {
            let mut word = 0u32;
            let mut used = false;
            for b in 0..4 {
                let Some(&d) = it.next() else {
                    if used {
                        words[base] |= 0b01 << (30 - w * 2);
                        words[base + w] = word;
                    }
                    break 'fill;
                };
                used = true;
                word |= u32::from(d as i8 as u8) << (24 - b * 8);
            }
            words[base] |= 0b01 << (30 - w * 2);
            words[base + w] = word;
        }
    }
    words[1] = samples[0] as u32;
    words[2] = *samples.last().unwrap() as u32;
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

fn dt_packet_int16(ss: u8, samples: &[i16]) -> Vec<u8> {
    let mut p = vec![b' '; 1024];
    p[..16].copy_from_slice(&raw_header(b"DT", ss, 4));
    p[16..20].copy_from_slice(&[pack2(0), pack2(1), pack2(0), pack2(0)]);
    p[20] = pack2((samples.len() / 100) as u8);
    p[21] = pack2((samples.len() % 100) as u8);
    p[22] = 0x00;
    p[23] = 0x16;
    for (i, s) in samples.iter().enumerate() {
        p[24 + i * 2..26 + i * 2].copy_from_slice(&s.to_be_bytes());
    }
    p
}

fn dt_packet_steim1(ss: u8, samples: &[i32]) -> Vec<u8> {
    let mut p = vec![b' '; 1024];
    p[..16].copy_from_slice(&raw_header(b"DT", ss, 4));
    p[16..20].copy_from_slice(&[pack2(0), pack2(1), pack2(0), pack2(0)]);
    p[20] = pack2((samples.len() / 100) as u8);
    p[21] = pack2((samples.len() % 100) as u8);
    p[22] = 0x00;
    p[23] = 0xC0;
    p[24..984].copy_from_slice(&steim1_area(samples));
    p
}

fn eh_packet(type_code: &[u8; 2]) -> Vec<u8> {
    let mut p = vec![b' '; 1024];
    p[..16].copy_from_slice(&raw_header(type_code, 3, 4));
    p[16..19].copy_from_slice(&[pack2(0), pack2(1), pack2(0)]);
    p[22] = 0;
    p[23] = 0xC0;
    p[88..92].copy_from_slice(b" 100");
    p[112..128].copy_from_slice(b"2017123010203004");
    p[860..862].copy_from_slice(b" 6");
    p
}

fn bench_header(c: &mut Criterion) {
    let packet = dt_packet_int16(3, &[0; 100]);
    c.bench_function("header/decode", |b| {
        b.iter(|| PacketHeader::decode(black_box(&packet)).unwrap())
    });
}

fn bench_packet(c: &mut Criterion) {
    let int16: Vec<i16> = (0..100).collect();
    let p_int16 = dt_packet_int16(3, &int16);
    let steim = seismic_samples(800);
    let p_steim = dt_packet_steim1(3, &steim);

    let mut group = c.benchmark_group("dt_decode");
    group.throughput(Throughput::Elements(100));
    group.bench_function("int16/100samp", |b| {
        b.iter(|| DataPacket::decode(black_box(&p_int16)).unwrap())
    });
    group.throughput(Throughput::Elements(800));
    group.bench_function("steim1/800samp", |b| {
        b.iter(|| DataPacket::decode(black_box(&p_steim)).unwrap())
    });
    group.finish();
}

fn bench_steim(c: &mut Criterion) {
    let samples = seismic_samples(800);
    let area = steim1_area(&samples);

    let mut group = c.benchmark_group("steim");
    group.throughput(Throughput::Elements(800));
    group.bench_function("steim1/800samp", |b| {
        b.iter(|| decode_steim1(black_box(&area), 800).unwrap())
    });
    // 8-bit diff words decode identically under both schemes
    group.bench_function("steim2/800samp", |b| {
        b.iter(|| decode_steim2(black_box(&area), 800).unwrap())
    });
    group.finish();
}

fn bench_reader(c: &mut Criterion) {
    // one event: header, eight contiguous Steim packets, trailer
    let samples = seismic_samples(800);
    let mut bytes = eh_packet(b"EH");
    for i in 0..8u8 {
        bytes.extend_from_slice(&dt_packet_steim1(3 + i * 8, &samples));
    }
    let mut trailer = eh_packet(b"ET");
    trailer[144..160].copy_from_slice(b"2017123010306994");
    bytes.extend_from_slice(&trailer);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("221301000_0036EE80");
    fs::write(&path, bytes).unwrap();

    c.bench_function("reader/event_8pkt", |b| {
        b.iter(|| {
            let mut reader = Rt130Reader::new(&path, None).unwrap();
            let (stream, points, _) = reader.get_event().unwrap();
            assert_eq!(points, 6400);
            let events = reader.get_stream_event(stream);
            assert_eq!(events[0].1[0].sample_count, 6400);
        })
    });
}

criterion_group!(benches, bench_header, bench_packet, bench_steim, bench_reader);
criterion_main!(benches);
