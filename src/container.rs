//! Packet containers: raw directory trees, ZIP and TAR archives, and
//! single flat recorder files.
//!
//! Every backend enumerates its members (sorted by name, filtered by the
//! recorder file-name patterns), then hands whole member buffers to
//! [`PeekBuffer`], which slices them into 1024-byte packets and supports
//! rewinding within the current member.

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use regex::Regex;
use tracing::{info, warn};

use crate::header::PACKET_SIZE;
use crate::Result;

/// Recorder data file names look like `221301000_0036EE80`.
fn file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r".*\w{9}_\w{8}$").expect("hard-coded pattern"))
}

/// State-of-health dumps end in `SOH.RT`, any case.
fn soh_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r".*[Ss][Oo][Hh]\.[Rr][Tt]$").expect("hard-coded pattern"))
}

fn matches_member(name: &str) -> bool {
    file_re().is_match(name) || soh_re().is_match(name)
}

/// The four supported container layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Directory tree of raw recorder files.
    Raw,
    /// ZIP archive.
    Zip,
    /// TAR archive, optionally gzip-compressed.
    Tar,
    /// A single flat recorder file.
    Ref,
}

impl InputKind {
    /// Guess the container layout from the path: a directory is raw
    /// data, a recorder-style file name is a flat file, otherwise go by
    /// suffix with flat file as the fallback.
    pub fn guess(path: &Path) -> Self {
        if path.is_dir() {
            return Self::Raw;
        }
        if matches_member(&path.to_string_lossy()) {
            return Self::Ref;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("zip") | Some("ZIP") => Self::Zip,
            Some("tar") | Some("TAR") => Self::Tar,
            _ => Self::Ref,
        }
    }
}

/// One container member: its name and full contents.
pub struct Member {
    pub name: String,
    pub data: Vec<u8>,
}

/// A container backend. `open` enumerates members, `next_member` yields
/// them in name order.
pub trait PacketSource {
    /// Enumerate members matching the recorder file-name patterns.
    /// Returns how many were found; a missing path yields zero.
    fn open(&mut self) -> Result<usize>;

    /// The next member's contents, or `None` when the container is
    /// exhausted.
    fn next_member(&mut self) -> Result<Option<Member>>;

    /// Drop any open handles. Idempotent.
    fn close(&mut self);
}

/// Directory tree of raw recorder files.
pub struct RawDir {
    root: PathBuf,
    members: Vec<PathBuf>,
}

impl RawDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            members: Vec::new(),
        }
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if matches_member(name) {
                out.push(path);
            }
        }
    }
    Ok(())
}

impl PacketSource for RawDir {
    fn open(&mut self) -> Result<usize> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        info!(root = %self.root.display(), "scanning directory");
        let mut found = Vec::new();
        walk(&self.root, &mut found)?;
        found.sort();
        self.members = found;
        self.members.reverse();
        Ok(self.members.len())
    }

    fn next_member(&mut self) -> Result<Option<Member>> {
        let Some(path) = self.members.pop() else {
            return Ok(None);
        };
        let data = fs::read(&path)?;
        Ok(Some(Member {
            name: path.to_string_lossy().into_owned(),
            data,
        }))
    }

    fn close(&mut self) {
        self.members.clear();
    }
}

/// ZIP archive backend. Member names are collected and sorted at open
/// time; contents are read lazily.
pub struct ZipSource {
    path: PathBuf,
    archive: Option<zip::ZipArchive<File>>,
    names: Vec<String>,
}

impl ZipSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            archive: None,
            names: Vec::new(),
        }
    }
}

impl PacketSource for ZipSource {
    fn open(&mut self) -> Result<usize> {
        if !self.path.is_file() {
            return Ok(0);
        }
        let archive = zip::ZipArchive::new(File::open(&self.path)?)?;
        let mut names: Vec<String> = archive
            .file_names()
            .filter(|n| matches_member(n))
            .map(str::to_owned)
            .collect();
        names.sort();
        names.reverse();
        self.names = names;
        self.archive = Some(archive);
        Ok(self.names.len())
    }

    fn next_member(&mut self) -> Result<Option<Member>> {
        let (Some(archive), Some(name)) = (self.archive.as_mut(), self.names.pop()) else {
            return Ok(None);
        };
        let mut data = Vec::new();
        archive.by_name(&name)?.read_to_end(&mut data)?;
        Ok(Some(Member { name, data }))
    }

    fn close(&mut self) {
        self.archive = None;
        self.names.clear();
    }
}

/// TAR archive backend. The `tar` crate reads entries as a stream, so
/// matching members are extracted into memory at open time and sorted
/// by name; `.gz`/`.tgz` archives are unwrapped with `flate2`.
pub struct TarSource {
    path: PathBuf,
    members: Vec<Member>,
}

impl TarSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            members: Vec::new(),
        }
    }

    fn is_gz(&self) -> bool {
        matches!(
            self.path.extension().and_then(|e| e.to_str()),
            Some("gz") | Some("tgz")
        )
    }
}

impl PacketSource for TarSource {
    fn open(&mut self) -> Result<usize> {
        if !self.path.is_file() {
            return Ok(0);
        }
        let file = File::open(&self.path)?;
        let reader: Box<dyn Read> = if self.is_gz() {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        let mut archive = tar::Archive::new(reader);
        let mut members = Vec::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path()?.to_string_lossy().into_owned();
            if !matches_member(&name) {
                continue;
            }
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            members.push(Member { name, data });
        }
        members.sort_by(|a, b| a.name.cmp(&b.name));
        members.reverse();
        self.members = members;
        Ok(self.members.len())
    }

    fn next_member(&mut self) -> Result<Option<Member>> {
        Ok(self.members.pop())
    }

    fn close(&mut self) {
        self.members.clear();
    }
}

/// A single flat recorder file: one member, the whole file.
pub struct RefFile {
    path: PathBuf,
    pending: bool,
}

impl RefFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pending: false,
        }
    }
}

impl PacketSource for RefFile {
    fn open(&mut self) -> Result<usize> {
        self.pending = self.path.is_file();
        Ok(usize::from(self.pending))
    }

    fn next_member(&mut self) -> Result<Option<Member>> {
        if !self.pending {
            return Ok(None);
        }
        self.pending = false;
        let data = fs::read(&self.path)?;
        Ok(Some(Member {
            name: self.path.to_string_lossy().into_owned(),
            data,
        }))
    }

    fn close(&mut self) {
        self.pending = false;
    }
}

/// Slices member buffers into 1024-byte packets.
///
/// Keeps the whole current member in memory, so rewinding within it is
/// pointer arithmetic rather than a backend seek (ZIP and TAR members
/// are decompressed streams and cannot seek).
pub struct PeekBuffer {
    source: Box<dyn PacketSource>,
    buf: Vec<u8>,
    ptr: usize,
    errs: Vec<String>,
}

impl PeekBuffer {
    pub fn new(source: Box<dyn PacketSource>) -> Self {
        Self {
            source,
            buf: Vec::new(),
            ptr: 0,
            errs: Vec::new(),
        }
    }

    /// Enumerate container members. Returns how many were found.
    pub fn open(&mut self) -> Result<usize> {
        self.source.open()
    }

    /// The next 1024-byte packet, crossing member boundaries, or `None`
    /// at end of input. A short tail is reported as a read error and
    /// skipped.
    pub fn get_packet(&mut self) -> Option<Vec<u8>> {
        loop {
            if self.ptr >= self.buf.len() {
                match self.source.next_member() {
                    Ok(Some(member)) => {
                        info!(member = %member.name, "reading member");
                        self.buf = member.data;
                        self.ptr = 0;
                        continue;
                    }
                    Ok(None) => return None,
                    Err(e) => {
                        self.errs.push(e.to_string());
                        warn!("{e}");
                        continue;
                    }
                }
            }
            let remaining = self.buf.len() - self.ptr;
            if remaining < PACKET_SIZE {
                self.errs
                    .push(format!("Read Error: read {remaining} of {PACKET_SIZE}"));
                warn!("Read Error: read {remaining} of {PACKET_SIZE}");
                self.ptr = self.buf.len();
                continue;
            }
            let packet = self.buf[self.ptr..self.ptr + PACKET_SIZE].to_vec();
            self.ptr += PACKET_SIZE;
            return Some(packet);
        }
    }

    /// Move the read position backward `back` bytes within the current
    /// member, saturating at its start.
    pub fn rewind_subfile(&mut self, back: usize) {
        self.ptr = self.ptr.saturating_sub(back);
    }

    /// Read errors accumulated so far; clears the list.
    pub fn take_errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errs)
    }

    pub fn close(&mut self) {
        self.source.close();
        self.buf.clear();
        self.ptr = 0;
    }
}

/// Open `path` with the given container layout, guessing it from the
/// path when not supplied.
pub fn open_container(path: impl Into<PathBuf>, kind: Option<InputKind>) -> PeekBuffer {
    let path = path.into();
    let kind = kind.unwrap_or_else(|| InputKind::guess(&path));
    let source: Box<dyn PacketSource> = match kind {
        InputKind::Raw => Box::new(RawDir::new(path)),
        InputKind::Zip => Box::new(ZipSource::new(path)),
        InputKind::Tar => Box::new(TarSource::new(path)),
        InputKind::Ref => Box::new(RefFile::new(path)),
    };
    PeekBuffer::new(source)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::packets::tests::blank_packet;

    // Names that satisfy the nine-then-eight word-character pattern.
    const MEMBER_A: &str = "221301000_0036EE80";
    const MEMBER_B: &str = "221302000_0036EE80";

    fn sh_packet(seq: u16) -> Vec<u8> {
        let mut p = blank_packet(b"SH");
        p[14] = ((seq / 100 / 10) << 4) as u8 | ((seq / 100) % 10) as u8;
        p[15] = (((seq % 100) / 10) << 4) as u8 | (seq % 10) as u8;
        p
    }

    #[test]
    fn test_guess_kind() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(InputKind::guess(dir.path()), InputKind::Raw);
        assert_eq!(InputKind::guess(Path::new("data.ZIP")), InputKind::Zip);
        assert_eq!(InputKind::guess(Path::new("data.tar")), InputKind::Tar);
        assert_eq!(InputKind::guess(Path::new(MEMBER_A)), InputKind::Ref);
        assert_eq!(InputKind::guess(Path::new("misc.bin")), InputKind::Ref);
    }

    #[test]
    fn test_member_name_patterns() {
        assert!(matches_member(MEMBER_A));
        assert!(matches_member("STATION0.SOH.RT"));
        assert!(matches_member("station0.soh.rt"));
        assert!(!matches_member("notes.txt"));
        assert!(!matches_member("short_name"));
    }

    #[test]
    fn test_raw_dir_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MEMBER_B), sh_packet(2)).unwrap();
        fs::write(dir.path().join(MEMBER_A), sh_packet(1)).unwrap();
        fs::write(dir.path().join("README"), b"not a packet").unwrap();

        let mut pb = open_container(dir.path(), None);
        assert_eq!(pb.open().unwrap(), 2);
        let first = pb.get_packet().unwrap();
        let second = pb.get_packet().unwrap();
        assert!(pb.get_packet().is_none());
        // lexicographic member order decides packet order
        assert_eq!(&first[14..16], &[0x00, 0x01]);
        assert_eq!(&second[14..16], &[0x00, 0x02]);
    }

    #[test]
    fn test_missing_path_opens_empty() {
        let mut pb = open_container("/no/such/place", Some(InputKind::Raw));
        assert_eq!(pb.open().unwrap(), 0);
        assert!(pb.get_packet().is_none());

        let mut pb = open_container("/no/such/file.zip", Some(InputKind::Zip));
        assert_eq!(pb.open().unwrap(), 0);
    }

    #[test]
    fn test_short_member_reported_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut truncated = sh_packet(1);
        truncated.extend_from_slice(&vec![0u8; 100]);
        fs::write(dir.path().join(MEMBER_A), truncated).unwrap();
        fs::write(dir.path().join(MEMBER_B), sh_packet(2)).unwrap();

        let mut pb = open_container(dir.path(), None);
        pb.open().unwrap();
        assert!(pb.get_packet().is_some());
        // the 100-byte tail is an error, reading continues in MEMBER_B
        let next = pb.get_packet().unwrap();
        assert_eq!(&next[14..16], &[0x00, 0x02]);
        let errs = pb.take_errors();
        assert_eq!(errs, vec!["Read Error: read 100 of 1024".to_string()]);
        assert!(pb.take_errors().is_empty());
    }

    #[test]
    fn test_rewind_within_member() {
        let dir = tempfile::tempdir().unwrap();
        let mut two = sh_packet(1);
        two.extend_from_slice(&sh_packet(2));
        fs::write(dir.path().join(MEMBER_A), two).unwrap();

        let mut pb = open_container(dir.path(), None);
        pb.open().unwrap();
        let a = pb.get_packet().unwrap();
        let b = pb.get_packet().unwrap();
        pb.rewind_subfile(PACKET_SIZE);
        assert_eq!(pb.get_packet().unwrap(), b);
        pb.rewind_subfile(10 * PACKET_SIZE); // saturates at member start
        assert_eq!(pb.get_packet().unwrap(), a);
    }

    #[test]
    fn test_zip_backend() {
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("unit.ZIP");
        let mut writer = zip::ZipWriter::new(File::create(&zip_path).unwrap());
        let opts = zip::write::SimpleFileOptions::default();
        writer.start_file(MEMBER_B, opts).unwrap();
        writer.write_all(&sh_packet(2)).unwrap();
        writer.start_file(MEMBER_A, opts).unwrap();
        writer.write_all(&sh_packet(1)).unwrap();
        writer.start_file("ignore.txt", opts).unwrap();
        writer.write_all(b"skipped").unwrap();
        writer.finish().unwrap();

        let mut pb = open_container(&zip_path, None);
        assert_eq!(pb.open().unwrap(), 2);
        assert_eq!(&pb.get_packet().unwrap()[14..16], &[0x00, 0x01]);
        assert_eq!(&pb.get_packet().unwrap()[14..16], &[0x00, 0x02]);
        assert!(pb.get_packet().is_none());
    }

    #[test]
    fn test_tar_backend_plain_and_gz() {
        let dir = tempfile::tempdir().unwrap();

        let build = |sink: Box<dyn Write>| {
            let mut builder = tar::Builder::new(sink);
            for (name, seq) in [(MEMBER_B, 2), (MEMBER_A, 1)] {
                let data = sh_packet(seq);
                let mut header = tar::Header::new_gnu();
                header.set_size(data.len() as u64);
                header.set_cksum();
                builder.append_data(&mut header, name, data.as_slice()).unwrap();
            }
            builder.finish().unwrap();
        };

        let tar_path = dir.path().join("unit.tar");
        build(Box::new(File::create(&tar_path).unwrap()));
        let gz_path = dir.path().join("unit.tar.gz");
        build(Box::new(flate2::write::GzEncoder::new(
            File::create(&gz_path).unwrap(),
            flate2::Compression::default(),
        )));

        for path in [tar_path, gz_path] {
            let mut pb = open_container(&path, Some(InputKind::Tar));
            assert_eq!(pb.open().unwrap(), 2);
            assert_eq!(&pb.get_packet().unwrap()[14..16], &[0x00, 0x01]);
            assert_eq!(&pb.get_packet().unwrap()[14..16], &[0x00, 0x02]);
            assert!(pb.get_packet().is_none());
        }
    }

    #[test]
    fn test_ref_backend_single_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MEMBER_A);
        let mut data = sh_packet(1);
        data.extend_from_slice(&sh_packet(2));
        fs::write(&path, data).unwrap();

        let mut pb = open_container(&path, None);
        assert_eq!(pb.open().unwrap(), 1);
        assert!(pb.get_packet().is_some());
        assert!(pb.get_packet().is_some());
        assert!(pb.get_packet().is_none());
    }
}
