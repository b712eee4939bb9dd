#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use anyhow::{Result, bail};
use flate2::read::DeflateDecoder;
use tempfile::TempDir;

/// Install a test subscriber so the crate's informational notices (skip
/// warnings, empty-archive creation, build banners) show up under
/// `RUST_LOG`. Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Source tree fixture mirroring the layout the scanner suites expect:
///
/// ```text
/// alpha/beta/beta.xml
/// alpha/beta/gamma/gamma.xml
/// delta/delta.xml
/// ```
pub struct TestTree {
    pub temp_dir: TempDir,
}

impl TestTree {
    /// Create the fixture tree inside a fresh temporary directory.
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let base = temp_dir.path();
        fs::create_dir_all(base.join("alpha/beta/gamma"))?;
        fs::create_dir_all(base.join("delta"))?;
        fs::write(base.join("alpha/beta/beta.xml"), "<beta/>")?;
        fs::write(base.join("alpha/beta/gamma/gamma.xml"), "<gamma/>")?;
        fs::write(base.join("delta/delta.xml"), "<delta/>")?;
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// One central-directory entry of a produced archive.
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub method: u16,
    pub crc: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub local_header_offset: u32,
}

impl ZipEntry {
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Minimal central-directory reader used to verify produced archives.
/// Test tooling only; the crate itself never reads archives back.
pub struct ZipReader {
    bytes: Vec<u8>,
    pub entries: Vec<ZipEntry>,
}

impl ZipReader {
    pub fn open(path: &Path) -> Result<Self> {
        let mut bytes = Vec::new();
        File::open(path)?.read_to_end(&mut bytes)?;
        Self::parse(bytes)
    }

    pub fn parse(bytes: Vec<u8>) -> Result<Self> {
        // End-of-central-directory: scan backward for the signature.
        let eocd = match (0..=bytes.len().saturating_sub(22))
            .rev()
            .find(|&i| bytes[i..i + 4] == [0x50, 0x4b, 0x05, 0x06])
        {
            Some(i) => i,
            None => bail!("no end-of-central-directory record"),
        };
        let count = read_u16(&bytes, eocd + 10) as usize;
        let cd_offset = read_u32(&bytes, eocd + 16) as usize;

        let mut entries = Vec::with_capacity(count);
        let mut pos = cd_offset;
        for _ in 0..count {
            if bytes[pos..pos + 4] != [0x50, 0x4b, 0x01, 0x02] {
                bail!("bad central directory header at {pos}");
            }
            let method = read_u16(&bytes, pos + 10);
            let crc = read_u32(&bytes, pos + 16);
            let compressed_size = read_u32(&bytes, pos + 20);
            let uncompressed_size = read_u32(&bytes, pos + 24);
            let name_len = read_u16(&bytes, pos + 28) as usize;
            let extra_len = read_u16(&bytes, pos + 30) as usize;
            let comment_len = read_u16(&bytes, pos + 32) as usize;
            let local_header_offset = read_u32(&bytes, pos + 42);
            let name = String::from_utf8(bytes[pos + 46..pos + 46 + name_len].to_vec())?;
            entries.push(ZipEntry {
                name,
                method,
                crc,
                compressed_size,
                uncompressed_size,
                local_header_offset,
            });
            pos += 46 + name_len + extra_len + comment_len;
        }
        Ok(Self { bytes, entries })
    }

    pub fn entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entry names in the order they appear in the central directory, which
    /// matches the order the local entries were written.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// The raw content bytes of an entry as written into the container.
    pub fn raw_content(&self, entry: &ZipEntry) -> Result<&[u8]> {
        let pos = entry.local_header_offset as usize;
        if self.bytes[pos..pos + 4] != [0x50, 0x4b, 0x03, 0x04] {
            bail!("bad local header for {}", entry.name);
        }
        let name_len = read_u16(&self.bytes, pos + 26) as usize;
        let extra_len = read_u16(&self.bytes, pos + 28) as usize;
        let start = pos + 30 + name_len + extra_len;
        Ok(&self.bytes[start..start + entry.compressed_size as usize])
    }

    /// The decompressed content of an entry.
    pub fn content(&self, entry: &ZipEntry) -> Result<Vec<u8>> {
        let raw = self.raw_content(entry)?;
        match entry.method {
            0 => Ok(raw.to_vec()),
            8 => {
                let mut out = Vec::new();
                DeflateDecoder::new(raw).read_to_end(&mut out)?;
                Ok(out)
            }
            other => bail!("unexpected storage method {other}"),
        }
    }
}

fn read_u16(bytes: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([bytes[pos], bytes[pos + 1]])
}

fn read_u32(bytes: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}
