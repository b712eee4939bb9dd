use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::SystemTime;

use chrono::{DateTime, Datelike, Local, Timelike};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// ZIP local file header signature.
const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
/// ZIP central directory file header signature.
const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
/// ZIP end-of-central-directory signature.
const END_OF_CENTRAL_DIR_SIG: u32 = 0x0605_4b50;
/// Minimum version needed to extract (2.0, deflate support).
const VERSION_NEEDED: u16 = 20;
/// Copy buffer size for entry content.
const COPY_BUF: usize = 8 * 1024;

/// How entry content is placed in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageMethod {
    /// Raw copy of the source bytes.
    #[serde(rename = "store")]
    Stored,
    /// Deflate-compressed, the usual choice.
    #[default]
    #[serde(rename = "deflate")]
    Deflated,
}

impl StorageMethod {
    fn code(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflated => 8,
        }
    }
}

/// Read and Seek combined, for sources that can be rewound.
pub trait RewindableRead: Read + Seek {}
impl<T: Read + Seek> RewindableRead for T {}

/// The content of one file entry.
///
/// The distinction matters for stored entries: the container format needs
/// size and checksum in the local header, before any content byte. A
/// rewindable source is read twice (metadata pass, rewind, content pass); a
/// plain stream is buffered in memory once instead.
pub enum EntrySource<'a> {
    /// A source that supports seeking back to the start.
    Rewindable(&'a mut dyn RewindableRead),
    /// A forward-only stream.
    Stream(&'a mut dyn Read),
}

/// Record kept per written entry, replayed into the central directory.
struct CentralRecord {
    name: Vec<u8>,
    method: u16,
    dos_time: u16,
    dos_date: u16,
    crc: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
}

/// Sequential PKZIP container writer.
///
/// Local headers go out as entries are added; the central directory and the
/// end-of-central-directory record follow on [`ZipWriter::finish`]. Entries
/// never use data descriptors; size and checksum are always known before
/// the header is written. Finishing with no entries produces exactly the
/// 22-byte empty archive.
pub struct ZipWriter<W: Write> {
    inner: W,
    offset: u64,
    central: Vec<CentralRecord>,
}

impl<W: Write> ZipWriter<W> {
    /// Wraps an output stream positioned at the start of the archive.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            offset: 0,
            central: Vec::new(),
        }
    }

    /// Number of entries written so far.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.central.len()
    }

    /// Adds a directory entry. The virtual path is given a trailing `/` if
    /// missing. Directory entries are zero-length and stored, with the
    /// checksum of empty content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the header cannot be written.
    pub fn add_directory(&mut self, vpath: &str, mtime: Option<SystemTime>) -> Result<()> {
        let name = if vpath.ends_with('/') {
            vpath.to_string()
        } else {
            format!("{vpath}/")
        };
        let empty_crc = crc32fast::Hasher::new().finalize();
        self.write_entry(&name, StorageMethod::Stored, mtime, empty_crc, &[], 0)
    }

    /// Adds a file entry from the given source.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if reading the source or writing the container
    /// fails.
    pub fn add_file(
        &mut self,
        vpath: &str,
        source: EntrySource<'_>,
        mtime: Option<SystemTime>,
        method: StorageMethod,
    ) -> Result<()> {
        let ctx = |err: io::Error| Error::io(format!("failed to archive {vpath}"), err);
        match method {
            StorageMethod::Deflated => {
                // One streaming pass: checksum and sizes fall out of the
                // compression loop, then the header precedes the buffer.
                let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
                let mut hasher = crc32fast::Hasher::new();
                let uncompressed = match source {
                    EntrySource::Rewindable(mut r) => copy_with_crc(&mut r, &mut encoder, &mut hasher),
                    EntrySource::Stream(mut r) => copy_with_crc(&mut r, &mut encoder, &mut hasher),
                }
                .map_err(ctx)?;
                let compressed = encoder.finish().map_err(ctx)?;
                self.write_entry(
                    vpath,
                    method,
                    mtime,
                    hasher.finalize(),
                    &compressed,
                    uncompressed,
                )
            }
            StorageMethod::Stored => match source {
                EntrySource::Rewindable(mut reader) => {
                    // Metadata pass, rewind, content pass.
                    let mut hasher = crc32fast::Hasher::new();
                    let size =
                        copy_with_crc(&mut reader, &mut io::sink(), &mut hasher).map_err(ctx)?;
                    reader.seek(SeekFrom::Start(0)).map_err(ctx)?;
                    self.write_stored_streaming(vpath, mtime, hasher.finalize(), size, reader)
                }
                EntrySource::Stream(mut reader) => {
                    // Not rewindable: buffer the whole content once.
                    let mut buffer = Vec::new();
                    let mut hasher = crc32fast::Hasher::new();
                    copy_with_crc(&mut reader, &mut buffer, &mut hasher).map_err(ctx)?;
                    let size = buffer.len() as u64;
                    self.write_entry(vpath, method, mtime, hasher.finalize(), &buffer, size)
                }
            },
        }
    }

    /// Writes the central directory and end record, flushes, and hands the
    /// stream back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the trailer cannot be written.
    pub fn finish(mut self) -> Result<W> {
        let central_start = self.offset;
        let mut central_size = 0u64;
        for idx in 0..self.central.len() {
            let record = &self.central[idx];
            let mut header = Vec::with_capacity(46 + record.name.len());
            header.extend_from_slice(&CENTRAL_HEADER_SIG.to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes()); // version made by
            header.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes()); // general purpose flags
            header.extend_from_slice(&record.method.to_le_bytes());
            header.extend_from_slice(&record.dos_time.to_le_bytes());
            header.extend_from_slice(&record.dos_date.to_le_bytes());
            header.extend_from_slice(&record.crc.to_le_bytes());
            header.extend_from_slice(&record.compressed_size.to_le_bytes());
            header.extend_from_slice(&record.uncompressed_size.to_le_bytes());
            header.extend_from_slice(&(record.name.len() as u16).to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes()); // extra field length
            header.extend_from_slice(&0u16.to_le_bytes()); // comment length
            header.extend_from_slice(&0u16.to_le_bytes()); // disk number start
            header.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
            header.extend_from_slice(&0u32.to_le_bytes()); // external attributes
            header.extend_from_slice(&record.local_header_offset.to_le_bytes());
            header.extend_from_slice(&record.name);
            self.write_all(&header)?;
            central_size += header.len() as u64;
        }

        let mut end = Vec::with_capacity(22);
        end.extend_from_slice(&END_OF_CENTRAL_DIR_SIG.to_le_bytes());
        end.extend_from_slice(&0u16.to_le_bytes()); // this disk
        end.extend_from_slice(&0u16.to_le_bytes()); // central directory disk
        end.extend_from_slice(&(self.central.len() as u16).to_le_bytes());
        end.extend_from_slice(&(self.central.len() as u16).to_le_bytes());
        end.extend_from_slice(&(central_size as u32).to_le_bytes());
        end.extend_from_slice(&(central_start as u32).to_le_bytes());
        end.extend_from_slice(&0u16.to_le_bytes()); // comment length
        self.write_all(&end)?;

        self.inner
            .flush()
            .map_err(|err| Error::io("failed to flush archive", err))?;
        Ok(self.inner)
    }

    /// Emits a local header followed by pre-assembled content bytes.
    fn write_entry(
        &mut self,
        name: &str,
        method: StorageMethod,
        mtime: Option<SystemTime>,
        crc: u32,
        content: &[u8],
        uncompressed_size: u64,
    ) -> Result<()> {
        self.write_local_header(
            name,
            method,
            mtime,
            crc,
            content.len() as u64,
            uncompressed_size,
        )?;
        self.write_all(content)
    }

    /// Stored entry from a rewound source: header first, then a second
    /// streaming pass over the content.
    fn write_stored_streaming(
        &mut self,
        name: &str,
        mtime: Option<SystemTime>,
        crc: u32,
        size: u64,
        reader: &mut dyn RewindableRead,
    ) -> Result<()> {
        self.write_local_header(name, StorageMethod::Stored, mtime, crc, size, size)?;
        let mut reader = reader;
        let copied = io::copy(&mut reader, &mut self.inner)
            .map_err(|err| Error::io(format!("failed to archive {name}"), err))?;
        if copied != size {
            return Err(Error::io(
                format!("failed to archive {name}"),
                io::Error::other(format!(
                    "source changed size mid-write ({size} bytes expected, {copied} copied)"
                )),
            ));
        }
        self.offset_after_content(copied);
        Ok(())
    }

    fn write_local_header(
        &mut self,
        name: &str,
        method: StorageMethod,
        mtime: Option<SystemTime>,
        crc: u32,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Result<()> {
        let name_bytes = name.as_bytes().to_vec();
        let (dos_time, dos_date) = dos_date_time(mtime);
        let local_header_offset = self.offset as u32;

        let mut header = Vec::with_capacity(30 + name_bytes.len());
        header.extend_from_slice(&LOCAL_HEADER_SIG.to_le_bytes());
        header.extend_from_slice(&VERSION_NEEDED.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // general purpose flags
        header.extend_from_slice(&method.code().to_le_bytes());
        header.extend_from_slice(&dos_time.to_le_bytes());
        header.extend_from_slice(&dos_date.to_le_bytes());
        header.extend_from_slice(&crc.to_le_bytes());
        header.extend_from_slice(&(compressed_size as u32).to_le_bytes());
        header.extend_from_slice(&(uncompressed_size as u32).to_le_bytes());
        header.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes()); // extra field length
        header.extend_from_slice(&name_bytes);
        self.write_all(&header)?;

        self.central.push(CentralRecord {
            name: name_bytes,
            method: method.code(),
            dos_time,
            dos_date,
            crc,
            compressed_size: compressed_size as u32,
            uncompressed_size: uncompressed_size as u32,
            local_header_offset,
        });
        Ok(())
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner
            .write_all(bytes)
            .map_err(|err| Error::io("failed to write archive", err))?;
        self.offset += bytes.len() as u64;
        Ok(())
    }

    fn offset_after_content(&mut self, len: u64) {
        self.offset += len;
    }
}

/// Copies `reader` into `writer`, feeding every byte through the CRC hasher.
/// Returns the number of bytes copied.
fn copy_with_crc(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    hasher: &mut crc32fast::Hasher,
) -> io::Result<u64> {
    let mut buf = [0u8; COPY_BUF];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

/// Converts a modification time to MS-DOS time and date fields. Times before
/// 1980 (or absent) collapse to the DOS epoch.
fn dos_date_time(mtime: Option<SystemTime>) -> (u16, u16) {
    let Some(mtime) = mtime else {
        return (0, 0b0000_0000_0010_0001); // 1980-01-01 00:00:00
    };
    let local: DateTime<Local> = mtime.into();
    if local.year() < 1980 {
        return (0, 0b0000_0000_0010_0001);
    }
    let date = (((local.year() - 1980) as u16) << 9)
        | ((local.month() as u16) << 5)
        | (local.day() as u16);
    let time = ((local.hour() as u16) << 11)
        | ((local.minute() as u16) << 5)
        | ((local.second() as u16) / 2);
    (time, date)
}
