//! ZIP header structures.

use lumpkit_core::bytes::{self, ByteReader};
use lumpkit_core::{ArchiveError, CompressionMethod, Result};
use std::time::{SystemTime, UNIX_EPOCH};

/// ZIP local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// ZIP central directory header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// ZIP end of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// Marker value for Zip64 (0xFFFFFFFF for 32-bit fields).
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Marker value for Zip64 (0xFFFF for 16-bit fields).
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Flag bit for encrypted members.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Flag bit for UTF-8 names.
pub const FLAG_UTF8: u16 = 0x0800;

const LOCAL_HEADER_SIZE: usize = 30;
const CENTRAL_HEADER_SIZE: usize = 46;
const EOCD_SIZE: usize = 22;
const MAX_COMMENT_LEN: usize = 0xFFFF;

const VERSION_MADE_BY: u16 = 0x031E;
const VERSION_STORED: u16 = 10;
const VERSION_DEFLATE: u16 = 20;

/// Map a ZIP method number to a core compression method.
pub fn method_from_u16(value: u16) -> CompressionMethod {
    match value {
        0 => CompressionMethod::Stored,
        8 => CompressionMethod::Deflate,
        other => CompressionMethod::Unknown(other),
    }
}

/// ZIP method number of a core compression method.
pub fn method_to_u16(method: CompressionMethod) -> u16 {
    match method {
        CompressionMethod::Stored => 0,
        CompressionMethod::Deflate => 8,
        CompressionMethod::Unknown(id) => id,
    }
}

/// End of central directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfCentralDir {
    /// Total number of central directory records.
    pub entries: u16,
    /// Size of the central directory.
    pub cd_size: u32,
    /// Offset of the central directory.
    pub cd_offset: u32,
}

impl EndOfCentralDir {
    /// Locate and read the record, scanning backwards over a trailing comment.
    pub fn find(data: &[u8]) -> Result<Self> {
        if data.len() < EOCD_SIZE {
            return Err(ArchiveError::unexpected_eof(0, EOCD_SIZE - data.len()));
        }
        let search_start = data.len().saturating_sub(MAX_COMMENT_LEN + EOCD_SIZE);
        let sig = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        let pos = data[search_start..data.len() - EOCD_SIZE + 4]
            .windows(4)
            .rposition(|w| w == sig)
            .map(|p| search_start + p)
            .ok_or_else(|| ArchiveError::invalid_header("End of central directory not found"))?;

        let mut reader = ByteReader::at(data, pos + 4);
        let _disk = reader.u16()?;
        let _cd_disk = reader.u16()?;
        let _disk_entries = reader.u16()?;
        let entries = reader.u16()?;
        let cd_size = reader.u32()?;
        let cd_offset = reader.u32()?;

        if entries == ZIP64_MARKER_16 || cd_size == ZIP64_MARKER_32 || cd_offset == ZIP64_MARKER_32
        {
            return Err(ArchiveError::unsupported("zip", "Zip64 archives"));
        }
        Ok(Self {
            entries,
            cd_size,
            cd_offset,
        })
    }

    /// Append the record (without comment).
    pub fn write(&self, out: &mut Vec<u8>) {
        bytes::put_u32(out, END_OF_CENTRAL_DIR_SIG);
        bytes::put_u16(out, 0); // Disk number
        bytes::put_u16(out, 0); // Disk with central directory
        bytes::put_u16(out, self.entries);
        bytes::put_u16(out, self.entries);
        bytes::put_u32(out, self.cd_size);
        bytes::put_u32(out, self.cd_offset);
        bytes::put_u16(out, 0); // Comment length
    }
}

/// Central directory record of one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirEntry {
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: CompressionMethod,
    /// Last modification time (DOS).
    pub mtime: u16,
    /// Last modification date (DOS).
    pub mdate: u16,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u32,
    /// Uncompressed size.
    pub uncompressed_size: u32,
    /// Member name (directories end with `/`).
    pub name: String,
    /// External file attributes.
    pub external_attr: u32,
    /// Offset of the local header.
    pub local_header_offset: u32,
}

impl CentralDirEntry {
    /// Read one record.
    pub fn read(reader: &mut ByteReader<'_>) -> Result<Self> {
        let start = reader.position();
        let signature = reader.u32()?;
        if signature != CENTRAL_DIR_HEADER_SIG {
            return Err(ArchiveError::invalid_magic(
                CENTRAL_DIR_HEADER_SIG.to_le_bytes().to_vec(),
                signature.to_le_bytes().to_vec(),
            ));
        }

        let _version_made_by = reader.u16()?;
        let _version_needed = reader.u16()?;
        let flags = reader.u16()?;
        let method = method_from_u16(reader.u16()?);
        let mtime = reader.u16()?;
        let mdate = reader.u16()?;
        let crc32 = reader.u32()?;
        let compressed_size = reader.u32()?;
        let uncompressed_size = reader.u32()?;
        let name_len = reader.u16()? as usize;
        let extra_len = reader.u16()? as usize;
        let comment_len = reader.u16()? as usize;
        let _disk_start = reader.u16()?;
        let _internal_attr = reader.u16()?;
        let external_attr = reader.u32()?;
        let local_header_offset = reader.u32()?;
        let name = String::from_utf8_lossy(reader.take(name_len)?).into_owned();
        reader.take(extra_len)?;
        reader.take(comment_len)?;

        if compressed_size == ZIP64_MARKER_32
            || uncompressed_size == ZIP64_MARKER_32
            || local_header_offset == ZIP64_MARKER_32
        {
            return Err(ArchiveError::corrupted(
                start as u64,
                format!("member '{}' uses Zip64 fields", name),
            ));
        }

        Ok(Self {
            flags,
            method,
            mtime,
            mdate,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            external_attr,
            local_header_offset,
        })
    }

    /// Record for a file member.
    pub fn file(name: &str, method: CompressionMethod, crc32: u32, sizes: (u32, u32)) -> Self {
        let (mtime, mdate) = dos_time_now();
        Self {
            flags: if name.is_ascii() { 0 } else { FLAG_UTF8 },
            method,
            mtime,
            mdate,
            crc32,
            compressed_size: sizes.0,
            uncompressed_size: sizes.1,
            name: name.to_string(),
            external_attr: 0o100644 << 16, // Regular file, rw-r--r--
            local_header_offset: 0,
        }
    }

    /// Record for a directory member; `/` is appended if missing.
    pub fn directory(name: &str) -> Self {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{}/", name)
        };
        Self {
            external_attr: 0o40755 << 16, // Directory, rwxr-xr-x
            ..Self::file(&name, CompressionMethod::Stored, 0, (0, 0))
        }
    }

    /// Check if this record is a directory.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Check if the member is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    fn version_needed(&self) -> u16 {
        match self.method {
            CompressionMethod::Deflate => VERSION_DEFLATE,
            _ => VERSION_STORED,
        }
    }

    /// Offset of the member data, read from its local header.
    pub fn data_offset(&self, data: &[u8]) -> Result<usize> {
        let offset = self.local_header_offset as usize;
        let mut reader = ByteReader::at(data, offset);
        let signature = reader.u32()?;
        if signature != LOCAL_FILE_HEADER_SIG {
            return Err(ArchiveError::invalid_magic(
                LOCAL_FILE_HEADER_SIG.to_le_bytes().to_vec(),
                signature.to_le_bytes().to_vec(),
            ));
        }
        let mut reader = ByteReader::at(data, offset + 26);
        let name_len = reader.u16()? as usize;
        let extra_len = reader.u16()? as usize;
        Ok(offset + LOCAL_HEADER_SIZE + name_len + extra_len)
    }

    fn name_len(&self) -> Result<u16> {
        u16::try_from(self.name.len())
            .map_err(|_| ArchiveError::invalid_name(&self.name, "name longer than 65535 bytes"))
    }

    /// Append the local file header for this member.
    pub fn write_local(&self, out: &mut Vec<u8>) -> Result<()> {
        let name_len = self.name_len()?;
        bytes::put_u32(out, LOCAL_FILE_HEADER_SIG);
        bytes::put_u16(out, self.version_needed());
        bytes::put_u16(out, self.flags);
        bytes::put_u16(out, method_to_u16(self.method));
        bytes::put_u16(out, self.mtime);
        bytes::put_u16(out, self.mdate);
        bytes::put_u32(out, self.crc32);
        bytes::put_u32(out, self.compressed_size);
        bytes::put_u32(out, self.uncompressed_size);
        bytes::put_u16(out, name_len);
        bytes::put_u16(out, 0); // Extra field length
        out.extend_from_slice(self.name.as_bytes());
        Ok(())
    }

    /// Append the central directory record; returns its size.
    pub fn write_central(&self, out: &mut Vec<u8>) -> Result<usize> {
        let name_len = self.name_len()?;
        bytes::put_u32(out, CENTRAL_DIR_HEADER_SIG);
        bytes::put_u16(out, VERSION_MADE_BY);
        bytes::put_u16(out, self.version_needed());
        bytes::put_u16(out, self.flags);
        bytes::put_u16(out, method_to_u16(self.method));
        bytes::put_u16(out, self.mtime);
        bytes::put_u16(out, self.mdate);
        bytes::put_u32(out, self.crc32);
        bytes::put_u32(out, self.compressed_size);
        bytes::put_u32(out, self.uncompressed_size);
        bytes::put_u16(out, name_len);
        bytes::put_u16(out, 0); // Extra field length
        bytes::put_u16(out, 0); // Comment length
        bytes::put_u16(out, 0); // Disk number start
        bytes::put_u16(out, 0); // Internal attributes
        bytes::put_u32(out, self.external_attr);
        bytes::put_u32(out, self.local_header_offset);
        out.extend_from_slice(self.name.as_bytes());
        Ok(CENTRAL_HEADER_SIZE + self.name.len())
    }
}

/// Current time in DOS format `(time, date)`.
pub fn dos_time_now() -> (u16, u16) {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    dos_time(secs)
}

/// Convert seconds since the Unix epoch to DOS `(time, date)`.
pub fn dos_time(secs: u64) -> (u16, u16) {
    let days = (secs / 86400) as i64;
    let time_of_day = secs % 86400;

    let hours = (time_of_day / 3600) as u16;
    let minutes = ((time_of_day % 3600) / 60) as u16;
    let seconds = ((time_of_day % 60) / 2) as u16; // DOS stores in 2-second increments
    let mtime = (hours << 11) | (minutes << 5) | seconds;

    // Civil date from days since 1970-01-01
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u16;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u16;
    let year = yoe + era * 400 + i64::from(month <= 2);

    let mdate = if (1980..=2107).contains(&year) {
        (((year - 1980) as u16) << 9) | (month << 5) | day
    } else {
        0 // Outside the DOS range
    };
    (mtime, mdate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_method() {
        assert_eq!(method_from_u16(0), CompressionMethod::Stored);
        assert_eq!(method_from_u16(8), CompressionMethod::Deflate);
        assert_eq!(method_from_u16(14), CompressionMethod::Unknown(14));
        assert_eq!(method_to_u16(CompressionMethod::Deflate), 8);
    }

    #[test]
    fn test_dos_time() {
        // 2024-03-15 13:45:30 UTC
        let (time, date) = dos_time(1_710_510_330);
        assert_eq!(time >> 11, 13);
        assert_eq!((time >> 5) & 0x3F, 45);
        assert_eq!(time & 0x1F, 15);
        assert_eq!(date >> 9, 2024 - 1980);
        assert_eq!((date >> 5) & 0x0F, 3);
        assert_eq!(date & 0x1F, 15);

        assert_eq!(dos_time(0).1, 0);
    }

    #[test]
    fn test_central_record() {
        let mut record = CentralDirEntry::file("maps/map01.wad", CompressionMethod::Stored, 7, (5, 5));
        record.local_header_offset = 40;
        let mut out = Vec::new();
        let size = record.write_central(&mut out).unwrap();
        assert_eq!(size, out.len());

        let mut reader = ByteReader::at(&out, 0);
        let read = CentralDirEntry::read(&mut reader).unwrap();
        assert_eq!(read, record);
        assert!(!read.is_dir());
        assert!(CentralDirEntry::directory("maps").is_dir());
    }

    #[test]
    fn test_find_eocd() {
        let mut out = vec![0u8; 10];
        EndOfCentralDir {
            entries: 3,
            cd_size: 100,
            cd_offset: 10,
        }
        .write(&mut out);
        let eocd = EndOfCentralDir::find(&out).unwrap();
        assert_eq!(eocd.entries, 3);
        assert_eq!(eocd.cd_offset, 10);

        assert!(EndOfCentralDir::find(&[0u8; 30]).is_err());
    }
}
