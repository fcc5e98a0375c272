//! Minimal ZIP container encoder.
//!
//! Serialises an ordered sequence of `(member_name, bytes)` pairs into a ZIP
//! byte string using the store method (no compression). The output carries a
//! local file header per member, a central directory, and an
//! end-of-central-directory record, which is everything a standard decoder
//! needs. Member timestamps are fixed, so the same input sequence produces
//! the same archive.

const LOCAL_FILE_HEADER: u32 = 0x0403_4b50;
const CENTRAL_DIR_HEADER: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIR: u32 = 0x0605_4b50;

/// Minimum version to extract: 2.0 (store method, directory support).
const VERSION: u16 = 20;

/// Fixed DOS modification date: 2000-01-01, 00:00:00.
const DOS_TIME: u16 = 0;
const DOS_DATE: u16 = (2000 - 1980) << 9 | 1 << 5 | 1;

/// Incremental ZIP writer. Members appear in the archive in the order they
/// are added.
#[derive(Debug, Default)]
pub struct ZipBuilder {
    entries: Vec<u8>,
    central: Vec<u8>,
    count: u64,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one member. `name` must use forward slashes and no leading `/`.
    pub fn add(&mut self, name: &str, content: &[u8]) {
        let offset = self.entries.len() as u32;
        let crc = crc32(content);
        let size = content.len() as u32;
        let name_bytes = name.as_bytes();

        // Local file header.
        put_u32(&mut self.entries, LOCAL_FILE_HEADER);
        put_u16(&mut self.entries, VERSION);
        put_u16(&mut self.entries, 0); // general purpose flags
        put_u16(&mut self.entries, 0); // method: store
        put_u16(&mut self.entries, DOS_TIME);
        put_u16(&mut self.entries, DOS_DATE);
        put_u32(&mut self.entries, crc);
        put_u32(&mut self.entries, size); // compressed
        put_u32(&mut self.entries, size); // uncompressed
        put_u16(&mut self.entries, name_bytes.len() as u16);
        put_u16(&mut self.entries, 0); // extra field length
        self.entries.extend_from_slice(name_bytes);
        self.entries.extend_from_slice(content);

        // Matching central directory record.
        put_u32(&mut self.central, CENTRAL_DIR_HEADER);
        put_u16(&mut self.central, VERSION); // version made by
        put_u16(&mut self.central, VERSION); // version needed
        put_u16(&mut self.central, 0);
        put_u16(&mut self.central, 0);
        put_u16(&mut self.central, DOS_TIME);
        put_u16(&mut self.central, DOS_DATE);
        put_u32(&mut self.central, crc);
        put_u32(&mut self.central, size);
        put_u32(&mut self.central, size);
        put_u16(&mut self.central, name_bytes.len() as u16);
        put_u16(&mut self.central, 0); // extra field length
        put_u16(&mut self.central, 0); // comment length
        put_u16(&mut self.central, 0); // disk number
        put_u16(&mut self.central, 0); // internal attributes
        put_u32(&mut self.central, 0); // external attributes
        put_u32(&mut self.central, offset);
        self.central.extend_from_slice(name_bytes);

        self.count += 1;
    }

    /// Finish the archive and return its bytes.
    pub fn finish(self) -> Vec<u8> {
        let central_offset = self.entries.len() as u32;
        let central_size = self.central.len() as u32;
        let count = u16::try_from(self.count).unwrap_or(u16::MAX);

        let mut out = self.entries;
        out.extend_from_slice(&self.central);
        put_u32(&mut out, END_OF_CENTRAL_DIR);
        put_u16(&mut out, 0); // this disk
        put_u16(&mut out, 0); // central directory disk
        put_u16(&mut out, count);
        put_u16(&mut out, count);
        put_u32(&mut out, central_size);
        put_u32(&mut out, central_offset);
        put_u16(&mut out, 0); // comment length
        out
    }
}

fn put_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// CRC-32 (ISO-HDLC polynomial, reflected), as required by the ZIP format.
fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = u32::MAX;
    for &byte in bytes {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            let mask = (crc & 1).wrapping_neg();
            crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
        }
    }
    !crc
}
