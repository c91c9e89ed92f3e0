//! Structured file I/O for binary data serialization.
//!
//! Checksummed primitive reads and writes for the snapshot format. The
//! checksum is a single streaming crc32 over every byte that passes through,
//! so a torn or bit-flipped file fails footer verification no matter where
//! the damage landed.

use std::collections::{HashMap, HashSet};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, XystonError};
use crate::storage::{StorageInput, StorageOutput};
use crate::util::varint::{decode_u64, encode_u64};

/// A structured file writer for binary data.
pub struct StructWriter<W: StorageOutput> {
    writer: W,
    checksum: crc32fast::Hasher,
    position: u64,
}

impl<W: StorageOutput> StructWriter<W> {
    /// Create a new structured file writer.
    pub fn new(writer: W) -> Self {
        StructWriter {
            writer,
            checksum: crc32fast::Hasher::new(),
            position: 0,
        }
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.update_checksum(&[value]);
        self.position += 1;
        Ok(())
    }

    /// Write a u32 value (little-endian).
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.writer.write_u32::<LittleEndian>(value)?;
        self.update_checksum(&value.to_le_bytes());
        self.position += 4;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.update_checksum(&value.to_le_bytes());
        self.position += 8;
        Ok(())
    }

    /// Write an i64 value (little-endian).
    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.writer.write_i64::<LittleEndian>(value)?;
        self.update_checksum(&value.to_le_bytes());
        self.position += 8;
        Ok(())
    }

    /// Write a variable-length integer.
    pub fn write_varint(&mut self, value: u64) -> Result<()> {
        let encoded = encode_u64(value);
        self.writer.write_all(&encoded)?;
        self.update_checksum(&encoded);
        self.position += encoded.len() as u64;
        Ok(())
    }

    /// Write a string with length prefix.
    pub fn write_string(&mut self, value: &str) -> Result<()> {
        let bytes = value.as_bytes();
        self.write_varint(bytes.len() as u64)?;
        self.writer.write_all(bytes)?;
        self.update_checksum(bytes);
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Write raw bytes without length prefix.
    pub fn write_raw(&mut self, value: &[u8]) -> Result<()> {
        self.writer.write_all(value)?;
        self.update_checksum(value);
        self.position += value.len() as u64;
        Ok(())
    }

    /// Write a set of strings, sorted so equal sets produce equal bytes.
    pub fn write_string_set(&mut self, set: &HashSet<String>) -> Result<()> {
        let mut sorted: Vec<&String> = set.iter().collect();
        sorted.sort();

        self.write_varint(sorted.len() as u64)?;
        for value in sorted {
            self.write_string(value)?;
        }

        Ok(())
    }

    /// Write a string-to-string map, sorted by key.
    pub fn write_string_map(&mut self, map: &HashMap<String, String>) -> Result<()> {
        let mut sorted: Vec<(&String, &String)> = map.iter().collect();
        sorted.sort_by_key(|(key, _)| *key);

        self.write_varint(sorted.len() as u64)?;
        for (key, value) in sorted {
            self.write_string(key)?;
            self.write_string(value)?;
        }

        Ok(())
    }

    /// Write the footer: a marker magic followed by the accumulated
    /// checksum, then flush and sync the underlying output.
    pub fn write_footer(&mut self, footer_magic: u32) -> Result<()> {
        self.write_u32(footer_magic)?;
        let checksum = self.checksum.clone().finalize();
        self.writer.write_u32::<LittleEndian>(checksum)?;
        self.position += 4;
        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Update checksum with new data.
    fn update_checksum(&mut self, data: &[u8]) {
        self.checksum.update(data);
    }

    /// Flush and sync the writer.
    pub fn close(mut self) -> Result<()> {
        self.writer.flush_and_sync()?;
        self.writer.close()?;
        Ok(())
    }
}

/// A structured file reader for binary data.
pub struct StructReader<R: StorageInput> {
    reader: R,
    checksum: crc32fast::Hasher,
    position: u64,
    file_size: u64,
}

impl<R: StorageInput> StructReader<R> {
    /// Create a new structured file reader.
    pub fn new(reader: R) -> Result<Self> {
        let file_size = reader.size()?;
        Ok(StructReader {
            reader,
            checksum: crc32fast::Hasher::new(),
            position: 0,
            file_size,
        })
    }

    /// Read a u8 value.
    pub fn read_u8(&mut self) -> Result<u8> {
        let value = self.reader.read_u8()?;
        self.update_checksum(&[value]);
        self.position += 1;
        Ok(value)
    }

    /// Read a u32 value (little-endian).
    pub fn read_u32(&mut self) -> Result<u32> {
        let value = self.reader.read_u32::<LittleEndian>()?;
        self.update_checksum(&value.to_le_bytes());
        self.position += 4;
        Ok(value)
    }

    /// Read a u64 value (little-endian).
    pub fn read_u64(&mut self) -> Result<u64> {
        let value = self.reader.read_u64::<LittleEndian>()?;
        self.update_checksum(&value.to_le_bytes());
        self.position += 8;
        Ok(value)
    }

    /// Read an i64 value (little-endian).
    pub fn read_i64(&mut self) -> Result<i64> {
        let value = self.reader.read_i64::<LittleEndian>()?;
        self.update_checksum(&value.to_le_bytes());
        self.position += 8;
        Ok(value)
    }

    /// Read a variable-length integer.
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut bytes = Vec::new();
        loop {
            let byte = self.reader.read_u8()?;
            bytes.push(byte);
            if byte & 0x80 == 0 {
                break;
            }
        }

        let (value, _) = decode_u64(&bytes)?;
        self.update_checksum(&bytes);
        self.position += bytes.len() as u64;
        Ok(value)
    }

    /// Read a string with length prefix.
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_varint()? as usize;
        self.check_remaining(length)?;
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.update_checksum(&bytes);
        self.position += length as u64;

        String::from_utf8(bytes).map_err(|e| XystonError::corrupt(format!("Invalid UTF-8: {e}")))
    }

    /// Read exact number of raw bytes.
    pub fn read_raw(&mut self, length: usize) -> Result<Vec<u8>> {
        self.check_remaining(length)?;
        let mut bytes = vec![0u8; length];
        self.reader.read_exact(&mut bytes)?;
        self.update_checksum(&bytes);
        self.position += length as u64;
        Ok(bytes)
    }

    /// Read a set of strings.
    pub fn read_string_set(&mut self) -> Result<HashSet<String>> {
        let length = self.read_varint()? as usize;
        self.check_count(length)?;
        let mut set = HashSet::with_capacity(length);

        for _ in 0..length {
            set.insert(self.read_string()?);
        }

        Ok(set)
    }

    /// Read a string-to-string map.
    pub fn read_string_map(&mut self) -> Result<HashMap<String, String>> {
        let length = self.read_varint()? as usize;
        self.check_count(length)?;
        let mut map = HashMap::with_capacity(length);

        for _ in 0..length {
            let key = self.read_string()?;
            let value = self.read_string()?;
            map.insert(key, value);
        }

        Ok(map)
    }

    /// Verify the footer: marker magic, then the stored checksum compared
    /// against the running checksum of everything read so far.
    ///
    /// Requires the caller to have consumed the entire body; trailing
    /// unread bytes are themselves a corruption signal.
    pub fn verify_footer(&mut self, footer_magic: u32) -> Result<()> {
        if self.position + 8 != self.file_size {
            return Err(XystonError::corrupt(format!(
                "Misplaced footer: position {} in file of {} bytes",
                self.position, self.file_size
            )));
        }

        let magic = self.read_u32()?;
        if magic != footer_magic {
            return Err(XystonError::corrupt(format!(
                "Bad footer magic: expected {footer_magic:#010x}, got {magic:#010x}"
            )));
        }

        let expected = self.checksum.clone().finalize();
        let stored = self.reader.read_u32::<LittleEndian>()?;
        self.position += 4;
        if stored != expected {
            return Err(XystonError::corrupt(format!(
                "Checksum mismatch: stored {stored:#010x}, computed {expected:#010x}"
            )));
        }

        Ok(())
    }

    /// Get current file position.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get file size.
    pub fn size(&self) -> u64 {
        self.file_size
    }

    /// Update checksum with new data.
    fn update_checksum(&mut self, data: &[u8]) {
        self.checksum.update(data);
    }

    // A declared length beyond the end of the file is corruption, caught
    // before we try to allocate a buffer for it.
    fn check_remaining(&self, length: usize) -> Result<()> {
        if self.position + length as u64 > self.file_size {
            return Err(XystonError::corrupt(format!(
                "Declared length {} overruns file of {} bytes at position {}",
                length, self.file_size, self.position
            )));
        }
        Ok(())
    }

    // Element counts cost at least one byte each.
    fn check_count(&self, count: usize) -> Result<()> {
        self.check_remaining(count)
    }

    /// Close the reader.
    pub fn close(mut self) -> Result<()> {
        self.reader.close()
    }
}
