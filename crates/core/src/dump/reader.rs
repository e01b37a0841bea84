use super::DumpError;

/// A `(size, rva)` pair pointing at a blob inside the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    pub size: u32,
    pub rva: u32,
}

/// Bounds-checked little-endian view over a dump image.
///
/// Every read is validated against the buffer length; nothing here panics on
/// short input. Offsets are absolute file offsets.
#[derive(Debug, Clone, Copy)]
pub struct ByteReader<'a> {
    data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn bytes_at(&self, offset: u64, len: usize) -> Result<&'a [u8], DumpError> {
        let truncated =
            || DumpError::Truncated { offset, needed: len, available: self.data.len() };
        let start = usize::try_from(offset).map_err(|_| truncated())?;
        let end = start.checked_add(len).ok_or_else(truncated)?;
        self.data.get(start..end).ok_or_else(truncated)
    }

    /// Borrow the blob a [`Location`] points at.
    pub fn slice(&self, location: Location) -> Result<&'a [u8], DumpError> {
        self.bytes_at(u64::from(location.rva), location.size as usize)
    }

    pub fn u8_at(&self, offset: u64) -> Result<u8, DumpError> {
        Ok(self.bytes_at(offset, 1)?[0])
    }

    pub fn u16_at(&self, offset: u64) -> Result<u16, DumpError> {
        Ok(u16::from_le_bytes(self.array_at(offset)?))
    }

    pub fn u32_at(&self, offset: u64) -> Result<u32, DumpError> {
        Ok(u32::from_le_bytes(self.array_at(offset)?))
    }

    pub fn u64_at(&self, offset: u64) -> Result<u64, DumpError> {
        Ok(u64::from_le_bytes(self.array_at(offset)?))
    }

    /// Read a location descriptor (`u32 size` then `u32 rva`).
    pub fn location_at(&self, offset: u64) -> Result<Location, DumpError> {
        Ok(Location { size: self.u32_at(offset)?, rva: self.u32_at(offset + 4)? })
    }

    /// Read a length-prefixed UTF-16LE string: a `u32` byte count followed by
    /// the code units. Invalid sequences are replaced rather than rejected.
    pub fn utf16_string_at(&self, offset: u64) -> Result<String, DumpError> {
        let byte_len = self.u32_at(offset)? as usize;
        let raw = self.bytes_at(offset + 4, byte_len & !1)?;
        let units: Vec<u16> =
            raw.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]])).collect();
        Ok(String::from_utf16_lossy(&units))
    }

    fn array_at<const N: usize>(&self, offset: u64) -> Result<[u8; N], DumpError> {
        let bytes = self.bytes_at(offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_integers() {
        let data = [0x4d, 0x44, 0x4d, 0x50, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let reader = ByteReader::new(&data);
        assert_eq!(reader.u32_at(0).unwrap(), 0x504d_444d);
        assert_eq!(reader.u16_at(4).unwrap(), 0x0201);
        assert_eq!(reader.u64_at(4).unwrap(), 0x0807_0605_0403_0201);
    }

    #[test]
    fn short_reads_report_truncation() {
        let data = [0u8; 6];
        let reader = ByteReader::new(&data);
        match reader.u64_at(0) {
            Err(DumpError::Truncated { offset, needed, available }) => {
                assert_eq!((offset, needed, available), (0, 8, 6));
            }
            other => panic!("expected truncation, got {other:?}"),
        }
        assert!(reader.u32_at(u64::MAX).is_err());
    }

    #[test]
    fn utf16_strings_decode_lossily() {
        let mut data = Vec::new();
        data.extend_from_slice(&6u32.to_le_bytes());
        for unit in [0x0061u16, 0xd800, 0x0062] {
            data.extend_from_slice(&unit.to_le_bytes());
        }
        let reader = ByteReader::new(&data);
        assert_eq!(reader.utf16_string_at(0).unwrap(), "a\u{fffd}b");
    }
}
