use byteorder::{BigEndian, ByteOrder};

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum CursorError {
    OutOfRange { position: usize, length: usize },
}

/// Position-tracking reader over an in-memory byte buffer. All multi-byte
/// reads are big-endian. `mark`/`reset` is a single slot, overwritten by
/// each `mark`.
pub struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
    mark: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Cursor<'a> {
        Cursor{ data, position: 0, mark: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn at_end(&self) -> bool {
        self.position >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CursorError> {
        if len > self.data.len() - self.position {
            return Err(CursorError::OutOfRange{ position: self.position, length: len });
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CursorError> {
        self.take(len)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), CursorError> {
        self.take(len)?;
        Ok(())
    }

    pub fn seek(&mut self, position: usize) -> Result<(), CursorError> {
        if position > self.data.len() {
            return Err(CursorError::OutOfRange{ position, length: 0 });
        }
        self.position = position;
        Ok(())
    }

    pub fn mark(&mut self) {
        self.mark = self.position;
    }

    pub fn reset(&mut self) {
        self.position = self.mark;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_values() {
        let data = [ 0x12, 0x34, 0x56, 0x78, 0x9a ];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 0x12);
        assert_eq!(cursor.read_u16().unwrap(), 0x3456);
        assert_eq!(cursor.remaining(), 2);
        assert!(cursor.read_u32().is_err());
        // a failed read must not move the cursor
        assert_eq!(cursor.position(), 3);
        assert_eq!(cursor.read_u16().unwrap(), 0x789a);
        assert!(cursor.at_end());
    }

    #[test]
    fn read_past_end_reports_out_of_range() {
        let data = [ 1, 2 ];
        let mut cursor = Cursor::new(&data);
        cursor.skip(1).unwrap();
        assert_eq!(
            cursor.read_u32(),
            Err(CursorError::OutOfRange{ position: 1, length: 4 })
        );
    }

    #[test]
    fn seek_and_read_bytes() {
        let data = [ 0, 1, 2, 3, 4, 5 ];
        let mut cursor = Cursor::new(&data);
        cursor.seek(4).unwrap();
        assert_eq!(cursor.read_bytes(2).unwrap(), &[ 4, 5 ]);
        assert!(cursor.seek(7).is_err());
        // seeking to the exact end is allowed, reading there is not
        cursor.seek(6).unwrap();
        assert!(cursor.read_u8().is_err());
    }

    #[test]
    fn mark_is_a_single_slot() {
        let data = [ 0, 1, 2, 3, 4, 5 ];
        let mut cursor = Cursor::new(&data);
        cursor.seek(2).unwrap();
        cursor.mark();
        cursor.seek(4).unwrap();
        cursor.mark();
        cursor.seek(0).unwrap();
        cursor.reset();
        assert_eq!(cursor.position(), 4);
    }
}
