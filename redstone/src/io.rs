//! Big-endian read and write extension traits for the primitive types of the protocol.
//!
//! The protocol inherits Java's data stream conventions: every integer is big-endian,
//! booleans are a single byte and strings are UTF-16 code units prefixed by their
//! count as a signed short.

use std::io::{self, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, BE};


/// Extension trait for reading protocol primitives.
pub trait ReadJavaExt: Read {

    #[inline]
    fn read_java_byte(&mut self) -> io::Result<i8> {
        ReadBytesExt::read_i8(self)
    }

    #[inline]
    fn read_java_ubyte(&mut self) -> io::Result<u8> {
        ReadBytesExt::read_u8(self)
    }

    #[inline]
    fn read_java_short(&mut self) -> io::Result<i16> {
        ReadBytesExt::read_i16::<BE>(self)
    }

    #[inline]
    fn read_java_ushort(&mut self) -> io::Result<u16> {
        ReadBytesExt::read_u16::<BE>(self)
    }

    #[inline]
    fn read_java_int(&mut self) -> io::Result<i32> {
        ReadBytesExt::read_i32::<BE>(self)
    }

    #[inline]
    fn read_java_float(&mut self) -> io::Result<f32> {
        ReadBytesExt::read_f32::<BE>(self)
    }

    #[inline]
    fn read_java_double(&mut self) -> io::Result<f64> {
        ReadBytesExt::read_f64::<BE>(self)
    }

    #[inline]
    fn read_java_boolean(&mut self) -> io::Result<bool> {
        Ok(self.read_java_ubyte()? != 0)
    }

    /// Read exactly `len` raw bytes, the length is usually given by a previous field.
    fn read_java_bytes(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut *self).take(len as u64).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "byte array truncated"));
        }
        Ok(buf)
    }

    /// Read a string of UTF-16 code units, longer strings than `max_len` are refused.
    fn read_java_string16(&mut self, max_len: usize) -> io::Result<String> {

        let len = self.read_java_short()?;
        if len < 0 {
            return Err(new_invalid_data_err("negative length string"));
        } else if len as usize > max_len {
            return Err(new_invalid_data_err("exceeded max string length"));
        }

        let mut units = Vec::with_capacity(len as usize);
        for _ in 0..len {
            units.push(self.read_java_ushort()?);
        }

        Ok(char::decode_utf16(units)
            .map(|res| res.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect())

    }

}

/// Extension trait for writing protocol primitives.
pub trait WriteJavaExt: Write {

    #[inline]
    fn write_java_byte(&mut self, b: i8) -> io::Result<()> {
        WriteBytesExt::write_i8(self, b)
    }

    #[inline]
    fn write_java_ubyte(&mut self, b: u8) -> io::Result<()> {
        WriteBytesExt::write_u8(self, b)
    }

    #[inline]
    fn write_java_short(&mut self, s: i16) -> io::Result<()> {
        WriteBytesExt::write_i16::<BE>(self, s)
    }

    #[inline]
    fn write_java_ushort(&mut self, s: u16) -> io::Result<()> {
        WriteBytesExt::write_u16::<BE>(self, s)
    }

    #[inline]
    fn write_java_int(&mut self, i: i32) -> io::Result<()> {
        WriteBytesExt::write_i32::<BE>(self, i)
    }

    #[inline]
    fn write_java_float(&mut self, f: f32) -> io::Result<()> {
        WriteBytesExt::write_f32::<BE>(self, f)
    }

    #[inline]
    fn write_java_double(&mut self, d: f64) -> io::Result<()> {
        WriteBytesExt::write_f64::<BE>(self, d)
    }

    #[inline]
    fn write_java_boolean(&mut self, b: bool) -> io::Result<()> {
        self.write_java_ubyte(b as u8)
    }

    fn write_java_string16(&mut self, s: &str) -> io::Result<()> {

        let len = s.encode_utf16().count();
        let len = i16::try_from(len).map_err(|_| new_invalid_data_err("string too big"))?;

        self.write_java_short(len)?;
        for unit in s.encode_utf16() {
            self.write_java_ushort(unit)?;
        }

        Ok(())

    }

}

impl<R: Read + ?Sized> ReadJavaExt for R {}
impl<W: Write + ?Sized> WriteJavaExt for W {}


/// Return an invalid data io error with specific message.
pub(crate) fn new_invalid_data_err(message: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}
