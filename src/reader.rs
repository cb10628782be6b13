use std::{
    io::{self, Read, Seek, SeekFrom},
    ops::{Deref, DerefMut},
};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use tracing::warn;

use crate::error::{MachoError, Result};

pub const NAME_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn native() -> Endian {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    pub fn opposite(self) -> Endian {
        match self {
            Endian::Little => Endian::Big,
            Endian::Big => Endian::Little,
        }
    }
}

/// Width of addresses and sizes, which also is the load command alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    Four,
    Eight,
}

impl PointerWidth {
    #[inline]
    pub fn bytes(self) -> u64 {
        match self {
            PointerWidth::Four => 4,
            PointerWidth::Eight => 8,
        }
    }
}

#[inline]
pub fn align_up(value: u64, align: u64) -> u64 {
    match value % align {
        0 => value,
        rem => value + (align - rem),
    }
}

fn truncated(err: io::Error, offset: u64, wanted: usize) -> MachoError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        MachoError::TruncatedRead { offset, wanted }
    } else {
        MachoError::Io(err)
    }
}

macro_rules! read_int {
    ($($name:ident -> $type:ty),* $(,)?) => {$(
        pub fn $name(&mut self) -> Result<$type> {
            let offset = self.position()?;
            let value = match self.endian {
                Endian::Little => self.inner.$name::<LittleEndian>(),
                Endian::Big => self.inner.$name::<BigEndian>(),
            };
            value.map_err(|err| truncated(err, offset, std::mem::size_of::<$type>()))
        }
    )*};
}

/// Seek-and-read access to a Mach-O image in a runtime-selected byte order.
pub struct Reader<R> {
    inner: R,
    endian: Endian,
    width: PointerWidth,
}

impl<R> Reader<R>
where
    R: Read + Seek,
{
    /// Until the magic number is decoded nothing is known, so native order is assumed.
    pub fn new(inner: R) -> Reader<R> {
        Reader {
            inner,
            endian: Endian::native(),
            width: PointerWidth::Four,
        }
    }

    pub fn with_layout(inner: R, endian: Endian, width: PointerWidth) -> Reader<R> {
        Reader {
            inner,
            endian,
            width,
        }
    }

    pub fn set_layout(&mut self, endian: Endian, width: PointerWidth) {
        self.endian = endian;
        self.width = width;
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn width(&self) -> PointerWidth {
        self.width
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn position(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Pads the cursor up to the next multiple of `align`, returning the new position.
    pub fn align_to(&mut self, align: u64) -> Result<u64> {
        let position = self.position()?;
        let aligned = align_up(position, align);
        if aligned != position {
            self.seek_to(aligned)?;
        }
        Ok(aligned)
    }

    /// Moves the cursor to `offset` until the returned guard is dropped.
    pub fn scoped(&mut self, offset: u64) -> Result<ScopedCursor<'_, R>> {
        let origin = self.position()?;
        self.seek_to(offset)?;
        Ok(ScopedCursor {
            reader: self,
            origin,
        })
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let offset = self.position()?;
        self.inner
            .read_u8()
            .map_err(|err| truncated(err, offset, 1))
    }

    read_int! {
        read_u16 -> u16,
        read_u32 -> u32,
        read_u64 -> u64,
    }

    /// Reads an address or size field, widened to 64 bits.
    pub fn read_word(&mut self) -> Result<u64> {
        self.read_word_as(self.width)
    }

    /// Like [`Reader::read_word`], for records whose width is not the file's own.
    pub fn read_word_as(&mut self, width: PointerWidth) -> Result<u64> {
        match width {
            PointerWidth::Four => self.read_u32().map(u64::from),
            PointerWidth::Eight => self.read_u64(),
        }
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let offset = self.position()?;
        let mut bytes = vec![0; len];
        self.inner
            .read_exact(&mut bytes)
            .map_err(|err| truncated(err, offset, len))?;
        Ok(bytes)
    }

    /// Reads a fixed 16 byte name field, which is only NUL terminated when shorter.
    pub fn read_name(&mut self) -> Result<String> {
        let offset = self.position()?;
        let bytes = self.read_bytes(NAME_SIZE)?;
        let name = bytes.split(|byte| *byte == 0).next().unwrap_or(&[]);
        String::from_utf8(name.to_vec()).map_err(|_| MachoError::InvalidEncoding { offset })
    }

    /// Reads a NUL terminated string at the cursor, one byte at a time.
    pub fn read_cstr(&mut self) -> Result<String> {
        let offset = self.position()?;
        let mut bytes = Vec::new();
        loop {
            match self.inner.read_u8() {
                Ok(0) => break,
                Ok(byte) => bytes.push(byte),
                Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                    return Err(MachoError::TruncatedString { offset });
                }
                Err(err) => return Err(err.into()),
            }
        }
        String::from_utf8(bytes).map_err(|_| MachoError::InvalidEncoding { offset })
    }

    /// Reads a NUL terminated string at `offset` without moving the cursor.
    pub fn read_cstr_at(&mut self, offset: u64) -> Result<String> {
        self.scoped(offset)?.read_cstr()
    }
}

/// A borrowed [`Reader`] positioned elsewhere; dropping it seeks back to where it was.
pub struct ScopedCursor<'a, R>
where
    R: Read + Seek,
{
    reader: &'a mut Reader<R>,
    origin: u64,
}

impl<'a, R> Deref for ScopedCursor<'a, R>
where
    R: Read + Seek,
{
    type Target = Reader<R>;

    fn deref(&self) -> &Self::Target {
        self.reader
    }
}

impl<'a, R> DerefMut for ScopedCursor<'a, R>
where
    R: Read + Seek,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.reader
    }
}

impl<'a, R> Drop for ScopedCursor<'a, R>
where
    R: Read + Seek,
{
    fn drop(&mut self) {
        if let Err(err) = self.reader.seek_to(self.origin) {
            warn!(origin = self.origin, %err, "failed to restore reader position");
        }
    }
}
