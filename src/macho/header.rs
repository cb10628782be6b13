use std::io::{Read, Seek};

use num_traits::FromPrimitive;
use tracing::debug;

use super::constants::{
    CpuType, FileType, HeaderFlag, MH_CIGAM, MH_CIGAM_64, MH_MAGIC, MH_MAGIC_64,
};
use crate::{
    error::{MachoError, Result},
    flag_set::FlagSet,
    reader::{Endian, PointerWidth, Reader},
};

#[derive(Debug, Clone)]
pub struct Header {
    pub magic: u32,
    pub cpu_type: u32,
    pub cpu_subtype: u32,
    pub file_type: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: FlagSet<HeaderFlag>,
    pub reserved: Option<u32>,
    endian: Endian,
    width: PointerWidth,
}

impl Header {
    /// Decodes the header at the reader's position and switches the reader to the
    /// byte order and pointer width announced by the magic number.
    pub fn parse<R>(reader: &mut Reader<R>) -> Result<Header>
    where
        R: Read + Seek,
    {
        reader.set_layout(Endian::native(), PointerWidth::Four);
        let magic = reader.read_u32()?;
        let (endian, width) = match magic {
            MH_MAGIC => (Endian::native(), PointerWidth::Four),
            MH_MAGIC_64 => (Endian::native(), PointerWidth::Eight),
            MH_CIGAM => (Endian::native().opposite(), PointerWidth::Four),
            MH_CIGAM_64 => (Endian::native().opposite(), PointerWidth::Eight),
            _ => return Err(MachoError::UnrecognizedFormat { magic }),
        };
        reader.set_layout(endian, width);

        let header = Header {
            magic,
            cpu_type: reader.read_u32()?,
            cpu_subtype: reader.read_u32()?,
            file_type: reader.read_u32()?,
            ncmds: reader.read_u32()?,
            sizeofcmds: reader.read_u32()?,
            flags: FlagSet::decode(reader.read_u32()?),
            reserved: match width {
                PointerWidth::Eight => Some(reader.read_u32()?),
                PointerWidth::Four => None,
            },
            endian,
            width,
        };
        debug!(
            ?endian,
            bits = width.bytes() * 8,
            cpu_type = header.cpu_type,
            file_type = header.file_type,
            ncmds = header.ncmds,
            sizeofcmds = header.sizeofcmds,
            "decoded mach header"
        );
        Ok(header)
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn width(&self) -> PointerWidth {
        self.width
    }

    #[inline]
    pub fn is_64bit(&self) -> bool {
        self.width == PointerWidth::Eight
    }

    /// Every load command starts on this boundary.
    #[inline]
    pub fn alignment(&self) -> u64 {
        self.width.bytes()
    }

    pub fn size(&self) -> u64 {
        match self.width {
            PointerWidth::Four => 28,
            PointerWidth::Eight => 32,
        }
    }

    pub fn cpu_type(&self) -> Option<CpuType> {
        CpuType::from_u32(self.cpu_type)
    }

    pub fn require_cpu_type(&self) -> Result<CpuType> {
        self.cpu_type().ok_or(MachoError::UnsupportedVariant {
            field: "cpu type",
            value: self.cpu_type,
        })
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_u32(self.file_type)
    }

    pub fn require_file_type(&self) -> Result<FileType> {
        self.file_type().ok_or(MachoError::UnsupportedVariant {
            field: "file type",
            value: self.file_type,
        })
    }
}
