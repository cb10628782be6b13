use std::io::{Read, Seek};

use num_traits::FromPrimitive;
use tracing::trace;

use super::constants::{SectionAttribute, SectionType, SECTION_ATTRIBUTES, SECTION_TYPE};
use crate::{
    error::{MachoError, Result},
    flag_set::FlagSet,
    reader::{PointerWidth, Reader},
};

/// A section flags word: the low byte is exactly one type, the rest are attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionFlags {
    pub section_type: SectionType,
    pub attributes: FlagSet<SectionAttribute>,
}

impl SectionFlags {
    pub fn decode(raw: u32) -> Option<SectionFlags> {
        let section_type = SectionType::from_u32(raw & SECTION_TYPE)?;
        Some(SectionFlags {
            section_type,
            attributes: FlagSet::decode_masked(raw, SECTION_ATTRIBUTES),
        })
    }

    pub fn raw(&self) -> u32 {
        self.section_type as u32 | self.attributes.raw()
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub sectname: String,
    pub segname: String,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: SectionFlags,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: Option<u32>,
    /// Where this section's record starts in the file.
    pub record_offset: u64,
}

impl Section {
    pub fn parse<R>(reader: &mut Reader<R>, width: PointerWidth) -> Result<Section>
    where
        R: Read + Seek,
    {
        let record_offset = reader.position()?;
        let sectname = reader.read_name()?;
        let segname = reader.read_name()?;
        let addr = reader.read_word_as(width)?;
        let size = reader.read_word_as(width)?;
        let offset = reader.read_u32()?;
        let align = reader.read_u32()?;
        let reloff = reader.read_u32()?;
        let nreloc = reader.read_u32()?;
        let raw_flags = reader.read_u32()?;
        let flags =
            SectionFlags::decode(raw_flags).ok_or_else(|| MachoError::UnrecognizedSectionType {
                segment: segname.clone(),
                section: sectname.clone(),
                value: (raw_flags & SECTION_TYPE) as u8,
            })?;
        let reserved1 = reader.read_u32()?;
        let reserved2 = reader.read_u32()?;
        let reserved3 = match width {
            PointerWidth::Eight => Some(reader.read_u32()?),
            PointerWidth::Four => None,
        };
        reader.align_to(width.bytes())?;

        trace!(
            segment = %segname,
            section = %sectname,
            addr,
            size,
            section_type = ?flags.section_type,
            "decoded section"
        );
        Ok(Section {
            sectname,
            segname,
            addr,
            size,
            offset,
            align,
            reloff,
            nreloc,
            flags,
            reserved1,
            reserved2,
            reserved3,
            record_offset,
        })
    }

    #[inline]
    pub fn section_type(&self) -> SectionType {
        self.flags.section_type
    }

    #[inline]
    pub fn has_attribute(&self, attribute: SectionAttribute) -> bool {
        self.flags.attributes.is_set(attribute)
    }

    pub fn is_named(&self, segname: &str, sectname: &str) -> bool {
        self.segname == segname && self.sectname == sectname
    }

    pub fn contains_address(&self, address: u64) -> bool {
        address >= self.addr && address - self.addr < self.size
    }

    /// Translates an address inside this section to the file offset of its contents.
    pub fn file_offset_of(&self, address: u64) -> Option<u64> {
        if !self.contains_address(address) || self.section_type().is_zerofill() {
            return None;
        }
        Some(address - self.addr + u64::from(self.offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{Endian, Reader};
    use std::io::Cursor;

    fn record(width: PointerWidth, flags: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut name = b"__text".to_vec();
        name.resize(16, 0);
        bytes.extend_from_slice(&name);
        let mut name = b"__TEXT".to_vec();
        name.resize(16, 0);
        bytes.extend_from_slice(&name);
        let word = |bytes: &mut Vec<u8>, value: u64| match width {
            PointerWidth::Four => bytes.extend_from_slice(&(value as u32).to_le_bytes()),
            PointerWidth::Eight => bytes.extend_from_slice(&value.to_le_bytes()),
        };
        word(&mut bytes, 0x1000);
        word(&mut bytes, 0x80);
        for value in [0x400u32, 4, 0, 0, flags, 1, 2] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        if width == PointerWidth::Eight {
            bytes.extend_from_slice(&3u32.to_le_bytes());
        }
        bytes
    }

    fn parse(width: PointerWidth, flags: u32) -> Result<(Section, u64)> {
        let bytes = record(width, flags);
        let mut reader = Reader::with_layout(Cursor::new(bytes), Endian::Little, width);
        let section = Section::parse(&mut reader, width)?;
        Ok((section, reader.position()?))
    }

    #[test]
    fn regular_type_with_one_attribute() {
        let flags = SectionFlags::decode(SectionAttribute::Debug as u32).unwrap();
        assert_eq!(flags.section_type, SectionType::Regular);
        assert_eq!(
            flags.attributes.iter().collect::<Vec<_>>(),
            vec![SectionAttribute::Debug]
        );
    }

    #[test]
    fn unknown_attribute_bits_are_not_fatal() {
        let flags = SectionFlags::decode(0x0001_0001).unwrap();
        assert_eq!(flags.section_type, SectionType::Zerofill);
        assert!(flags.attributes.is_empty());
    }

    #[test]
    fn both_variants_decode() {
        let (section, end) = parse(PointerWidth::Four, 0x8000_0400).unwrap();
        assert_eq!(end, 68);
        assert_eq!(section.sectname, "__text");
        assert_eq!(section.segname, "__TEXT");
        assert_eq!((section.addr, section.size, section.offset), (0x1000, 0x80, 0x400));
        assert_eq!((section.reserved1, section.reserved2, section.reserved3), (1, 2, None));
        assert!(section.has_attribute(SectionAttribute::PureInstructions));
        assert!(section.has_attribute(SectionAttribute::SomeInstructions));

        let (section, end) = parse(PointerWidth::Eight, 0).unwrap();
        assert_eq!(end, 80);
        assert_eq!(section.reserved3, Some(3));
        assert_eq!(section.section_type(), SectionType::Regular);
    }

    #[test]
    fn unknown_section_type_is_fatal() {
        assert!(matches!(
            parse(PointerWidth::Eight, 0x0000_0042),
            Err(MachoError::UnrecognizedSectionType { value: 0x42, .. })
        ));
    }

    #[test]
    fn address_translation_stays_inside_section() {
        let (section, _) = parse(PointerWidth::Four, 0).unwrap();
        assert_eq!(section.file_offset_of(0x1010), Some(0x410));
        assert_eq!(section.file_offset_of(0x1080), None);
        assert_eq!(section.file_offset_of(0xfff), None);
    }
}
