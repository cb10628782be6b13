use std::io::{Read, Seek};

use tracing::trace;

use super::{constants::SegmentFlag, section::Section};
use crate::{
    error::{MachoError, Result},
    flag_set::FlagSet,
    reader::{PointerWidth, Reader},
};

#[derive(Debug, Clone)]
pub struct Segment {
    pub segname: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub flags: FlagSet<SegmentFlag>,
    sections: Vec<Section>,
}

impl Segment {
    /// Decodes a segment command body, the `cmd` and `cmdsize` words having been consumed.
    pub fn parse<R>(reader: &mut Reader<R>, width: PointerWidth) -> Result<Segment>
    where
        R: Read + Seek,
    {
        let segname = reader.read_name()?;
        let vmaddr = reader.read_word_as(width)?;
        let vmsize = reader.read_word_as(width)?;
        let fileoff = reader.read_word_as(width)?;
        let filesize = reader.read_word_as(width)?;
        let maxprot = reader.read_u32()?;
        let initprot = reader.read_u32()?;
        let nsects = reader.read_u32()?;
        let flags = FlagSet::decode(reader.read_u32()?);

        let sections = (0..nsects)
            .map(|_| Section::parse(&mut *reader, width))
            .collect::<Result<Vec<_>>>()?;
        reader.align_to(width.bytes())?;

        trace!(segment = %segname, vmaddr, vmsize, nsects, "decoded segment");
        Ok(Segment {
            segname,
            vmaddr,
            vmsize,
            fileoff,
            filesize,
            maxprot,
            initprot,
            flags,
            sections,
        })
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn nsects(&self) -> usize {
        self.sections.len()
    }

    pub fn section(&self, sectname: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|section| section.sectname == sectname)
    }

    pub fn section_at_record(&self, record_offset: u64) -> Option<&Section> {
        self.sections
            .iter()
            .find(|section| section.record_offset == record_offset)
    }

    pub fn contains_address(&self, address: u64) -> bool {
        address >= self.vmaddr && address - self.vmaddr < self.vmsize
    }

    /// Maps a virtual address inside this segment back to its file offset.
    ///
    /// Only meaningful for data the segment actually maps, so addresses outside of
    /// `vmaddr..vmaddr + vmsize` are rejected rather than extrapolated.
    pub fn file_offset_of(&self, address: u64) -> Result<u64> {
        if !self.contains_address(address) {
            return Err(MachoError::AddressOutOfSegment {
                address,
                segment: self.segname.clone(),
            });
        }
        Ok(address - self.vmaddr + self.fileoff)
    }

    /// Reads the NUL terminated string stored at a virtual address of this segment.
    pub fn read_cstr<R>(&self, reader: &mut Reader<R>, address: u64) -> Result<String>
    where
        R: Read + Seek,
    {
        let offset = self.file_offset_of(address)?;
        reader.read_cstr_at(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::macho::fixture::{Fixture, SectionSpec};
    use crate::reader::Endian;
    use std::io::Cursor;

    fn decode(endian: Endian, width: PointerWidth, sections: &[SectionSpec]) -> (Segment, u64) {
        let fixture =
            Fixture::new(endian, width).segment("__DATA", 0x4000, 0x2000, 0x1000, sections);
        let bytes = fixture.build();
        let mut reader = Reader::with_layout(Cursor::new(bytes), endian, width);
        // skip the header and the cmd/cmdsize words
        reader.seek_to(fixture.header_size() + 8).unwrap();
        let segment = Segment::parse(&mut reader, width).unwrap();
        let end = reader.position().unwrap() - fixture.header_size();
        (segment, end)
    }

    #[test]
    fn sections_follow_in_file_order() {
        let sections = [
            SectionSpec::new("__DATA", "__data", 0x4000, 0x100),
            SectionSpec::new("__DATA", "__bss", 0x4100, 0x80).flags(0x1),
        ];
        for width in [PointerWidth::Four, PointerWidth::Eight] {
            let (segment, end) = decode(Endian::Big, width, &sections);
            assert_eq!(segment.segname, "__DATA");
            assert_eq!(
                (segment.vmaddr, segment.vmsize, segment.fileoff),
                (0x4000, 0x2000, 0x1000)
            );
            assert_eq!(segment.nsects(), 2);
            assert_eq!(segment.sections()[0].sectname, "__data");
            assert_eq!(segment.sections()[1].sectname, "__bss");
            assert!(segment.sections()[1].section_type().is_zerofill());
            let expected = match width {
                PointerWidth::Four => 56 + 2 * 68,
                PointerWidth::Eight => 72 + 2 * 80,
            };
            assert_eq!(end, expected);
            let second = segment.sections()[1].record_offset;
            assert_eq!(segment.section_at_record(second).unwrap().sectname, "__bss");
        }
    }

    #[test]
    fn virtual_addresses_map_into_the_file() {
        let (segment, _) = decode(Endian::Little, PointerWidth::Eight, &[]);
        assert_eq!(segment.file_offset_of(0x4010).unwrap(), 0x1010);
        assert!(matches!(
            segment.file_offset_of(0x6000),
            Err(MachoError::AddressOutOfSegment { address: 0x6000, .. })
        ));
        assert!(segment.file_offset_of(0x3fff).is_err());
    }
}
