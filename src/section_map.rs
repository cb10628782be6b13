//! Regions for data that outgrows Mach-O's 16 byte section names.
//!
//! Code that wants many same named blobs merged into one region records each blob
//! as a `(name pointer, address, size)` triple in the [`MARKER_SECTION`] section.
//! This module reads those triples back out of a linked image and generates C
//! that reserves one contiguous, zeroed region per name along with accessors
//! looking the region up by name at run time.

use std::{
    collections::BTreeMap,
    io::{Read, Seek, Write},
};

use tracing::{debug, trace};

use crate::{
    error::{MachoError, Result},
    macho::{MachO, Section},
};

/// Section holding one triple per recorded blob.
pub const MARKER_SECTION: &str = "z_macho_map";

/// Pointer authentication bits set in the recorded pointers on arm64e.
pub const POINTER_AUTH_MASK: u64 = (1 << 53) | (1 << 52);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub name: String,
    pub address: u64,
    pub size: u64,
}

fn marker_section<'a>(macho: &'a MachO, index: Option<u8>) -> Result<Option<&'a Section>> {
    let section = match index {
        Some(index) => macho.section(index)?,
        None => return Ok(None),
    };
    Ok(Some(section).filter(|section| section.sectname == MARKER_SECTION))
}

/// Reads the triple of every symbol defined in the marker section.
///
/// `source` must hold the same bytes `macho` was parsed from. Names are looked up
/// in the `__TEXT` segment, which is only required once a marker symbol is found.
pub fn recover_entries<R>(macho: &MachO, source: R) -> Result<Vec<MapEntry>>
where
    R: Read + Seek,
{
    let mut reader = macho.reader(source);
    let mut entries = Vec::new();
    for symbol in macho.symbol_table() {
        let Some(section) = marker_section(macho, symbol.section_index())? else {
            continue;
        };
        let offset = section.file_offset_of(symbol.value).ok_or_else(|| {
            MachoError::AddressOutOfSegment {
                address: symbol.value,
                segment: section.segname.clone(),
            }
        })?;
        let text = macho.text_segment()?;

        reader.seek_to(offset)?;
        let name_pointer = reader.read_word()? & !POINTER_AUTH_MASK;
        let address = reader.read_word()? & !POINTER_AUTH_MASK;
        let size = reader.read_word()?;
        let name = text.read_cstr(&mut reader, name_pointer)?;
        trace!(%name, address, size, offset, "recovered map entry");
        entries.push(MapEntry {
            name,
            address,
            size,
        });
    }
    debug!(entries = entries.len(), "scanned {}", MARKER_SECTION);
    Ok(entries)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub count: u64,
    pub size: u64,
}

impl Region {
    /// Bytes reserved for the whole region, `None` if that does not fit in 64 bits.
    pub fn total(&self) -> Option<u64> {
        self.count.checked_mul(self.size)
    }

    fn checked_total(&self, name: &str) -> Result<u64> {
        self.total().ok_or_else(|| MachoError::RegionOverflow {
            name: name.to_owned(),
            count: self.count,
            size: self.size,
        })
    }
}

/// Entries grouped by name, in name order.
#[derive(Debug, Default)]
pub struct SectionMap {
    regions: BTreeMap<String, Region>,
}

impl SectionMap {
    /// Groups entries by name. Every entry of one name must report the same size, and
    /// each region's total size must fit in 64 bits.
    pub fn from_entries<'a, I>(entries: I) -> Result<SectionMap>
    where
        I: IntoIterator<Item = &'a MapEntry>,
    {
        let mut regions: BTreeMap<String, Region> = BTreeMap::new();
        for entry in entries {
            match regions.get_mut(&entry.name) {
                Some(region) if region.size != entry.size => {
                    return Err(MachoError::InconsistentEntrySize {
                        name: entry.name.clone(),
                        first: region.size,
                        second: entry.size,
                    });
                }
                Some(region) => {
                    region.count += 1;
                    region.checked_total(&entry.name)?;
                }
                None => {
                    regions.insert(
                        entry.name.clone(),
                        Region {
                            count: 1,
                            size: entry.size,
                        },
                    );
                }
            }
        }
        Ok(SectionMap { regions })
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn region(&self, name: &str) -> Option<Region> {
        self.regions.get(name).copied()
    }

    pub fn regions(&self) -> impl Iterator<Item = (&str, Region)> + '_ {
        self.regions
            .iter()
            .map(|(name, region)| (name.as_str(), *region))
    }

    /// Emits the region reservations and the `get_list_start`, `get_list_end` and
    /// `get_list_offset` accessors.
    pub fn write_c<W: Write>(&self, out: &mut W) -> Result<()> {
        for (name, region) in self.regions() {
            writeln!(out, "__attribute__((used,aligned(16)))")?;
            let total = region.checked_total(name)?;
            writeln!(out, "uint8_t _{}_list_start[{}] = {{0}};", name, total)?;
            writeln!(out, "uint8_t _{}_list_end[0] = {{}};", name)?;
        }
        for (name, _) in self.regions() {
            writeln!(out, "__attribute__((used))")?;
            writeln!(out, "static size_t _{}_list_offset[1];", name)?;
        }
        writeln!(out)?;

        self.write_getter(out, "uint8_t", "list_start")?;
        self.write_getter(out, "uint8_t", "list_end")?;
        self.write_getter(out, "size_t", "list_offset")
    }

    fn write_getter<W: Write>(&self, out: &mut W, ty: &str, suffix: &str) -> Result<()> {
        writeln!(out, "static {} *get_{}(const char *section_name)", ty, suffix)?;
        writeln!(out, "{{")?;
        writeln!(out, "\tif (false) {{")?;
        for (name, _) in self.regions() {
            writeln!(out, "\t\t}} else if (0 == strcmp(\"{}\", section_name)) {{", name)?;
            writeln!(out, "\t\t\treturn _{}_{};", name, suffix)?;
        }
        writeln!(out, "\t}}")?;
        writeln!(out, "\treturn NULL;")?;
        writeln!(out, "}}")?;
        writeln!(out)?;
        Ok(())
    }
}
