//! A reader for the Mach-O object file format.
//!
//! Decodes an executable or library image into a read-only model of its header,
//! load commands, segments, sections, symbol table and string table, without the
//! system loader or toolchain. Both pointer widths and both byte orders are
//! supported; fat archives are not.
//!
//! # Modules
//!
//! - [`macho`] - Header, load command, segment, section and symbol decoding, and
//!   the [`MachO`] facade tying them together
//! - [`reader`] - Byte order aware primitive readers over any `Read + Seek` source
//! - [`flag_set`] - Flag words decoded into sets of named flags
//! - [`nm`] - Symbol listing in the style of `nm(1)`
//! - [`section_map`] - C source generation for entries of the `z_macho_map` section
//!
//! # Error Handling
//!
//! Every fallible operation returns [`MachoError`]. Decoding is all-or-nothing: a
//! failed parse yields no partially built model.

pub mod error;
pub mod flag_set;
pub mod macho;
pub mod nm;
pub mod reader;
pub mod section_map;

pub use error::{MachoError, Result};
pub use macho::MachO;
pub use reader::{Endian, PointerWidth};
