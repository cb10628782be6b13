pub mod constants;
pub mod header;
pub mod load_command;
#[allow(clippy::module_inception)]
pub mod macho;
pub mod section;
pub mod segment;
pub mod strtab;
pub mod symtab;

#[cfg(test)]
pub(crate) mod fixture;

pub use header::Header;
pub use load_command::LoadCommand;
pub use macho::{MachO, TEXT_SEGMENT};
pub use section::{Section, SectionFlags};
pub use segment::Segment;
pub use strtab::StringTable;
pub use symtab::{Symbol, SymbolTable, SymbolType};
