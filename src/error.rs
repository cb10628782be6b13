/// Error type for Mach-O decoding and the lookups made on a decoded file
#[derive(Debug, thiserror::Error)]
pub enum MachoError {
    #[error("not a Mach-O file (magic {magic:#010x})")]
    UnrecognizedFormat { magic: u32 },

    #[error("unsupported {field} {value:#x}")]
    UnsupportedVariant { field: &'static str, value: u32 },

    #[error("truncated read of {wanted} bytes at offset {offset:#x}")]
    TruncatedRead { offset: u64, wanted: usize },

    #[error("load command at {offset:#x} announces {announced} bytes but spans {consumed}")]
    MisalignedRecord {
        offset: u64,
        announced: u32,
        consumed: u64,
    },

    #[error("load commands span {actual} bytes, header announces {expected}")]
    CommandBlockMismatch { expected: u32, actual: u64 },

    #[error("section {segment},{section} has unrecognized type {value:#04x}")]
    UnrecognizedSectionType {
        segment: String,
        section: String,
        value: u8,
    },

    #[error("symbol at offset {offset:#x} has unrecognized type {value:#04x}")]
    UnrecognizedSymbolType { offset: u64, value: u8 },

    #[error("duplicate symbols at value {value:#x} disagree (n_desc {first:#06x} vs {second:#06x})")]
    DuplicateSymbolMismatch { value: u64, first: u16, second: u16 },

    #[error("{0} segment is missing")]
    MissingRequiredSegment(&'static str),

    #[error("address {address:#x} lies outside segment {segment}")]
    AddressOutOfSegment { address: u64, segment: String },

    #[error("section index {index} is out of range")]
    SectionIndexOutOfRange { index: u8 },

    #[error("invalid UTF-8 string at offset {offset:#x}")]
    InvalidEncoding { offset: u64 },

    #[error("unterminated string at offset {offset:#x}")]
    TruncatedString { offset: u64 },

    #[error("entries named {name} disagree on size ({first} vs {second})")]
    InconsistentEntrySize { name: String, first: u64, second: u64 },

    #[error("{count} entries named {name} of {size} bytes overflow a 64-bit region")]
    RegionOverflow { name: String, count: u64, size: u64 },

    #[error("no {0} load command")]
    MissingLoadCommand(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, MachoError>;
