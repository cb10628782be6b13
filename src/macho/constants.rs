use num_derive::FromPrimitive;

pub const MH_MAGIC: u32 = 0xfeedface;
pub const MH_CIGAM: u32 = 0xcefaedfe;
pub const MH_MAGIC_64: u32 = 0xfeedfacf;
pub const MH_CIGAM_64: u32 = 0xcffaedfe;

pub const CPU_ARCH_ABI64: u32 = 0x01000000;
pub const CPU_ARCH_ABI64_32: u32 = 0x02000000;

pub const LC_REQ_DYLD: u32 = 0x80000000;

pub const SECTION_TYPE: u32 = 0x000000ff;
pub const SECTION_ATTRIBUTES: u32 = 0xffffff00;

// n_type is packed as N_STAB:3, N_PEXT:1, N_TYPE:3, N_EXT:1
pub const N_STAB: u8 = 0xe0;
pub const N_PEXT: u8 = 0x10;
pub const N_TYPE: u8 = 0x0e;
pub const N_EXT: u8 = 0x01;

pub const NO_SECT: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum CpuType {
    Vax = 1,
    Mc680x0 = 6,
    X86 = 7,
    X86_64 = 7 | CPU_ARCH_ABI64,
    Mips = 8,
    Mc98000 = 10,
    Hppa = 11,
    Arm = 12,
    Arm64 = 12 | CPU_ARCH_ABI64,
    Arm64_32 = 12 | CPU_ARCH_ABI64_32,
    Mc88000 = 13,
    Sparc = 14,
    I860 = 15,
    Alpha = 16,
    PowerPc = 18,
    PowerPc64 = 18 | CPU_ARCH_ABI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum FileType {
    Object = 0x1,
    Execute = 0x2,
    FvmLib = 0x3,
    Core = 0x4,
    Preload = 0x5,
    Dylib = 0x6,
    Dylinker = 0x7,
    Bundle = 0x8,
    DylibStub = 0x9,
    Dsym = 0xa,
    KextBundle = 0xb,
    Fileset = 0xc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive)]
#[repr(u32)]
pub enum HeaderFlag {
    NoUndefs = 0x1,
    IncrLink = 0x2,
    DyldLink = 0x4,
    BindAtLoad = 0x8,
    Prebound = 0x10,
    SplitSegs = 0x20,
    LazyInit = 0x40,
    TwoLevel = 0x80,
    ForceFlat = 0x100,
    NoMultiDefs = 0x200,
    NoFixPrebinding = 0x400,
    Prebindable = 0x800,
    AllModsBound = 0x1000,
    SubsectionsViaSymbols = 0x2000,
    Canonical = 0x4000,
    WeakDefines = 0x8000,
    BindsToWeak = 0x10000,
    AllowStackExecution = 0x20000,
    RootSafe = 0x40000,
    SetuidSafe = 0x80000,
    NoReexportedDylibs = 0x100000,
    Pie = 0x200000,
    DeadStrippableDylib = 0x400000,
    HasTlvDescriptors = 0x800000,
    NoHeapExecution = 0x1000000,
    AppExtensionSafe = 0x2000000,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u32)]
pub enum LoadCommandCode {
    Segment = 0x1,
    Symtab = 0x2,
    Symseg = 0x3,
    Thread = 0x4,
    UnixThread = 0x5,
    LoadFvmLib = 0x6,
    IdFvmLib = 0x7,
    Ident = 0x8,
    FvmFile = 0x9,
    Prepage = 0xa,
    Dysymtab = 0xb,
    LoadDylib = 0xc,
    IdDylib = 0xd,
    LoadDylinker = 0xe,
    IdDylinker = 0xf,
    PreboundDylib = 0x10,
    Routines = 0x11,
    SubFramework = 0x12,
    SubUmbrella = 0x13,
    SubClient = 0x14,
    SubLibrary = 0x15,
    TwoLevelHints = 0x16,
    PrebindCksum = 0x17,
    LoadWeakDylib = 0x18 | LC_REQ_DYLD,
    Segment64 = 0x19,
    Routines64 = 0x1a,
    Uuid = 0x1b,
    Rpath = 0x1c | LC_REQ_DYLD,
    CodeSignature = 0x1d,
    SegmentSplitInfo = 0x1e,
    ReexportDylib = 0x1f | LC_REQ_DYLD,
    LazyLoadDylib = 0x20,
    EncryptionInfo = 0x21,
    DyldInfo = 0x22,
    DyldInfoOnly = 0x22 | LC_REQ_DYLD,
    LoadUpwardDylib = 0x23 | LC_REQ_DYLD,
    VersionMinMacosx = 0x24,
    VersionMinIphoneos = 0x25,
    FunctionStarts = 0x26,
    DyldEnvironment = 0x27,
    Main = 0x28 | LC_REQ_DYLD,
    DataInCode = 0x29,
    SourceVersion = 0x2a,
    DylibCodeSignDrs = 0x2b,
    EncryptionInfo64 = 0x2c,
    LinkerOption = 0x2d,
    LinkerOptimizationHint = 0x2e,
    VersionMinTvos = 0x2f,
    VersionMinWatchos = 0x30,
    Note = 0x31,
    BuildVersion = 0x32,
    DyldExportsTrie = 0x33 | LC_REQ_DYLD,
    DyldChainedFixups = 0x34 | LC_REQ_DYLD,
    FilesetEntry = 0x35 | LC_REQ_DYLD,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive)]
#[repr(u32)]
pub enum SegmentFlag {
    HighVm = 0x1,
    FvmLib = 0x2,
    NoReloc = 0x4,
    ProtectedVersion1 = 0x8,
    ReadOnly = 0x10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum SectionType {
    Regular = 0x0,
    Zerofill = 0x1,
    CstringLiterals = 0x2,
    FourByteLiterals = 0x3,
    EightByteLiterals = 0x4,
    LiteralPointers = 0x5,
    NonLazySymbolPointers = 0x6,
    LazySymbolPointers = 0x7,
    SymbolStubs = 0x8,
    ModInitFuncPointers = 0x9,
    ModTermFuncPointers = 0xa,
    Coalesced = 0xb,
    GbZerofill = 0xc,
    Interposing = 0xd,
    SixteenByteLiterals = 0xe,
    DtraceDof = 0xf,
    LazyDylibSymbolPointers = 0x10,
    ThreadLocalRegular = 0x11,
    ThreadLocalZerofill = 0x12,
    ThreadLocalVariables = 0x13,
    ThreadLocalVariablePointers = 0x14,
    ThreadLocalInitFunctionPointers = 0x15,
    InitFuncOffsets = 0x16,
}

impl SectionType {
    pub fn is_zerofill(self) -> bool {
        matches!(
            self,
            SectionType::Zerofill | SectionType::GbZerofill | SectionType::ThreadLocalZerofill
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive)]
#[repr(u32)]
pub enum SectionAttribute {
    PureInstructions = 0x80000000,
    NoToc = 0x40000000,
    StripStaticSyms = 0x20000000,
    NoDeadStrip = 0x10000000,
    LiveSupport = 0x08000000,
    SelfModifyingCode = 0x04000000,
    Debug = 0x02000000,
    SomeInstructions = 0x00000400,
    ExtReloc = 0x00000200,
    LocReloc = 0x00000100,
}

/// The N_TYPE bits of a non-debugging symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum SymbolKind {
    Undefined = 0x0,
    Absolute = 0x2,
    Indirect = 0xa,
    PreboundUndefined = 0xc,
    Section = 0xe,
}

/// Debugging symbol codes, used when any N_STAB bit is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive)]
#[repr(u8)]
pub enum Stab {
    Gsym = 0x20,
    Fname = 0x22,
    Fun = 0x24,
    Stsym = 0x26,
    Lcsym = 0x28,
    Bnsym = 0x2e,
    Ast = 0x32,
    Opt = 0x3c,
    Rsym = 0x40,
    Sline = 0x44,
    Ensym = 0x4e,
    Ssym = 0x60,
    So = 0x64,
    Oso = 0x66,
    Lsym = 0x80,
    Bincl = 0x82,
    Sol = 0x84,
    Params = 0x86,
    Version = 0x88,
    Olevel = 0x8a,
    Psym = 0xa0,
    Eincl = 0xa2,
    Entry = 0xa4,
    Lbrac = 0xc0,
    Excl = 0xc2,
    Rbrac = 0xe0,
    Bcomm = 0xe2,
    Ecomm = 0xe4,
    Ecoml = 0xe8,
    Leng = 0xfe,
}
