//! Synthetic Mach-O images for tests.

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};

use super::constants::{LoadCommandCode, MH_MAGIC, MH_MAGIC_64};
use crate::reader::{align_up, Endian, PointerWidth, NAME_SIZE};

pub struct SectionSpec {
    pub sectname: &'static str,
    pub segname: &'static str,
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub flags: u32,
}

impl SectionSpec {
    pub fn new(segname: &'static str, sectname: &'static str, addr: u64, size: u64) -> Self {
        SectionSpec {
            sectname,
            segname,
            addr,
            size,
            offset: 0,
            flags: 0,
        }
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }
}

#[derive(Clone)]
pub struct SymbolSpec {
    pub name: &'static str,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub value: u64,
}

impl SymbolSpec {
    pub fn new(name: &'static str, n_type: u8, n_sect: u8, value: u64) -> Self {
        SymbolSpec {
            name,
            n_type,
            n_sect,
            n_desc: 0,
            value,
        }
    }

    pub fn desc(mut self, n_desc: u16) -> Self {
        self.n_desc = n_desc;
        self
    }
}

struct Writer {
    endian: Endian,
    width: PointerWidth,
    bytes: Vec<u8>,
}

impl Writer {
    fn new(endian: Endian, width: PointerWidth) -> Writer {
        Writer {
            endian,
            width,
            bytes: Vec::new(),
        }
    }

    fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    fn u16(&mut self, value: u16) {
        match self.endian {
            Endian::Little => self.bytes.write_u16::<LittleEndian>(value),
            Endian::Big => self.bytes.write_u16::<BigEndian>(value),
        }
        .unwrap();
    }

    fn u32(&mut self, value: u32) {
        match self.endian {
            Endian::Little => self.bytes.write_u32::<LittleEndian>(value),
            Endian::Big => self.bytes.write_u32::<BigEndian>(value),
        }
        .unwrap();
    }

    fn u64(&mut self, value: u64) {
        match self.endian {
            Endian::Little => self.bytes.write_u64::<LittleEndian>(value),
            Endian::Big => self.bytes.write_u64::<BigEndian>(value),
        }
        .unwrap();
    }

    fn word(&mut self, value: u64) {
        match self.width {
            PointerWidth::Four => self.u32(value as u32),
            PointerWidth::Eight => self.u64(value),
        }
    }

    fn name(&mut self, name: &str) {
        let mut field = name.as_bytes().to_vec();
        field.resize(NAME_SIZE, 0);
        self.bytes.extend_from_slice(&field);
    }

    fn pad_to(&mut self, len: u64) {
        self.bytes.resize(len as usize, 0);
    }
}

pub struct Fixture {
    endian: Endian,
    width: PointerWidth,
    cpu_type: u32,
    file_type: u32,
    flags: u32,
    commands: Vec<Vec<u8>>,
    symbols: Option<Vec<SymbolSpec>>,
    payload: Vec<u8>,
}

impl Fixture {
    pub fn new(endian: Endian, width: PointerWidth) -> Fixture {
        Fixture {
            endian,
            width,
            cpu_type: 0x0100_0007,
            file_type: 0x2,
            flags: 0,
            commands: Vec::new(),
            symbols: None,
            payload: Vec::new(),
        }
    }

    pub fn cpu_type(mut self, cpu_type: u32) -> Self {
        self.cpu_type = cpu_type;
        self
    }

    pub fn header_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    fn writer(&self) -> Writer {
        Writer::new(self.endian, self.width)
    }

    pub fn segment(
        mut self,
        name: &str,
        vmaddr: u64,
        vmsize: u64,
        fileoff: u64,
        sections: &[SectionSpec],
    ) -> Self {
        let (cmd, header, section) = match self.width {
            PointerWidth::Four => (LoadCommandCode::Segment as u32, 56, 68),
            PointerWidth::Eight => (LoadCommandCode::Segment64 as u32, 72, 80),
        };
        let mut w = self.writer();
        w.u32(cmd);
        w.u32(header + section * sections.len() as u32);
        w.name(name);
        w.word(vmaddr);
        w.word(vmsize);
        w.word(fileoff);
        w.word(vmsize);
        w.u32(7);
        w.u32(5);
        w.u32(sections.len() as u32);
        w.u32(0);
        for spec in sections {
            w.name(spec.sectname);
            w.name(spec.segname);
            w.word(spec.addr);
            w.word(spec.size);
            w.u32(spec.offset);
            w.u32(0);
            w.u32(0);
            w.u32(0);
            w.u32(spec.flags);
            w.u32(0);
            w.u32(0);
            if self.width == PointerWidth::Eight {
                w.u32(0);
            }
        }
        self.commands.push(w.bytes);
        self
    }

    /// Adds a command whose `cmdsize` covers exactly the 8 byte header and `payload`.
    pub fn command(mut self, cmd: u32, payload: &[u8]) -> Self {
        let mut w = self.writer();
        w.u32(cmd);
        w.u32(8 + payload.len() as u32);
        w.bytes.extend_from_slice(payload);
        self.commands.push(w.bytes);
        self
    }

    /// Adds a command with an arbitrary `cmdsize` field followed by `len` zero bytes.
    pub fn raw_command(mut self, cmd: u32, cmdsize: u32, len: usize) -> Self {
        let mut w = self.writer();
        w.u32(cmd);
        w.u32(cmdsize);
        w.bytes.resize(8 + len, 0);
        self.commands.push(w.bytes);
        self
    }

    pub fn symbols(mut self, symbols: Vec<SymbolSpec>) -> Self {
        self.symbols = Some(symbols);
        self
    }

    pub fn payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn header_size(&self) -> u64 {
        match self.width {
            PointerWidth::Four => 28,
            PointerWidth::Eight => 32,
        }
    }

    fn symbol_size(&self) -> u64 {
        match self.width {
            PointerWidth::Four => 12,
            PointerWidth::Eight => 16,
        }
    }

    fn string_pool(&self) -> (Vec<u8>, Vec<u32>) {
        let mut pool = vec![0u8];
        let mut indices = Vec::new();
        for symbol in self.symbols.iter().flatten() {
            if symbol.name.is_empty() {
                indices.push(0);
            } else {
                indices.push(pool.len() as u32);
                pool.extend_from_slice(symbol.name.as_bytes());
                pool.push(0);
            }
        }
        (pool, indices)
    }

    /// Lays out all commands but the symbol table command.
    fn plain_commands(&self) -> Vec<u8> {
        let mut block = Vec::new();
        for command in &self.commands {
            block.resize(align_up(block.len() as u64, self.width.bytes()) as usize, 0);
            block.extend_from_slice(command);
        }
        block
    }

    fn commands_size(&self) -> u64 {
        let block = self.plain_commands().len() as u64;
        match self.symbols {
            Some(_) if !self.commands.is_empty() => align_up(block, self.width.bytes()) + 24,
            Some(_) => 24,
            None => block,
        }
    }

    pub fn symtab_offset(&self) -> u64 {
        align_up(self.header_size() + self.commands_size(), 8)
    }

    pub fn strtab_offset(&self) -> u64 {
        let nsyms = self.symbols.as_ref().map_or(0, Vec::len) as u64;
        self.symtab_offset() + nsyms * self.symbol_size()
    }

    pub fn payload_offset(&self) -> u64 {
        let (pool, _) = self.string_pool();
        align_up(self.strtab_offset() + pool.len() as u64, 8)
    }

    pub fn ncmds(&self) -> u32 {
        self.commands.len() as u32 + u32::from(self.symbols.is_some())
    }

    pub fn build(&self) -> Vec<u8> {
        let (pool, indices) = self.string_pool();
        let mut block = self.plain_commands();
        if let Some(symbols) = &self.symbols {
            block.resize(align_up(block.len() as u64, self.width.bytes()) as usize, 0);
            let mut w = self.writer();
            w.u32(LoadCommandCode::Symtab as u32);
            w.u32(24);
            w.u32(self.symtab_offset() as u32);
            w.u32(symbols.len() as u32);
            w.u32(self.strtab_offset() as u32);
            w.u32(pool.len() as u32);
            block.extend_from_slice(&w.bytes);
        }

        let mut w = self.writer();
        w.u32(match self.width {
            PointerWidth::Four => MH_MAGIC,
            PointerWidth::Eight => MH_MAGIC_64,
        });
        w.u32(self.cpu_type);
        w.u32(3);
        w.u32(self.file_type);
        w.u32(self.ncmds());
        w.u32(block.len() as u32);
        w.u32(self.flags);
        if self.width == PointerWidth::Eight {
            w.u32(0);
        }
        w.bytes.extend_from_slice(&block);

        if let Some(symbols) = &self.symbols {
            w.pad_to(self.symtab_offset());
            for (symbol, strx) in symbols.iter().zip(&indices) {
                w.u32(*strx);
                w.u8(symbol.n_type);
                w.u8(symbol.n_sect);
                w.u16(symbol.n_desc);
                w.word(symbol.value);
            }
            w.bytes.extend_from_slice(&pool);
        }
        if !self.payload.is_empty() {
            w.pad_to(self.payload_offset());
            w.bytes.extend_from_slice(&self.payload);
        }
        w.bytes
    }
}
