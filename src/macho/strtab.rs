use std::{borrow::Cow, collections::HashMap, io::Cursor};

use once_cell::sync::OnceCell;

use crate::{
    error::{MachoError, Result},
    reader::Reader,
};

/// Symbol names keyed by absolute file offset, decoded the first time they are asked for.
#[derive(Debug)]
pub struct StringTable {
    base: u64,
    pool: Vec<u8>,
    names: HashMap<u64, OnceCell<String>>,
}

impl StringTable {
    /// `pool` holds the bytes found at file offset `base`; `pending` are the offsets
    /// symbols refer to.
    pub fn new<I>(base: u64, pool: Vec<u8>, pending: I) -> StringTable
    where
        I: IntoIterator<Item = u64>,
    {
        StringTable {
            base,
            pool,
            names: pending
                .into_iter()
                .map(|offset| (offset, OnceCell::new()))
                .collect(),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> usize {
        self.pool.len()
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.names.contains_key(&offset)
    }

    pub fn is_resolved(&self, offset: u64) -> bool {
        self.names
            .get(&offset)
            .map_or(false, |name| name.get().is_some())
    }

    /// Resolves the name at `offset`. Offsets referenced by a symbol are decoded once
    /// and cached; any other offset is decoded on every call.
    pub fn resolve(&self, offset: u64) -> Result<Cow<'_, str>> {
        match self.names.get(&offset) {
            Some(name) => name
                .get_or_try_init(|| self.read(offset))
                .map(|name| Cow::Borrowed(name.as_str())),
            None => self.read(offset).map(Cow::Owned),
        }
    }

    /// Names resolved so far, in no particular order.
    pub fn resolved(&self) -> impl Iterator<Item = (u64, &str)> + '_ {
        self.names
            .iter()
            .filter_map(|(offset, name)| name.get().map(|name| (*offset, name.as_str())))
    }

    fn read(&self, offset: u64) -> Result<String> {
        let relative = offset
            .checked_sub(self.base)
            .ok_or(MachoError::TruncatedString { offset })?;
        let mut reader = Reader::new(Cursor::new(self.pool.as_slice()));
        reader
            .read_cstr_at(relative)
            .map_err(|err| match err {
                MachoError::TruncatedString { .. } => MachoError::TruncatedString { offset },
                MachoError::InvalidEncoding { .. } => MachoError::InvalidEncoding { offset },
                err => err,
            })
    }
}
