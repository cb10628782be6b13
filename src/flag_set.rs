use std::collections::BTreeSet;

use bitvec::prelude::*;
use num_traits::FromPrimitive;

/// A flags word decoded into the named flags it carries.
///
/// Bits without a name in `F` are kept in [`FlagSet::raw`] but never show up in
/// the decoded set, so newer toolchains adding bits do not break decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagSet<F: Ord> {
    raw: u32,
    flags: BTreeSet<F>,
}

impl<F> FlagSet<F>
where
    F: FromPrimitive + Ord + Copy,
{
    pub fn decode(raw: u32) -> FlagSet<F> {
        let flags = raw
            .view_bits::<Lsb0>()
            .iter_ones()
            .filter_map(|bit| F::from_u32(1 << bit))
            .collect();
        FlagSet { raw, flags }
    }

    /// Decodes only the bits selected by `mask`.
    pub fn decode_masked(raw: u32, mask: u32) -> FlagSet<F> {
        FlagSet::decode(raw & mask)
    }

    #[inline]
    pub fn raw(&self) -> u32 {
        self.raw
    }

    #[inline]
    pub fn is_set(&self, flag: F) -> bool {
        self.flags.contains(&flag)
    }

    #[inline]
    pub fn is_clear(&self, flag: F) -> bool {
        !self.is_set(flag)
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = F> + '_ {
        self.flags.iter().copied()
    }

    /// Bits that are set in the word but have no name.
    pub fn unknown_bits(&self) -> u32 {
        self.flags
            .iter()
            .fold(self.raw, |rest, flag| rest & !Self::bit_of(*flag))
    }

    fn bit_of(flag: F) -> u32 {
        // every named flag is a single bit, so searching the 32 positions is enough
        (0..32)
            .map(|bit| 1u32 << bit)
            .find(|mask| F::from_u32(*mask) == Some(flag))
            .unwrap_or(0)
    }
}

impl<F: Ord> Default for FlagSet<F> {
    fn default() -> Self {
        FlagSet {
            raw: 0,
            flags: BTreeSet::new(),
        }
    }
}
