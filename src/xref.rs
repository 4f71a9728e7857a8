//! The cross-reference table: an arena keyed by object number.
//!
//! Every indirect reference in the object layer is a `(number, generation)`
//! pair resolved through this table, which keeps the graph free of
//! ownership cycles and makes mark-and-sweep a table walk. The arena is
//! sparse so a single object numbered near 2^31 costs one entry, not two
//! billion.

use crate::types::{PdfReference, PdfValue};
use std::collections::BTreeMap;

/// One slot of the table. `InUse` entries cache their object once
/// materialized; `Compressed` entries live inside an object stream.
#[derive(Debug, Clone, PartialEq)]
pub enum XRefEntry {
    Free {
        next_free: u32,
        generation: u16,
    },
    InUse {
        offset: u64,
        generation: u16,
        object: Option<PdfValue>,
    },
    Compressed {
        stream_number: u32,
        index: u32,
        object: Option<PdfValue>,
    },
}

impl XRefEntry {
    pub fn generation(&self) -> u16 {
        match self {
            XRefEntry::Free { generation, .. } | XRefEntry::InUse { generation, .. } => *generation,
            XRefEntry::Compressed { .. } => 0,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, XRefEntry::Free { .. })
    }

    pub fn is_in_use(&self) -> bool {
        !self.is_free()
    }

    pub fn object(&self) -> Option<&PdfValue> {
        match self {
            XRefEntry::InUse { object, .. } | XRefEntry::Compressed { object, .. } => {
                object.as_ref()
            }
            XRefEntry::Free { .. } => None,
        }
    }

    pub fn object_mut(&mut self) -> Option<&mut PdfValue> {
        match self {
            XRefEntry::InUse { object, .. } | XRefEntry::Compressed { object, .. } => {
                object.as_mut()
            }
            XRefEntry::Free { .. } => None,
        }
    }
}

/// Sparse arena of xref entries. Object 0 always exists, is free with
/// generation 65535, and heads the free list.
#[derive(Debug, Clone)]
pub struct XRefTable {
    entries: BTreeMap<u32, XRefEntry>,
}

impl Default for XRefTable {
    fn default() -> Self {
        Self::new()
    }
}

impl XRefTable {
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            0,
            XRefEntry::Free {
                next_free: 0,
                generation: 65535,
            },
        );
        XRefTable { entries }
    }

    /// The trailer `/Size`: one past the highest object number.
    pub fn size(&self) -> u32 {
        self.entries
            .last_key_value()
            .map(|(&n, _)| n.saturating_add(1))
            .unwrap_or(1)
    }

    pub fn get(&self, number: u32) -> Option<&XRefEntry> {
        self.entries.get(&number)
    }

    pub fn get_mut(&mut self, number: u32) -> Option<&mut XRefEntry> {
        self.entries.get_mut(&number)
    }

    pub fn contains(&self, number: u32) -> bool {
        self.entries.contains_key(&number)
    }

    /// Insert an entry, overwriting. The xref loader relies on
    /// `insert_if_absent` instead, so the chain's newest section wins.
    pub fn insert(&mut self, number: u32, entry: XRefEntry) {
        self.entries.insert(number, entry);
    }

    /// Insert only when the slot is still unknown. The xref chain is
    /// walked newest section first, so the first entry seen for a number
    /// wins.
    pub fn insert_if_absent(&mut self, number: u32, entry: XRefEntry) {
        self.entries.entry(number).or_insert(entry);
    }

    /// The cached object for a number, if materialized.
    pub fn object(&self, number: u32) -> Option<&PdfValue> {
        self.get(number).and_then(|e| e.object())
    }

    pub fn object_mut(&mut self, number: u32) -> Option<&mut PdfValue> {
        self.get_mut(number).and_then(|e| e.object_mut())
    }

    /// Replace the object stored at `number`, keeping the slot's
    /// generation.
    pub fn set_object(&mut self, number: u32, value: PdfValue) {
        let generation = self.get(number).map(|e| e.generation()).unwrap_or(0);
        self.insert(
            number,
            XRefEntry::InUse {
                offset: 0,
                generation,
                object: Some(value),
            },
        );
    }

    /// Allocate a slot for a new object, reusing the free list when a
    /// reusable number is available, appending otherwise.
    pub fn alloc(&mut self, value: PdfValue) -> PdfReference {
        if let Some(number) = self.pop_free() {
            let generation = self.get(number).map(|e| e.generation()).unwrap_or(0);
            self.insert(
                number,
                XRefEntry::InUse {
                    offset: 0,
                    generation,
                    object: Some(value),
                },
            );
            return PdfReference::new(number, generation);
        }

        let number = self.size();
        self.insert(
            number,
            XRefEntry::InUse {
                offset: 0,
                generation: 0,
                object: Some(value),
            },
        );
        PdfReference::new(number, 0)
    }

    fn pop_free(&mut self) -> Option<u32> {
        let head = match self.get(0) {
            Some(XRefEntry::Free { next_free, .. }) => *next_free,
            _ => 0,
        };
        if head == 0 {
            return None;
        }
        let (next, generation) = match self.get(head) {
            Some(XRefEntry::Free {
                next_free,
                generation,
            }) if *generation < 65535 => (*next_free, *generation),
            _ => return None,
        };
        self.insert(
            0,
            XRefEntry::Free {
                next_free: next,
                generation: 65535,
            },
        );
        // Leave the popped slot free; the caller fills it.
        self.insert(
            head,
            XRefEntry::Free {
                next_free: 0,
                generation,
            },
        );
        Some(head)
    }

    /// Release a slot. The next generation is bumped so stale references
    /// fail the generation check; the free list is re-threaded by
    /// `thread_free_list`.
    pub fn free(&mut self, number: u32) {
        if number == 0 {
            return;
        }
        let generation = self
            .get(number)
            .map(|e| e.generation())
            .unwrap_or(0)
            .saturating_add(1)
            .min(65535);
        self.insert(
            number,
            XRefEntry::Free {
                next_free: 0,
                generation,
            },
        );
    }

    /// Chain every free entry in ascending number order, head at object 0,
    /// last entry pointing back to 0.
    pub fn thread_free_list(&mut self) {
        let free_numbers: Vec<u32> = self
            .entries
            .iter()
            .filter(|(&n, e)| n != 0 && e.is_free())
            .map(|(&n, _)| n)
            .collect();

        let mut next = 0u32;
        for &n in free_numbers.iter().rev() {
            let generation = self.get(n).map(|e| e.generation()).unwrap_or(0);
            self.insert(
                n,
                XRefEntry::Free {
                    next_free: next,
                    generation,
                },
            );
            next = n;
        }
        self.insert(
            0,
            XRefEntry::Free {
                next_free: next,
                generation: 65535,
            },
        );
    }

    /// All entries in object-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &XRefEntry)> {
        self.entries.iter().map(|(&n, e)| (n, e))
    }

    /// Object numbers of all in-use (including compressed) entries.
    pub fn in_use_numbers(&self) -> Vec<u32> {
        self.iter()
            .filter(|(_, e)| e.is_in_use())
            .map(|(n, _)| n)
            .collect()
    }
}
