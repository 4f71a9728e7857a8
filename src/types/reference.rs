use serde::{Deserialize, Serialize};
use std::fmt;

/// An indirect reference: `n g R` on the wire. Object number is at least 1,
/// generation at least 0. References never carry a handle to the target;
/// all traversal goes through the cross-reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PdfReference {
    pub number: u32,
    pub generation: u16,
}

impl PdfReference {
    pub fn new(number: u32, generation: u16) -> Self {
        PdfReference { number, generation }
    }

    pub fn id(&self) -> ObjectId {
        ObjectId {
            number: self.number,
            generation: self.generation,
        }
    }
}

impl fmt::Display for PdfReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}

/// Identity of an indirect object: the `(number, generation)` pair that
/// addresses one slot of the cross-reference table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    pub number: u32,
    pub generation: u16,
}

impl ObjectId {
    pub fn new(number: u32, generation: u16) -> Self {
        ObjectId { number, generation }
    }

    pub fn to_reference(self) -> PdfReference {
        PdfReference::new(self.number, self.generation)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} obj", self.number, self.generation)
    }
}

impl From<(u32, u16)> for ObjectId {
    fn from((number, generation): (u32, u16)) -> Self {
        ObjectId::new(number, generation)
    }
}

impl From<ObjectId> for PdfReference {
    fn from(id: ObjectId) -> Self {
        id.to_reference()
    }
}

impl From<PdfReference> for ObjectId {
    fn from(reference: PdfReference) -> Self {
        reference.id()
    }
}
