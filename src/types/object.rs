use crate::types::{PdfName, PdfReference, PdfValue};
use indexmap::IndexMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfArray {
    elements: Vec<PdfValue>,
}

impl PdfArray {
    pub fn new() -> Self {
        PdfArray {
            elements: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        PdfArray {
            elements: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: PdfValue) {
        self.elements.push(value);
    }

    pub fn insert(&mut self, index: usize, value: PdfValue) {
        self.elements.insert(index, value);
    }

    pub fn remove(&mut self, index: usize) -> PdfValue {
        self.elements.remove(index)
    }

    pub fn get(&self, index: usize) -> Option<&PdfValue> {
        self.elements.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PdfValue> {
        self.elements.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PdfValue> {
        self.elements.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PdfValue> {
        self.elements.iter_mut()
    }

    pub fn as_slice(&self) -> &[PdfValue] {
        &self.elements
    }

    pub fn clear(&mut self) {
        self.elements.clear();
    }

    /// References held directly by this array, in order.
    pub fn references(&self) -> impl Iterator<Item = PdfReference> + '_ {
        self.elements.iter().filter_map(|v| v.as_reference())
    }
}

impl std::ops::Index<usize> for PdfArray {
    type Output = PdfValue;

    fn index(&self, index: usize) -> &Self::Output {
        &self.elements[index]
    }
}

impl<'a> IntoIterator for &'a PdfArray {
    type Item = &'a PdfValue;
    type IntoIter = std::slice::Iter<'a, PdfValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl IntoIterator for PdfArray {
    type Item = PdfValue;
    type IntoIter = std::vec::IntoIter<PdfValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements.into_iter()
    }
}

impl From<Vec<PdfValue>> for PdfArray {
    fn from(elements: Vec<PdfValue>) -> Self {
        PdfArray { elements }
    }
}

impl FromIterator<PdfValue> for PdfArray {
    fn from_iter<T: IntoIterator<Item = PdfValue>>(iter: T) -> Self {
        PdfArray {
            elements: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for PdfArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, elem) in self.elements.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", elem)?;
        }
        write!(f, "]")
    }
}

/// A PDF dictionary. Keys are unique names; insertion order is preserved so
/// rewritten files stay diffable against their source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PdfDictionary {
    entries: IndexMap<PdfName, PdfValue>,
}

impl PdfDictionary {
    pub fn new() -> Self {
        PdfDictionary {
            entries: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, key: impl Into<PdfName>, value: PdfValue) -> Option<PdfValue> {
        self.entries.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<&PdfValue> {
        self.entries.get(&PdfName::new(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut PdfValue> {
        self.entries.get_mut(&PdfName::new(key))
    }

    pub fn remove(&mut self, key: &str) -> Option<PdfValue> {
        self.entries.shift_remove(&PdfName::new(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&PdfName::new(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PdfName, &PdfValue)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PdfName, &mut PdfValue)> {
        self.entries.iter_mut()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PdfName> {
        self.entries.keys()
    }

    // Typed convenience accessors; resolution of indirect values is the
    // document's job, these only narrow direct values.

    pub fn get_name(&self, key: &str) -> Option<&PdfName> {
        self.get(key).and_then(|v| v.as_name())
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_integer())
    }

    pub fn get_array(&self, key: &str) -> Option<&PdfArray> {
        self.get(key).and_then(|v| v.as_array())
    }

    pub fn get_dict(&self, key: &str) -> Option<&PdfDictionary> {
        self.get(key).and_then(|v| v.as_dict())
    }

    pub fn get_string(&self, key: &str) -> Option<&crate::types::PdfString> {
        self.get(key).and_then(|v| v.as_string())
    }

    pub fn get_reference(&self, key: &str) -> Option<PdfReference> {
        self.get(key).and_then(|v| v.as_reference())
    }

    pub fn type_name(&self) -> Option<&PdfName> {
        self.get_name("Type")
    }

    pub fn subtype_name(&self) -> Option<&PdfName> {
        self.get_name("Subtype")
    }

    pub fn is_type(&self, name: &str) -> bool {
        self.type_name().map(|n| n == name).unwrap_or(false)
    }
}

impl<'a> IntoIterator for &'a PdfDictionary {
    type Item = (&'a PdfName, &'a PdfValue);
    type IntoIter = indexmap::map::Iter<'a, PdfName, PdfValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for PdfDictionary {
    type Item = (PdfName, PdfValue);
    type IntoIter = indexmap::map::IntoIter<PdfName, PdfValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(PdfName, PdfValue)> for PdfDictionary {
    fn from_iter<T: IntoIterator<Item = (PdfName, PdfValue)>>(iter: T) -> Self {
        PdfDictionary {
            entries: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for PdfDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<<")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{} {}", key, value)?;
        }
        write!(f, ">>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_keys_are_unique() {
        let mut dict = PdfDictionary::new();
        dict.insert("Type", PdfValue::Name(PdfName::new("Page")));
        dict.insert("Type", PdfValue::Name(PdfName::new("Pages")));
        assert_eq!(dict.len(), 1);
        assert!(dict.is_type("Pages"));
    }

    #[test]
    fn dictionary_preserves_insertion_order() {
        let mut dict = PdfDictionary::new();
        dict.insert("B", PdfValue::Integer(2));
        dict.insert("A", PdfValue::Integer(1));
        let keys: Vec<_> = dict.keys().map(|k| k.without_slash().to_string()).collect();
        assert_eq!(keys, vec!["B", "A"]);
    }
}
