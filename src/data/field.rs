//! Ordered collections of data arrays with optional attribute designations.

use crate::data::array::DataArray;

/// Role an array can be designated to play within its collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    Scalars,
    Vectors,
    Normals,
    TCoords,
    Tensors,
    GlobalIds,
    PedigreeIds,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 7] = [
        AttributeKind::Scalars,
        AttributeKind::Vectors,
        AttributeKind::Normals,
        AttributeKind::TCoords,
        AttributeKind::Tensors,
        AttributeKind::GlobalIds,
        AttributeKind::PedigreeIds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttributeKind::Scalars => "Scalars",
            AttributeKind::Vectors => "Vectors",
            AttributeKind::Normals => "Normals",
            AttributeKind::TCoords => "TCoords",
            AttributeKind::Tensors => "Tensors",
            AttributeKind::GlobalIds => "GlobalIds",
            AttributeKind::PedigreeIds => "PedigreeIds",
        }
    }

    /// Storage name used for a designated array that has no name of its own.
    pub fn storage_name(self) -> String {
        format!("{}_", self.as_str())
    }

    pub fn from_storage_name(name: &str) -> Option<AttributeKind> {
        let stem = name.strip_suffix('_')?;
        Self::ALL.into_iter().find(|k| k.as_str() == stem)
    }
}

/// Arrays in insertion order. Adding an array whose non-empty name is
/// already present replaces the earlier one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldData {
    arrays: Vec<DataArray>,
    designated: Vec<(AttributeKind, usize)>,
}

impl FieldData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `array`, returning its index.
    pub fn add_array(&mut self, array: DataArray) -> usize {
        if !array.name.is_empty() {
            if let Some(i) = self.arrays.iter().position(|a| a.name == array.name) {
                self.arrays[i] = array;
                return i;
            }
        }
        self.arrays.push(array);
        self.arrays.len() - 1
    }

    /// Insert `array` and designate it as `kind`, replacing any previous
    /// designation of that kind.
    pub fn set_attribute(&mut self, array: DataArray, kind: AttributeKind) -> usize {
        let i = self.add_array(array);
        self.designated.retain(|(k, _)| *k != kind);
        self.designated.push((kind, i));
        i
    }

    pub fn attribute(&self, kind: AttributeKind) -> Option<&DataArray> {
        self.designated
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|&(_, i)| &self.arrays[i])
    }

    /// Designation of the array at `index`, if any.
    pub fn attribute_kind_of(&self, index: usize) -> Option<AttributeKind> {
        self.designated
            .iter()
            .find(|(_, i)| *i == index)
            .map(|&(k, _)| k)
    }

    pub fn array(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|a| a.name == name)
    }

    pub fn array_at(&self, index: usize) -> Option<&DataArray> {
        self.arrays.get(index)
    }

    pub fn arrays(&self) -> &[DataArray] {
        &self.arrays
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataArray> {
        self.arrays.iter()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}
