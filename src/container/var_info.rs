//! Read-side catalog records: one [`VarInfo`] per variable, one
//! [`Attribute`] per whole-file attribute.
//!
//! Scalars carry their per-step, per-block values; arrays carry only the
//! file location of each block, filled later by scheduled reads.

use crate::container::types::{ContainerType, Element, from_bytes};
use crate::container_error::ContainerError;
use num_traits::NumCast;

/// One block (= one writer rank) of a variable within one step.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockInfo {
    pub block: usize,
    pub dims: Vec<u64>,
    /// Materialized bytes, scalars only.
    pub value: Option<Vec<u8>>,
    pub(crate) offset: u64,
    pub(crate) len: u64,
}

impl BlockInfo {
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product::<u64>() as usize
    }
}

/// Blocks of a variable present in one step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepBlocks {
    pub step: usize,
    pub blocks: Vec<BlockInfo>,
}

/// Catalog entry for one variable of an open container.
#[derive(Clone, Debug, PartialEq)]
pub struct VarInfo {
    name: String,
    id: usize,
    ctype: ContainerType,
    dims: Vec<u64>,
    steps: Vec<StepBlocks>,
}

impl VarInfo {
    pub(crate) fn new(id: usize, name: &str, ctype: ContainerType, dims: Vec<u64>) -> Self {
        Self {
            name: name.to_string(),
            id,
            ctype,
            dims,
            steps: Vec::new(),
        }
    }

    /// Record a block; steps must arrive in ascending order.
    pub(crate) fn push_block(&mut self, step: usize, block: BlockInfo) {
        match self.steps.last_mut() {
            Some(last) if last.step == step => last.blocks.push(block),
            _ => self.steps.push(StepBlocks {
                step,
                blocks: vec![block],
            }),
        }
    }

    pub(crate) fn set_value(&mut self, step: usize, block: usize, bytes: Vec<u8>) {
        if let Some(b) = self
            .steps
            .iter_mut()
            .find(|s| s.step == step)
            .and_then(|s| s.blocks.iter_mut().find(|b| b.block == block))
        {
            b.value = Some(bytes);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn ctype(&self) -> ContainerType {
        self.ctype
    }

    /// Shape of the first block seen; empty for scalars.
    pub fn dims(&self) -> &[u64] {
        &self.dims
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Number of steps in which this variable was written.
    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Container step indices carrying this variable, ascending.
    pub fn step_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps.iter().map(|s| s.step)
    }

    /// Written by exactly one block in every step.
    pub fn is_global(&self) -> bool {
        self.steps.iter().all(|s| s.blocks.len() == 1)
    }

    pub fn num_blocks(&self, step: usize) -> usize {
        self.step(step).map(|s| s.blocks.len()).unwrap_or(0)
    }

    pub fn block_dims(&self, step: usize, block: usize) -> Result<&[u64], ContainerError> {
        Ok(&self.block(step, block)?.dims)
    }

    pub(crate) fn step(&self, step: usize) -> Option<&StepBlocks> {
        self.steps
            .binary_search_by_key(&step, |s| s.step)
            .ok()
            .map(|i| &self.steps[i])
    }

    pub(crate) fn block(&self, step: usize, block: usize) -> Result<&BlockInfo, ContainerError> {
        let s = self.step(step).ok_or_else(|| ContainerError::StepOutOfRange {
            path: self.name.clone(),
            step,
        })?;
        s.blocks
            .iter()
            .find(|b| b.block == block)
            .ok_or_else(|| ContainerError::BlockOutOfRange {
                path: self.name.clone(),
                step,
                block,
            })
    }

    fn check_type(&self, wanted: ContainerType) -> Result<(), ContainerError> {
        if wanted == self.ctype {
            Ok(())
        } else {
            Err(ContainerError::TypeMismatch {
                path: self.name.clone(),
                expected: wanted,
                found: self.ctype,
            })
        }
    }

    fn scalar_bytes(&self, step: usize, block: usize) -> Result<&[u8], ContainerError> {
        if !self.is_scalar() {
            return Err(ContainerError::InvalidDimensionality(self.name.clone()));
        }
        self.block(step, block)?
            .value
            .as_deref()
            .ok_or_else(|| ContainerError::Format(format!("scalar `{}` has no value", self.name)))
    }

    /// Scalar value at `step`, taken from block 0.
    pub fn value<T: Element>(&self, step: usize) -> Result<T, ContainerError> {
        self.block_value(step, 0)
    }

    pub fn block_value<T: Element>(&self, step: usize, block: usize) -> Result<T, ContainerError> {
        self.check_type(T::CONTAINER_TYPE)?;
        let bytes = self.scalar_bytes(step, block)?;
        from_bytes::<T>(bytes)
            .first()
            .copied()
            .ok_or_else(|| ContainerError::Format(format!("short scalar `{}`", self.name)))
    }

    /// One value per step carrying the variable, in step order.
    pub fn all_values<T: Element>(&self) -> Result<Vec<T>, ContainerError> {
        self.steps.iter().map(|s| self.value(s.step)).collect()
    }

    pub fn string_value(&self, step: usize) -> Result<String, ContainerError> {
        self.check_type(ContainerType::String)?;
        let bytes = self.scalar_bytes(step, 0)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Numeric scalar converted to `T`, whatever integer or real type it
    /// was stored as.
    pub fn value_as<T: NumCast>(&self, step: usize) -> Result<T, ContainerError> {
        self.block_value_as(step, 0)
    }

    pub fn block_value_as<T: NumCast>(&self, step: usize, block: usize) -> Result<T, ContainerError> {
        let bytes = self.scalar_bytes(step, block)?;
        cast_scalar(self.ctype, bytes).ok_or_else(|| ContainerError::UnsupportedType(self.name.clone()))
    }
}

/// Whole-file attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub id: usize,
    pub name: String,
    pub ctype: ContainerType,
    pub bytes: Vec<u8>,
}

impl Attribute {
    pub fn value<T: Element>(&self) -> Result<T, ContainerError> {
        if T::CONTAINER_TYPE != self.ctype {
            return Err(ContainerError::TypeMismatch {
                path: self.name.clone(),
                expected: T::CONTAINER_TYPE,
                found: self.ctype,
            });
        }
        from_bytes::<T>(&self.bytes)
            .first()
            .copied()
            .ok_or_else(|| ContainerError::Format(format!("short attribute `{}`", self.name)))
    }

    pub fn value_as<T: NumCast>(&self) -> Result<T, ContainerError> {
        cast_scalar(self.ctype, &self.bytes)
            .ok_or_else(|| ContainerError::UnsupportedType(self.name.clone()))
    }

    pub fn string_value(&self) -> Result<String, ContainerError> {
        if self.ctype != ContainerType::String {
            return Err(ContainerError::TypeMismatch {
                path: self.name.clone(),
                expected: ContainerType::String,
                found: self.ctype,
            });
        }
        Ok(String::from_utf8_lossy(&self.bytes).into_owned())
    }
}

fn first<T: Element>(bytes: &[u8]) -> Option<T> {
    from_bytes::<T>(bytes).first().copied()
}

pub(crate) fn cast_scalar<T: NumCast>(ctype: ContainerType, bytes: &[u8]) -> Option<T> {
    match ctype {
        ContainerType::Byte => T::from(first::<i8>(bytes)?),
        ContainerType::Short => T::from(first::<i16>(bytes)?),
        ContainerType::Integer => T::from(first::<i32>(bytes)?),
        ContainerType::Long => T::from(first::<i64>(bytes)?),
        ContainerType::UnsignedByte => T::from(first::<u8>(bytes)?),
        ContainerType::UnsignedShort => T::from(first::<u16>(bytes)?),
        ContainerType::UnsignedInteger => T::from(first::<u32>(bytes)?),
        ContainerType::UnsignedLong => T::from(first::<u64>(bytes)?),
        ContainerType::Real => T::from(first::<f32>(bytes)?),
        ContainerType::Double => T::from(first::<f64>(bytes)?),
        _ => None,
    }
}
