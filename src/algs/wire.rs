//! Fixed, versioned, little-endian wire types for the container file and
//! for collective messages.

use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::io::{Read, Write};
use std::mem::size_of;

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// First eight bytes of every container file.
pub const FILE_MAGIC: [u8; 8] = *b"MESHBP\0\0";

/// Written in host order; reads back as `0x0201` on a foreign-endian host.
pub const ENDIAN_MARKER: u16 = 0x0102;

/// Record kinds following the file header.
pub const RECORD_GROUP: u16 = 1;
pub const RECORD_ATTRS: u16 = 2;
pub const RECORD_STEP: u16 = 3;

/// All multi-byte integers in these structs are **little-endian** on the wire,
/// except `endian_marker`, which is host order by construction.

// ===== Container file ======================================================

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireFileHdr {
    pub magic: [u8; 8],
    pub version_le: u16,
    pub endian_marker: u16,
    pub reserved_le: u32, // future use; keep zero
}

impl WireFileHdr {
    pub fn new() -> Self {
        Self {
            magic: FILE_MAGIC,
            version_le: WIRE_VERSION.to_le(),
            endian_marker: ENDIAN_MARKER,
            reserved_le: 0,
        }
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn is_valid(&self) -> bool {
        self.magic == FILE_MAGIC
    }
    pub fn same_endianness(&self) -> bool {
        self.endian_marker == ENDIAN_MARKER
    }
}

impl Default for WireFileHdr {
    fn default() -> Self {
        Self::new()
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireRecordHdr {
    pub version_le: u16,
    pub kind_le: u16,
    pub reserved_le: u32,
    pub payload_len_le: u64,
}

impl WireRecordHdr {
    pub fn new(kind: u16, payload_len: u64) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            kind_le: kind.to_le(),
            reserved_le: 0,
            payload_len_le: payload_len.to_le(),
        }
    }
    pub fn kind(&self) -> u16 {
        u16::from_le(self.kind_le)
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn payload_len(&self) -> u64 {
        u64::from_le(self.payload_len_le)
    }
}

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireStepHdr {
    pub step_le: u64,
    pub blocks_le: u32,
    pub _pad: u32, // pad to 8-byte alignment (explicit)
}

impl WireStepHdr {
    pub fn new(step: u64, blocks: u32) -> Self {
        Self {
            step_le: step.to_le(),
            blocks_le: blocks.to_le(),
            _pad: 0,
        }
    }
    pub fn step(&self) -> u64 {
        u64::from_le(self.step_le)
    }
    pub fn blocks(&self) -> u32 {
        u32::from_le(self.blocks_le)
    }
}

/// Length prefix for variable-sized sections and messages.
#[repr(transparent)]
#[derive(Copy, Clone, Pod, Zeroable)]
pub struct WireLen(pub u64);

impl WireLen {
    pub fn new(n: usize) -> Self {
        Self((n as u64).to_le())
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.0) as usize
    }
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(size_of::<WireFileHdr>(), 16);
const_assert_eq!(size_of::<WireRecordHdr>(), 16);
const_assert_eq!(size_of::<WireStepHdr>(), 16);
const_assert_eq!(size_of::<WireLen>(), 8);

/// Write one fixed record.
pub fn write_pod<T: Pod, W: Write>(w: &mut W, value: &T) -> std::io::Result<()> {
    w.write_all(bytemuck::bytes_of(value))
}

/// Read one fixed record.
pub fn read_pod<T: Pod, R: Read>(r: &mut R) -> std::io::Result<T> {
    let mut out = T::zeroed();
    r.read_exact(bytemuck::bytes_of_mut(&mut out))?;
    Ok(out)
}

/// Decode one fixed record from the front of `bytes`.
pub fn pod_from_prefix<T: Pod>(bytes: &[u8]) -> Option<T> {
    let n = size_of::<T>();
    if bytes.len() < n {
        return None;
    }
    let mut out = T::zeroed();
    bytemuck::bytes_of_mut(&mut out).copy_from_slice(&bytes[..n]);
    Some(out)
}
