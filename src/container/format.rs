//! On-disk layout of the self-describing container ("BP file").
//!
//! ```text
//! WireFileHdr
//! WireRecordHdr(GROUP)  bincode GroupMeta
//! WireRecordHdr(ATTRS)  bincode Vec<AttrEntry>            (optional, repeatable)
//! WireRecordHdr(STEP)   WireStepHdr { block 0 } { block 1 } ...
//!     block := WireLen bincode BlockIndex  WireLen data-bytes
//! ```
//!
//! Records are append-only. A `STEP` record holds every block (one per
//! writing rank) of one step; each block's index locates its variables by
//! offset relative to the start of that block's data bytes.

use crate::algs::wire::{
    RECORD_ATTRS, RECORD_GROUP, RECORD_STEP, WIRE_VERSION, WireFileHdr, WireLen, WireRecordHdr,
    WireStepHdr, cast_slice, read_pod, write_pod,
};
use crate::container::types::ContainerType;
use crate::container_error::ContainerError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Group-level metadata written once after the file header.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMeta {
    pub group: String,
    pub transport: String,
    pub transport_args: String,
}

/// One whole-file attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttrEntry {
    pub name: String,
    pub ctype: ContainerType,
    pub bytes: Vec<u8>,
}

/// Location and shape of one variable inside a block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VarEntry {
    pub name: String,
    pub ctype: ContainerType,
    /// Resolved extents; empty for scalars.
    pub dims: Vec<u64>,
    pub transform: String,
    pub offset: u64,
    pub len: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockIndex {
    pub vars: Vec<VarEntry>,
}

/// Variables produced by one rank during one step, not yet on disk.
#[derive(Clone, Debug, Default)]
pub struct BlockBuffer {
    index: BlockIndex,
    data: Vec<u8>,
}

impl BlockBuffer {
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            index: BlockIndex::default(),
            data: Vec::with_capacity(bytes),
        }
    }

    pub fn push(
        &mut self,
        name: &str,
        ctype: ContainerType,
        dims: Vec<u64>,
        transform: &str,
        bytes: &[u8],
    ) {
        self.index.vars.push(VarEntry {
            name: name.to_string(),
            ctype,
            dims,
            transform: transform.to_string(),
            offset: self.data.len() as u64,
            len: bytes.len() as u64,
        });
        self.data.extend_from_slice(bytes);
    }

    /// Bytes of an already pushed variable.
    pub fn get(&self, name: &str) -> Option<(&VarEntry, &[u8])> {
        self.index.vars.iter().find(|v| v.name == name).map(|v| {
            let start = v.offset as usize;
            (v, &self.data[start..start + v.len as usize])
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.vars.iter().any(|v| v.name == name)
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Serialize as `WireLen index WireLen data`.
    pub fn encode(&self) -> Result<Vec<u8>, ContainerError> {
        let index = bincode::serialize(&self.index)?;
        let mut out = Vec::with_capacity(16 + index.len() + self.data.len());
        out.extend_from_slice(cast_slice(&[WireLen::new(index.len())]));
        out.extend_from_slice(&index);
        out.extend_from_slice(cast_slice(&[WireLen::new(self.data.len())]));
        out.extend_from_slice(&self.data);
        Ok(out)
    }
}

/// Where one block's variables live in the file.
#[derive(Clone, Debug, PartialEq)]
pub struct BlockLayout {
    pub vars: Vec<VarEntry>,
    /// Absolute file offset of the block's data bytes.
    pub data_offset: u64,
}

impl BlockLayout {
    pub fn var(&self, name: &str) -> Option<&VarEntry> {
        self.vars.iter().find(|v| v.name == name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepLayout {
    pub step: u64,
    pub blocks: Vec<BlockLayout>,
}

/// Everything learned from one pass over a container file.
#[derive(Clone, Debug, Default)]
pub struct ScannedFile {
    pub meta: GroupMeta,
    pub attrs: Vec<AttrEntry>,
    pub steps: Vec<StepLayout>,
}

fn write_record(file: &mut File, kind: u16, payload: &[u8]) -> Result<(), ContainerError> {
    let mut buf = Vec::with_capacity(16 + payload.len());
    write_pod(&mut buf, &WireRecordHdr::new(kind, payload.len() as u64))?;
    buf.extend_from_slice(payload);
    file.write_all(&buf)?;
    Ok(())
}

/// Append-only writer owned by the aggregating rank.
#[derive(Debug)]
pub struct BpFileWriter {
    file: File,
    path: PathBuf,
    next_step: u64,
}

impl BpFileWriter {
    /// Create (or, with `append`, extend) a container.
    ///
    /// Appending to a missing file creates it. Attributes the file does not
    /// hold yet are recorded.
    pub fn open(
        path: impl AsRef<Path>,
        append: bool,
        meta: &GroupMeta,
        attrs: &[AttrEntry],
    ) -> Result<Self, ContainerError> {
        let path = path.as_ref().to_path_buf();
        let mut fresh: Vec<&AttrEntry> = attrs.iter().collect();
        let mut writer = if append && path.exists() {
            let mut file = OpenOptions::new().read(true).append(true).open(&path)?;
            let scanned = scan(&mut file)?;
            let next_step = scanned.steps.last().map(|s| s.step + 1).unwrap_or(0);
            fresh.retain(|a| !scanned.attrs.iter().any(|s| s.name == a.name));
            Self {
                file,
                path,
                next_step,
            }
        } else {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .read(true)
                .open(&path)?;
            write_pod(&mut file, &WireFileHdr::new())?;
            write_record(&mut file, RECORD_GROUP, &bincode::serialize(meta)?)?;
            Self {
                file,
                path,
                next_step: 0,
            }
        };
        if !fresh.is_empty() {
            write_record(&mut writer.file, RECORD_ATTRS, &bincode::serialize(&fresh)?)?;
        }
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index the next `write_step` will use.
    pub fn next_step(&self) -> u64 {
        self.next_step
    }

    /// Append one step made of already encoded blocks, ordered by rank.
    pub fn write_step(&mut self, blocks: &[Bytes]) -> Result<u64, ContainerError> {
        let step = self.next_step;
        let body: usize = blocks.iter().map(|b| b.len()).sum();
        let mut payload = Vec::with_capacity(16 + body);
        write_pod(&mut payload, &WireStepHdr::new(step, blocks.len() as u32))?;
        for block in blocks {
            payload.extend_from_slice(block);
        }
        write_record(&mut self.file, RECORD_STEP, &payload)?;
        self.file.flush()?;
        self.next_step += 1;
        Ok(step)
    }

    pub fn sync(&mut self) -> Result<(), ContainerError> {
        self.file.sync_data()?;
        Ok(())
    }
}

fn read_exact_vec(file: &mut File, len: usize) -> Result<Vec<u8>, ContainerError> {
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read a `WireLen` that must fit in what is left of the record ending at
/// `end`.
fn bounded_len(file: &mut File, end: u64, record: u64) -> Result<usize, ContainerError> {
    let len: WireLen = read_pod(file)?;
    let left = end.saturating_sub(file.stream_position()?);
    if len.get() as u64 > left {
        return Err(ContainerError::Format(format!(
            "block length {} in record at offset {record} exceeds the {left} bytes left",
            len.get()
        )));
    }
    Ok(len.get())
}

/// Read the header and every record index of an open container.
///
/// Array bytes are skipped, not read.
pub fn scan(file: &mut File) -> Result<ScannedFile, ContainerError> {
    let file_len = file.seek(SeekFrom::End(0))?;
    file.seek(SeekFrom::Start(0))?;

    let hdr: WireFileHdr = read_pod(file)
        .map_err(|_| ContainerError::Format("file too short for a header".into()))?;
    if !hdr.is_valid() {
        return Err(ContainerError::Format("bad magic".into()));
    }
    if !hdr.same_endianness() {
        return Err(ContainerError::Format(
            "container was written with the opposite byte order".into(),
        ));
    }
    if hdr.version() != WIRE_VERSION {
        return Err(ContainerError::Format(format!(
            "unsupported version {}",
            hdr.version()
        )));
    }

    let mut scanned = ScannedFile::default();
    let mut pos = file.stream_position()?;
    while pos < file_len {
        let rec: WireRecordHdr = read_pod(file)?;
        let payload_start = pos + 16;
        let payload_end = payload_start
            .checked_add(rec.payload_len())
            .filter(|end| *end <= file_len)
            .ok_or_else(|| ContainerError::Format(format!("record at offset {pos} runs past end of file")))?;
        match rec.kind() {
            RECORD_GROUP => {
                let bytes = read_exact_vec(file, rec.payload_len() as usize)?;
                scanned.meta = bincode::deserialize(&bytes)?;
            }
            RECORD_ATTRS => {
                let bytes = read_exact_vec(file, rec.payload_len() as usize)?;
                let attrs: Vec<AttrEntry> = bincode::deserialize(&bytes)?;
                for attr in attrs {
                    if !scanned.attrs.iter().any(|a| a.name == attr.name) {
                        scanned.attrs.push(attr);
                    }
                }
            }
            RECORD_STEP => {
                let step_hdr: WireStepHdr = read_pod(file)?;
                let mut blocks = Vec::new();
                for _ in 0..step_hdr.blocks() {
                    let index_len = bounded_len(file, payload_end, pos)?;
                    let index_bytes = read_exact_vec(file, index_len)?;
                    let index: BlockIndex = bincode::deserialize(&index_bytes)?;
                    let data_len = bounded_len(file, payload_end, pos)?;
                    let data_offset = file.stream_position()?;
                    for v in &index.vars {
                        if v.offset.checked_add(v.len).is_none_or(|end| end > data_len as u64) {
                            return Err(ContainerError::Format(format!(
                                "variable `{}` overruns its block",
                                v.name
                            )));
                        }
                    }
                    file.seek(SeekFrom::Start(data_offset + data_len as u64))?;
                    blocks.push(BlockLayout {
                        vars: index.vars,
                        data_offset,
                    });
                }
                scanned.steps.push(StepLayout {
                    step: step_hdr.step(),
                    blocks,
                });
            }
            other => {
                log::warn!("skipping unknown record kind {other} at offset {pos}");
            }
        }
        file.seek(SeekFrom::Start(payload_end))?;
        pos = payload_end;
    }
    Ok(scanned)
}

/// Read `len` bytes at absolute `offset`.
pub fn read_range(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>, ContainerError> {
    file.seek(SeekFrom::Start(offset))?;
    read_exact_vec(file, len)
}
