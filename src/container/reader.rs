//! Reader engine: catalog a container on open, then serve scalars from the
//! catalog and arrays through scheduled, batched reads.
//!
//! Array reads are queued by [`Reader::schedule_read_array`], which hands
//! back an [`ArrayHandle`]. Nothing is transferred until
//! [`Reader::read_arrays`] (alias [`Reader::wait_for_reads`]) sorts the
//! queue by file offset, merges adjacent byte ranges and fills every handle.

use crate::algs::communicator::Communicator;
use crate::container::format::{StepLayout, read_range, scan};
use crate::container::methods::ReadMethod;
use crate::container::types::{ContainerType, Element, from_bytes};
use crate::container::var_info::{Attribute, BlockInfo, VarInfo};
use crate::container::writer::CommIdentity;
use crate::container_error::ContainerError;
use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Reader configuration.
#[derive(Clone, Debug, Default)]
pub struct ReaderOptions {
    pub method: ReadMethod,
    /// Passed through untouched.
    pub method_args: String,
}

/// Outcome of [`Reader::advance`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// The given container step is now current.
    Ready(usize),
    /// No further step is available.
    EndOfStream,
}

/// Destination of one scheduled array read.
///
/// Empty until the owning reader performs its queued reads.
pub struct ArrayHandle<T> {
    slot: Arc<Mutex<Option<Vec<T>>>>,
}

impl<T> Clone for ArrayHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> ArrayHandle<T> {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Move the values out, leaving the handle empty.
    pub fn take(&self) -> Option<Vec<T>> {
        self.slot.lock().take()
    }
}

impl<T> std::fmt::Debug for ArrayHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayHandle")
            .field("ready", &self.is_ready())
            .finish()
    }
}

trait ReadSink: Send {
    fn ctype(&self) -> ContainerType;
    fn fill(&self, bytes: &[u8]);
}

impl<T: Element> ReadSink for ArrayHandle<T> {
    fn ctype(&self) -> ContainerType {
        T::CONTAINER_TYPE
    }

    fn fill(&self, bytes: &[u8]) {
        *self.slot.lock() = Some(from_bytes::<T>(bytes));
    }
}

struct ScheduledRead {
    name: String,
    stored: ContainerType,
    offset: u64,
    len: u64,
    sink: Box<dyn ReadSink>,
}

/// Counters returned by [`Reader::read_arrays`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Handles filled.
    pub buffers: usize,
    /// File reads issued after merging adjacent ranges.
    pub transfers: usize,
}

/// Read-side handle onto one container.
pub struct Reader<C: Communicator> {
    comm: C,
    identity: CommIdentity,
    options: ReaderOptions,
    file: Option<File>,
    path: Option<PathBuf>,
    layouts: Vec<StepLayout>,
    current: usize,
    vars: Vec<VarInfo>,
    by_name: HashMap<String, usize>,
    attrs: Vec<Attribute>,
    queue: Vec<ScheduledRead>,
}

impl<C: Communicator> Reader<C> {
    pub fn initialize(comm: C, options: ReaderOptions) -> Result<Self, ContainerError> {
        let identity = CommIdentity::of(&comm);
        log::debug!(
            "reader initialized: rank {} method {} args `{}`",
            comm.rank(),
            options.method,
            options.method_args
        );
        Ok(Self {
            comm,
            identity,
            options,
            file: None,
            path: None,
            layouts: Vec::new(),
            current: 0,
            vars: Vec::new(),
            by_name: HashMap::new(),
            attrs: Vec::new(),
            queue: Vec::new(),
        })
    }

    /// No-op for the communicator this handle was built with; fails for
    /// any other.
    pub fn reinitialize<D: Communicator>(&self, comm: &D) -> Result<(), ContainerError> {
        if CommIdentity::of(comm) == self.identity {
            Ok(())
        } else {
            Err(ContainerError::AlreadyInitialized)
        }
    }

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Open and catalog a container.
    pub fn open_file(&mut self, path: impl AsRef<Path>) -> Result<(), ContainerError> {
        let path = path.as_ref();
        if let Some(open) = &self.path {
            return Err(ContainerError::AlreadyOpen(open.display().to_string()));
        }
        let mut file = File::open(path)?;
        let scanned = scan(&mut file)?;
        log::info!(
            "opened `{}` (group `{}`, {} steps, {} attributes)",
            path.display(),
            scanned.meta.group,
            scanned.steps.len(),
            scanned.attrs.len()
        );
        self.attrs = scanned
            .attrs
            .into_iter()
            .enumerate()
            .map(|(id, a)| Attribute {
                id,
                name: a.name,
                ctype: a.ctype,
                bytes: a.bytes,
            })
            .collect();
        self.layouts = scanned.steps;
        self.current = 0;
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        self.rebuild_catalog()
    }

    fn visible_steps(&self) -> &[StepLayout] {
        if self.options.method.is_streaming() {
            let end = (self.current + 1).min(self.layouts.len());
            &self.layouts[self.current.min(end)..end]
        } else {
            &self.layouts
        }
    }

    fn rebuild_catalog(&mut self) -> Result<(), ContainerError> {
        let mut vars: Vec<VarInfo> = Vec::new();
        let mut by_name: HashMap<String, usize> = HashMap::new();
        let mut scalar_locs = Vec::new();
        for layout in self.visible_steps() {
            let step = layout.step as usize;
            for (block, bl) in layout.blocks.iter().enumerate() {
                for entry in &bl.vars {
                    let id = *by_name.entry(entry.name.clone()).or_insert_with(|| {
                        vars.push(VarInfo::new(
                            vars.len(),
                            &entry.name,
                            entry.ctype,
                            entry.dims.clone(),
                        ));
                        vars.len() - 1
                    });
                    let info = BlockInfo {
                        block,
                        dims: entry.dims.clone(),
                        value: None,
                        offset: bl.data_offset + entry.offset,
                        len: entry.len,
                    };
                    if entry.dims.is_empty() {
                        scalar_locs.push((id, step, block));
                    }
                    vars[id].push_block(step, info);
                }
            }
        }

        let file = self.file.as_mut().ok_or(ContainerError::NotOpen)?;
        for (id, step, block) in scalar_locs {
            let (offset, len) = {
                let b = vars[id].block(step, block)?;
                (b.offset, b.len as usize)
            };
            let bytes = read_range(file, offset, len)?;
            vars[id].set_value(step, block, bytes);
        }
        log::debug!(
            "catalog: {} variables over steps {:?}",
            vars.len(),
            self.step_range()
        );
        self.vars = vars;
        self.by_name = by_name;
        Ok(())
    }

    /// Inclusive range of steps visible through this handle.
    pub fn step_range(&self) -> Option<(usize, usize)> {
        let steps = self.visible_steps();
        match (steps.first(), steps.last()) {
            (Some(first), Some(last)) => Some((first.step as usize, last.step as usize)),
            _ => None,
        }
    }

    pub fn num_steps(&self) -> usize {
        self.visible_steps().len()
    }

    /// Step currently exposed by a streaming method.
    pub fn current_step(&self) -> usize {
        self.current
    }

    /// Release the current step and move to the next (streaming only).
    ///
    /// The file is rescanned first so steps appended since the last call
    /// become visible.
    pub fn advance(&mut self) -> Result<StepStatus, ContainerError> {
        if !self.options.method.is_streaming() {
            return Err(ContainerError::UnsupportedMethod(format!(
                "advance with non-streaming method {}",
                self.options.method
            )));
        }
        if !self.queue.is_empty() {
            log::warn!("dropping {} unperformed reads on advance", self.queue.len());
            self.queue.clear();
        }
        let file = self.file.as_mut().ok_or(ContainerError::NotOpen)?;
        self.layouts = scan(file)?.steps;
        self.current += 1;
        if self.current >= self.layouts.len() {
            self.current = self.layouts.len();
            self.vars.clear();
            self.by_name.clear();
            log::info!("end of stream");
            return Ok(StepStatus::EndOfStream);
        }
        self.rebuild_catalog()?;
        log::info!("advanced to step {}", self.current);
        Ok(StepStatus::Ready(self.current))
    }

    pub fn vars(&self) -> &[VarInfo] {
        &self.vars
    }

    pub fn var(&self, name: &str) -> Option<&VarInfo> {
        self.by_name.get(name).map(|&id| &self.vars[id])
    }

    pub fn var_by_id(&self, id: usize) -> Option<&VarInfo> {
        self.vars.get(id)
    }

    pub fn scalars(&self) -> impl Iterator<Item = &VarInfo> {
        self.vars.iter().filter(|v| v.is_scalar())
    }

    pub fn arrays(&self) -> impl Iterator<Item = &VarInfo> {
        self.vars.iter().filter(|v| !v.is_scalar())
    }

    pub fn array_id(&self, name: &str) -> Option<usize> {
        self.var(name).filter(|v| !v.is_scalar()).map(|v| v.id())
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attrs
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Reads queued and not yet performed.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a read of array `name` at `step`; `block` defaults to this
    /// rank.
    pub fn schedule_read_array<T: Element>(
        &mut self,
        name: &str,
        step: usize,
        block: Option<usize>,
    ) -> Result<ArrayHandle<T>, ContainerError> {
        let id = self
            .array_id(name)
            .ok_or_else(|| ContainerError::ArrayNotFound(name.to_string()))?;
        self.schedule_read_array_by_id(id, step, block)
    }

    pub fn schedule_read_array_by_id<T: Element>(
        &mut self,
        id: usize,
        step: usize,
        block: Option<usize>,
    ) -> Result<ArrayHandle<T>, ContainerError> {
        let block = block.unwrap_or_else(|| self.rank());
        let var = self
            .vars
            .get(id)
            .filter(|v| !v.is_scalar())
            .ok_or(ContainerError::ArrayIdNotFound(id))?;
        let info = var.block(step, block)?;
        let handle = ArrayHandle::<T>::new();
        log::debug!(
            "schedule `{}` step {step} block {block}: {} bytes",
            var.name(),
            info.len
        );
        self.queue.push(ScheduledRead {
            name: var.name().to_string(),
            stored: var.ctype(),
            offset: info.offset,
            len: info.len,
            sink: Box::new(handle.clone()),
        });
        Ok(handle)
    }

    /// Perform every queued read and clear the queue.
    ///
    /// A queued read whose requested type differs from the stored one fails
    /// the whole batch before any data moves.
    pub fn read_arrays(&mut self) -> Result<ReadSummary, ContainerError> {
        let queue = std::mem::take(&mut self.queue);
        if queue.is_empty() {
            return Ok(ReadSummary::default());
        }
        if let Some(bad) = queue.iter().find(|r| r.sink.ctype() != r.stored) {
            return Err(ContainerError::TypeMismatch {
                path: bad.name.clone(),
                expected: bad.sink.ctype(),
                found: bad.stored,
            });
        }
        let file = self.file.as_mut().ok_or(ContainerError::NotOpen)?;
        let buffers = queue.len();

        let runs: Vec<(u64, u64, Vec<ScheduledRead>)> = queue
            .into_iter()
            .sorted_by_key(|r| r.offset)
            .map(|r| (r.offset, r.offset + r.len, vec![r]))
            .coalesce(|(s0, e0, mut a), (s1, e1, b)| {
                if s1 <= e0 {
                    a.extend(b);
                    Ok((s0, e0.max(e1), a))
                } else {
                    Err(((s0, e0, a), (s1, e1, b)))
                }
            })
            .collect();

        let transfers = runs.len();
        for (start, end, reads) in runs {
            let bytes = read_range(file, start, (end - start) as usize)?;
            for r in reads {
                let lo = (r.offset - start) as usize;
                r.sink.fill(&bytes[lo..lo + r.len as usize]);
            }
        }
        log::debug!("performed {buffers} scheduled reads in {transfers} transfers");
        Ok(ReadSummary { buffers, transfers })
    }

    pub fn wait_for_reads(&mut self) -> Result<ReadSummary, ContainerError> {
        self.read_arrays()
    }

    /// Release the container. A no-op when nothing is open.
    pub fn close(&mut self) {
        if self.file.take().is_none() {
            return;
        }
        if !self.queue.is_empty() {
            log::warn!("closing with {} unperformed reads", self.queue.len());
        }
        if let Some(p) = self.path.take() {
            log::info!("closed `{}`", p.display());
        }
        self.queue.clear();
        self.vars.clear();
        self.by_name.clear();
        self.attrs.clear();
        self.layouts.clear();
        self.current = 0;
    }
}
