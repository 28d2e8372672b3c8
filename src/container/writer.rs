//! Writer engine: declare a schema once, then stream one step per
//! `open`/`close` bracket.
//!
//! ```text
//! initialize ─▶ define_* ─▶ open ─▶ write_* ─▶ close ─┐
//!                             ▲                       │
//!                             └───────────────────────┘
//! ```
//!
//! Each rank buffers its own block during a step. `close` gathers every
//! block onto rank 0, which appends them to the container as one step.
//! `open` and `close` are collective.

use crate::algs::communicator::{Communicator, broadcast_bytes, gather_bytes};
use crate::container::format::{AttrEntry, BlockBuffer, BpFileWriter, GroupMeta};
use crate::container::methods::{TransportMethod, Transform};
use crate::container::types::{ContainerType, Element, NativeType, as_bytes};
use crate::container::var_info::cast_scalar;
use crate::container_error::ContainerError;
use hashbrown::HashMap;
use std::path::{Path, PathBuf};

/// One extent of an array declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dim {
    Literal(u64),
    /// Path of an integer scalar whose value, written earlier in the same
    /// step, gives the extent.
    Var(String),
}

impl From<u64> for Dim {
    fn from(n: u64) -> Self {
        Dim::Literal(n)
    }
}

impl From<usize> for Dim {
    fn from(n: usize) -> Self {
        Dim::Literal(n as u64)
    }
}

impl From<&str> for Dim {
    fn from(path: &str) -> Self {
        Dim::Var(path.to_string())
    }
}

/// Writer configuration.
#[derive(Clone, Debug)]
pub struct WriterOptions {
    /// Name of the write group recorded in the container.
    pub group: String,
    pub transport: TransportMethod,
    /// Passed through to the container untouched.
    pub transport_args: String,
    /// Step buffer reserved per rank, in MiB.
    pub buffer_size_mb: usize,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            group: "VTK".to_string(),
            transport: TransportMethod::Posix,
            transport_args: String::new(),
            buffer_size_mb: 10,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct CommIdentity {
    rank: usize,
    size: usize,
    world_id: u64,
}

impl CommIdentity {
    pub(crate) fn of<C: Communicator>(comm: &C) -> Self {
        Self {
            rank: comm.rank(),
            size: comm.size(),
            world_id: comm.world_id(),
        }
    }
}

#[derive(Clone, Debug)]
struct VarDecl {
    ctype: ContainerType,
    dims: Vec<Dim>,
    transform: Transform,
}

/// Write-side handle onto one container.
pub struct Writer<C: Communicator> {
    comm: C,
    identity: CommIdentity,
    options: WriterOptions,
    decls: HashMap<String, VarDecl>,
    order: Vec<String>,
    attrs: Vec<AttrEntry>,
    group_size: u64,
    committed_size: u64,
    writing: bool,
    file: Option<BpFileWriter>,
    path: Option<PathBuf>,
    block: Option<BlockBuffer>,
    steps_written: u64,
    over_budget_steps: u64,
}

impl<C: Communicator> Writer<C> {
    /// Set up a writer for the process group behind `comm`.
    pub fn initialize(comm: C, options: WriterOptions) -> Result<Self, ContainerError> {
        let identity = CommIdentity::of(&comm);
        log::debug!(
            "writer initialized: rank {}/{} group `{}` transport {}",
            identity.rank,
            identity.size,
            options.group,
            options.transport
        );
        Ok(Self {
            comm,
            identity,
            options,
            decls: HashMap::new(),
            order: Vec::new(),
            attrs: Vec::new(),
            group_size: 0,
            committed_size: 0,
            writing: false,
            file: None,
            path: None,
            block: None,
            steps_written: 0,
            over_budget_steps: 0,
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
        self.identity.rank
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Running byte budget of one step.
    pub fn group_size(&self) -> u64 {
        self.group_size
    }

    /// Declarations are sealed once the first step was opened.
    pub fn is_writing(&self) -> bool {
        self.writing
    }

    pub fn is_open(&self) -> bool {
        self.block.is_some()
    }

    pub fn is_defined(&self, path: &str) -> bool {
        self.decls.contains_key(path)
    }

    /// Declared variable paths in declaration order.
    pub fn defined_paths(&self) -> &[String] {
        &self.order
    }

    pub fn steps_written(&self) -> u64 {
        self.steps_written
    }

    /// Closed steps whose payload outgrew the declared group size.
    pub fn over_budget_steps(&self) -> u64 {
        self.over_budget_steps
    }

    fn check_declaring(&self, path: &str) -> Result<(), ContainerError> {
        if self.writing {
            return Err(ContainerError::DefineAfterWrite(path.to_string()));
        }
        if self.decls.contains_key(path) {
            return Err(ContainerError::DuplicateDefinition(path.to_string()));
        }
        Ok(())
    }

    fn insert_decl(&mut self, path: &str, decl: VarDecl, bytes: u64) {
        log::debug!(
            "define `{path}`: {:?} dims {:?} (+{bytes} bytes)",
            decl.ctype,
            decl.dims
        );
        self.group_size = self.group_size.saturating_add(bytes);
        self.decls.insert(path.to_string(), decl);
        self.order.push(path.to_string());
    }

    /// Declare a 0-dimensional variable.
    pub fn define_scalar<T: NativeType + ?Sized>(&mut self, path: &str) -> Result<(), ContainerError> {
        self.check_declaring(path)?;
        let ctype = T::CONTAINER_TYPE;
        let decl = VarDecl {
            ctype,
            dims: Vec::new(),
            transform: Transform::None,
        };
        self.insert_decl(path, decl, ctype.size() as u64);
        Ok(())
    }

    /// Declare an array. Named dimensions must refer to integer scalars
    /// declared earlier; an array with any named dimension adds nothing to
    /// the group size.
    pub fn define_array<T: NativeType + ?Sized>(
        &mut self,
        path: &str,
        dims: &[Dim],
        transform: Transform,
    ) -> Result<(), ContainerError> {
        self.declare_array(path, T::CONTAINER_TYPE, dims, transform, None)
    }

    /// Declare an array whose extent is already known as `elements`.
    ///
    /// Same as [`define_array`](Self::define_array), except that shapes with
    /// named dimensions add `elements` values to the group size.
    pub fn define_array_sized<T: NativeType + ?Sized>(
        &mut self,
        path: &str,
        dims: &[Dim],
        transform: Transform,
        elements: u64,
    ) -> Result<(), ContainerError> {
        self.declare_array(path, T::CONTAINER_TYPE, dims, transform, Some(elements))
    }

    fn declare_array(
        &mut self,
        path: &str,
        ctype: ContainerType,
        dims: &[Dim],
        transform: Transform,
        elements: Option<u64>,
    ) -> Result<(), ContainerError> {
        self.check_declaring(path)?;
        if dims.is_empty() {
            return Err(ContainerError::InvalidDimensionality(path.to_string()));
        }
        let overflow = || ContainerError::InvalidDimensionality(path.to_string());
        let mut literal = Some(1u64);
        for dim in dims {
            match dim {
                Dim::Literal(n) => {
                    if let Some(acc) = literal {
                        literal = Some(acc.checked_mul(*n).ok_or_else(overflow)?);
                    }
                }
                Dim::Var(name) => {
                    let ok = self
                        .decls
                        .get(name)
                        .is_some_and(|d| d.dims.is_empty() && d.ctype.is_integer());
                    if !ok {
                        return Err(ContainerError::MissingDimension {
                            path: path.to_string(),
                            dim: name.clone(),
                        });
                    }
                    literal = None;
                }
            }
        }
        let bytes = literal
            .or(elements)
            .unwrap_or(0)
            .checked_mul(ctype.size() as u64)
            .ok_or_else(overflow)?;
        let decl = VarDecl {
            ctype,
            dims: dims.to_vec(),
            transform,
        };
        self.insert_decl(path, decl, bytes);
        Ok(())
    }

    fn push_attr(&mut self, name: &str, ctype: ContainerType, bytes: Vec<u8>) -> Result<(), ContainerError> {
        if self.writing {
            return Err(ContainerError::DefineAfterWrite(name.to_string()));
        }
        if self.attrs.iter().any(|a| a.name == name) {
            return Err(ContainerError::DuplicateDefinition(name.to_string()));
        }
        log::debug!("define attribute `{name}`: {ctype:?}");
        self.attrs.push(AttrEntry {
            name: name.to_string(),
            ctype,
            bytes,
        });
        Ok(())
    }

    /// Declare a whole-file numeric attribute. Only rank 0 records it, once
    /// in every container this writer creates.
    pub fn define_attribute<T: Element>(&mut self, name: &str, value: T) -> Result<(), ContainerError> {
        self.push_attr(name, T::CONTAINER_TYPE, as_bytes(&[value]).to_vec())
    }

    pub fn define_string_attribute(&mut self, name: &str, value: &str) -> Result<(), ContainerError> {
        self.push_attr(name, ContainerType::String, value.as_bytes().to_vec())
    }

    /// Start a step. Collective.
    ///
    /// The first call seals the declarations and commits the group size.
    pub fn open(&mut self, path: impl AsRef<Path>, append: bool) -> Result<(), ContainerError> {
        let path = path.as_ref();
        if self.block.is_some() {
            return Err(ContainerError::AlreadyOpen(path.display().to_string()));
        }
        self.writing = true;
        self.committed_size = self.group_size;

        let mut status = Ok(());
        if self.rank() == 0 && !self.options.transport.discards_data() {
            status = self.open_file(path, append);
        }
        self.agree(status, "open")?;

        let reserve = (self.options.buffer_size_mb << 20).min(self.committed_size as usize);
        self.block = Some(BlockBuffer::with_capacity(reserve));
        self.path = Some(path.to_path_buf());
        log::info!(
            "opened `{}` for writing (append: {append}, step size {} bytes)",
            path.display(),
            self.committed_size
        );
        Ok(())
    }

    fn open_file(&mut self, path: &Path, append: bool) -> Result<(), ContainerError> {
        let reuse = append && self.file.as_ref().is_some_and(|f| f.path() == path);
        if reuse {
            return Ok(());
        }
        let meta = GroupMeta {
            group: self.options.group.clone(),
            transport: self.options.transport.to_string(),
            transport_args: self.options.transport_args.clone(),
        };
        self.file = Some(BpFileWriter::open(path, append, &meta, &self.attrs)?);
        Ok(())
    }

    // Rank 0's outcome decides for everyone so no rank is left waiting in a
    // later collective.
    fn agree(&self, local: Result<(), ContainerError>, what: &str) -> Result<(), ContainerError> {
        let flag = vec![u8::from(local.is_ok())];
        let root_ok = broadcast_bytes(&self.comm, 0, flag)?;
        match local {
            Err(e) => Err(e),
            Ok(()) if root_ok.first() == Some(&1) => Ok(()),
            Ok(()) => Err(ContainerError::Comm(format!("{what} failed on rank 0"))),
        }
    }

    fn decl_for(&self, path: &str, ctype: ContainerType) -> Result<&VarDecl, ContainerError> {
        if self.block.is_none() {
            return Err(ContainerError::StepNotOpen(path.to_string()));
        }
        let decl = self
            .decls
            .get(path)
            .ok_or_else(|| ContainerError::UndefinedVariable(path.to_string()))?;
        if decl.ctype != ctype {
            return Err(ContainerError::TypeMismatch {
                path: path.to_string(),
                expected: decl.ctype,
                found: ctype,
            });
        }
        Ok(decl)
    }

    fn push(&mut self, path: &str, ctype: ContainerType, dims: Vec<u64>, transform: Transform, bytes: &[u8]) {
        let Some(block) = self.block.as_mut() else {
            return;
        };
        if block.contains(path) {
            log::warn!("`{path}` written twice in one step; keeping the first value");
            return;
        }
        log::debug!("write `{path}`: {} bytes", bytes.len());
        block.push(path, ctype, dims, transform.as_str(), bytes);
    }

    pub fn write_scalar<T: Element>(&mut self, path: &str, value: T) -> Result<(), ContainerError> {
        let decl = self.decl_for(path, T::CONTAINER_TYPE)?;
        if !decl.dims.is_empty() {
            return Err(ContainerError::InvalidDimensionality(path.to_string()));
        }
        self.push(path, T::CONTAINER_TYPE, Vec::new(), Transform::None, as_bytes(&[value]));
        Ok(())
    }

    pub fn write_string(&mut self, path: &str, value: &str) -> Result<(), ContainerError> {
        let decl = self.decl_for(path, ContainerType::String)?;
        if !decl.dims.is_empty() {
            return Err(ContainerError::InvalidDimensionality(path.to_string()));
        }
        self.push(path, ContainerType::String, Vec::new(), Transform::None, value.as_bytes());
        Ok(())
    }

    /// Write an array; `values.len()` must equal the product of the
    /// resolved dimensions.
    pub fn write_array<T: Element>(&mut self, path: &str, values: &[T]) -> Result<(), ContainerError> {
        let decl = self.decl_for(path, T::CONTAINER_TYPE)?;
        if decl.dims.is_empty() {
            return Err(ContainerError::InvalidDimensionality(path.to_string()));
        }
        let transform = decl.transform;
        let dims = self.resolve_dims(path, &decl.dims)?;
        let expected = dims.iter().product::<u64>() as usize;
        if expected != values.len() {
            return Err(ContainerError::ShapeMismatch {
                path: path.to_string(),
                expected,
                actual: values.len(),
            });
        }
        self.push(path, T::CONTAINER_TYPE, dims, transform, as_bytes(values));
        Ok(())
    }

    fn resolve_dims(&self, path: &str, dims: &[Dim]) -> Result<Vec<u64>, ContainerError> {
        let block = self
            .block
            .as_ref()
            .ok_or_else(|| ContainerError::StepNotOpen(path.to_string()))?;
        dims.iter()
            .map(|dim| match dim {
                Dim::Literal(n) => Ok(*n),
                Dim::Var(name) => block
                    .get(name)
                    .and_then(|(entry, bytes)| cast_scalar::<u64>(entry.ctype, bytes))
                    .ok_or_else(|| ContainerError::MissingDimension {
                        path: path.to_string(),
                        dim: name.clone(),
                    }),
            })
            .collect()
    }

    /// Finish the current step. Collective; a no-op when no step is open.
    pub fn close(&mut self) -> Result<(), ContainerError> {
        let Some(block) = self.block.take() else {
            return Ok(());
        };
        if block.data_len() as u64 > self.committed_size {
            self.over_budget_steps += 1;
            log::warn!(
                "step payload of {} bytes for `{}` exceeds the declared group size of {} bytes",
                block.data_len(),
                self.path.as_deref().map(|p| p.display().to_string()).unwrap_or_default(),
                self.committed_size
            );
        }
        if self.options.transport.discards_data() {
            log::debug!("transport {} discards step data", self.options.transport);
            self.steps_written += 1;
            return Ok(());
        }

        let encoded = block.encode()?;
        let gathered = gather_bytes(&self.comm, 0, &encoded)?;
        let mut status = Ok(());
        if let Some(blocks) = gathered {
            status = match self.file.as_mut() {
                Some(file) => file.write_step(&blocks).map(|step| {
                    log::info!(
                        "wrote step {step} of `{}` ({} blocks)",
                        file.path().display(),
                        blocks.len()
                    );
                }),
                None => Err(ContainerError::NotOpen),
            };
        }
        self.agree(status, "close")?;
        self.steps_written += 1;
        Ok(())
    }
}

impl<C: Communicator> Drop for Writer<C> {
    fn drop(&mut self) {
        if self.block.is_some() {
            log::warn!(
                "writer dropped with an open step on `{}`; step discarded",
                self.path.as_deref().map(|p| p.display().to_string()).unwrap_or_default()
            );
        }
        if let Some(file) = self.file.as_mut() {
            if let Err(e) = file.sync() {
                log::warn!("failed to sync `{}`: {e}", file.path().display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("mesh_bp_writer_{}_{name}.bp", std::process::id()))
    }

    #[test]
    fn group_size_accumulates_literal_shapes() {
        let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
        w.define_scalar::<f64>("/TimeStamp").unwrap();
        w.define_array::<f32>("/grid/CellData/Pressure", &[Dim::from(100usize)], Transform::None)
            .unwrap();
        w.define_scalar::<i32>("/n").unwrap();
        w.define_array::<i64>("/ids", &[Dim::from("/n")], Transform::None).unwrap();
        assert_eq!(w.group_size(), 8 + 400 + 4);
        assert!(matches!(
            w.define_scalar::<f64>("/TimeStamp"),
            Err(ContainerError::DuplicateDefinition(_))
        ));
        assert_eq!(w.group_size(), 412);
        assert!(matches!(
            w.define_array::<f64>("/bad", &[Dim::from("/missing")], Transform::None),
            Err(ContainerError::MissingDimension { .. })
        ));
        assert!(matches!(
            w.define_array::<f64>("/flat", &[], Transform::None),
            Err(ContainerError::InvalidDimensionality(_))
        ));
    }

    #[test]
    fn sized_named_shapes_count_toward_the_budget() {
        let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
        w.define_scalar::<i32>("/n").unwrap();
        w.define_array_sized::<f32>("/p", &[Dim::from("/n")], Transform::None, 100)
            .unwrap();
        assert_eq!(w.group_size(), 4 + 400);
        w.define_array_sized::<f64>("/lit", &[Dim::from(2usize)], Transform::None, 100)
            .unwrap();
        assert_eq!(w.group_size(), 404 + 16);
    }

    #[test]
    fn overflowing_shapes_are_rejected() {
        let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
        assert!(matches!(
            w.define_array::<u8>("/wide", &[Dim::Literal(u64::MAX), Dim::Literal(2)], Transform::None),
            Err(ContainerError::InvalidDimensionality(_))
        ));
        assert!(matches!(
            w.define_array::<f64>("/bytes", &[Dim::Literal(u64::MAX / 2)], Transform::None),
            Err(ContainerError::InvalidDimensionality(_))
        ));
        w.define_scalar::<i64>("/n").unwrap();
        assert!(matches!(
            w.define_array_sized::<f64>("/hint", &[Dim::from("/n")], Transform::None, u64::MAX),
            Err(ContainerError::InvalidDimensionality(_))
        ));
        assert_eq!(w.group_size(), 8);
        assert!(!w.is_defined("/wide"));
    }

    #[test]
    fn oversized_steps_are_counted() {
        let path = scratch("over_budget");
        let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
        w.define_scalar::<str>("/label").unwrap();
        w.define_scalar::<i32>("/n").unwrap();
        w.define_array::<f64>("/v", &[Dim::from("/n")], Transform::None).unwrap();
        assert_eq!(w.group_size(), 1 + 4);

        w.open(&path, false).unwrap();
        w.write_string("/label", "x").unwrap();
        w.write_scalar("/n", 0i32).unwrap();
        w.write_array::<f64>("/v", &[]).unwrap();
        w.close().unwrap();
        assert_eq!(w.over_budget_steps(), 0);

        w.open(&path, true).unwrap();
        w.write_string("/label", "a label longer than one byte").unwrap();
        w.close().unwrap();
        w.open(&path, true).unwrap();
        w.write_scalar("/n", 3i32).unwrap();
        w.write_array("/v", &[1.0f64, 2.0, 3.0]).unwrap();
        w.close().unwrap();
        assert_eq!(w.over_budget_steps(), 2);
        assert_eq!(w.steps_written(), 3);
        drop(w);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn protocol_order_is_enforced() {
        let path = scratch("order");
        let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
        w.define_scalar::<i32>("/n").unwrap();
        w.define_array::<u8>("/a", &[Dim::from("/n"), Dim::from(2usize)], Transform::None)
            .unwrap();
        assert!(matches!(
            w.write_scalar("/n", 3i32),
            Err(ContainerError::StepNotOpen(_))
        ));
        w.open(&path, false).unwrap();
        assert!(matches!(
            w.open(&path, false),
            Err(ContainerError::AlreadyOpen(_))
        ));
        assert!(matches!(
            w.define_scalar::<f64>("/late"),
            Err(ContainerError::DefineAfterWrite(_))
        ));
        assert!(matches!(
            w.write_array("/a", &[1u8, 2]),
            Err(ContainerError::MissingDimension { .. })
        ));
        w.write_scalar("/n", 3i32).unwrap();
        assert!(matches!(
            w.write_array("/a", &[1u8, 2]),
            Err(ContainerError::ShapeMismatch { expected: 6, actual: 2, .. })
        ));
        assert!(matches!(
            w.write_scalar("/n", 3i64),
            Err(ContainerError::TypeMismatch { .. })
        ));
        assert!(matches!(
            w.write_scalar("/nope", 1i32),
            Err(ContainerError::UndefinedVariable(_))
        ));
        w.write_array("/a", &[1u8, 2, 3, 4, 5, 6]).unwrap();
        w.close().unwrap();
        w.close().unwrap();
        assert_eq!(w.steps_written(), 1);
        drop(w);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn reinitialize_checks_identity() {
        let w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
        assert!(w.reinitialize(&NoComm).is_ok());
        let other = crate::algs::communicator::LocalComm::world(2);
        assert!(matches!(
            w.reinitialize(&other[1]),
            Err(ContainerError::AlreadyInitialized)
        ));
    }

    #[test]
    fn null_transport_writes_nothing() {
        let path = scratch("null");
        let opts = WriterOptions {
            transport: TransportMethod::Null,
            ..Default::default()
        };
        let mut w = Writer::initialize(NoComm, opts).unwrap();
        w.define_scalar::<f64>("/t").unwrap();
        w.open(&path, false).unwrap();
        w.write_scalar("/t", 1.0f64).unwrap();
        w.close().unwrap();
        assert!(!path.exists());
    }
}
