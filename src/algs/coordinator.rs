//! Parallel piece/time-step coordination on top of the writer and reader.
//!
//! Writing: every rank writes its own piece (one block per rank) and each
//! call to [`ParallelWriter::write_step`] appends one step stamped with a
//! `/TimeStamp` value. Rank 0 records the piece count as the
//! `NumberOfPieces` attribute.
//!
//! Reading: rank 0 discovers the piece count and time-step values and
//! broadcasts them; every rank then resolves requested times locally and
//! reads the contiguous range of pieces assigned to it.

use crate::algs::communicator::{Communicator, broadcast_bytes};
use crate::algs::pieces::PieceAssignment;
use crate::algs::timesteps::TimeStepCatalog;
use crate::algs::wire::cast_slice;
use crate::container::dir_tree::DirTree;
use crate::container::methods::Transform;
use crate::container::reader::{Reader, ReaderOptions};
use crate::container::types::from_bytes;
use crate::container::writer::{Writer, WriterOptions};
use crate::container_error::ContainerError;
use crate::data::dataset::DataSet;
use crate::io;
use std::path::{Path, PathBuf};

/// Scalar carrying the time value of each step.
pub const TIME_STAMP: &str = "/TimeStamp";
/// Attribute carrying the number of pieces per step.
pub const NUMBER_OF_PIECES: &str = "NumberOfPieces";
/// Root path of the dataset inside the container.
pub const DATASET_ROOT: &str = "/";

/// Coordinator configuration shared by both directions.
#[derive(Clone, Debug, Default)]
pub struct CoordinatorOptions {
    /// Reading workers to split pieces over; defaults to the communicator
    /// size.
    pub requested_width: Option<usize>,
    /// Time value of each written step, in order.
    pub time_steps: Vec<f64>,
    /// Wrap around `time_steps` instead of running past its end.
    pub loop_time_steps: bool,
    /// Transform tag attached to every array declaration.
    pub transform: Transform,
}

/// Writes one piece per rank, one step per call.
pub struct ParallelWriter<C: Communicator> {
    writer: Writer<C>,
    path: PathBuf,
    options: CoordinatorOptions,
    defined: bool,
    step: usize,
}

impl<C: Communicator> ParallelWriter<C> {
    pub fn new(
        comm: C,
        path: impl AsRef<Path>,
        writer_options: WriterOptions,
        options: CoordinatorOptions,
    ) -> Result<Self, ContainerError> {
        Ok(Self {
            writer: Writer::initialize(comm, writer_options)?,
            path: path.as_ref().to_path_buf(),
            options,
            defined: false,
            step: 0,
        })
    }

    pub fn writer(&self) -> &Writer<C> {
        &self.writer
    }

    pub fn steps_written(&self) -> usize {
        self.step
    }

    /// Declare the layout of `dataset`. Called implicitly by the first
    /// [`ParallelWriter::write_step`].
    pub fn define(&mut self, dataset: &DataSet) -> Result<(), ContainerError> {
        if self.defined {
            return Ok(());
        }
        self.writer.define_scalar::<f64>(TIME_STAMP)?;
        io::define(&mut self.writer, DATASET_ROOT, dataset, self.options.transform)?;
        if self.writer.rank() == 0 {
            let pieces = self.writer.comm().size() as i32;
            self.writer.define_attribute(NUMBER_OF_PIECES, pieces)?;
        }
        self.defined = true;
        Ok(())
    }

    /// Time value stamped on the next step.
    pub fn next_time(&self) -> f64 {
        let times = &self.options.time_steps;
        match times.len() {
            0 => self.step as f64,
            n if self.options.loop_time_steps => times[self.step % n],
            n => times.get(self.step).copied().unwrap_or(times[n - 1]),
        }
    }

    /// Append one step holding this rank's piece. Collective.
    pub fn write_step(&mut self, dataset: &DataSet) -> Result<usize, ContainerError> {
        self.define(dataset)?;
        let time = self.next_time();
        self.writer.open(&self.path, self.step > 0)?;
        let written = self
            .writer
            .write_scalar(TIME_STAMP, time)
            .and_then(|()| io::write(&mut self.writer, DATASET_ROOT, dataset));
        // close even after a failed write so the other ranks are not left
        // waiting in the gather
        let closed = self.writer.close();
        written?;
        closed?;
        log::debug!("rank {} wrote step {} at t = {time}", self.writer.rank(), self.step);
        self.step += 1;
        Ok(self.step - 1)
    }
}

/// Reads the pieces assigned to this rank.
pub struct ParallelReader<C: Communicator> {
    reader: Reader<C>,
    path: PathBuf,
    options: CoordinatorOptions,
    tree: Option<DirTree>,
    catalog: TimeStepCatalog,
    num_pieces: usize,
    assignment: PieceAssignment,
}

impl<C: Communicator> ParallelReader<C> {
    pub fn new(
        comm: C,
        path: impl AsRef<Path>,
        reader_options: ReaderOptions,
        options: CoordinatorOptions,
    ) -> Result<Self, ContainerError> {
        let reader = Reader::initialize(comm, reader_options)?;
        let width = options.requested_width.unwrap_or(reader.comm().size());
        let assignment = PieceAssignment::new(0, width, reader.rank());
        Ok(Self {
            reader,
            path: path.as_ref().to_path_buf(),
            options,
            tree: None,
            catalog: TimeStepCatalog::default(),
            num_pieces: 0,
            assignment,
        })
    }

    pub fn reader(&self) -> &Reader<C> {
        &self.reader
    }

    pub fn num_pieces(&self) -> usize {
        self.num_pieces
    }

    pub fn time_steps(&self) -> &TimeStepCatalog {
        &self.catalog
    }

    pub fn assignment(&self) -> &PieceAssignment {
        &self.assignment
    }

    /// Path tree of the open container, once metadata was read.
    pub fn tree(&self) -> Option<&DirTree> {
        self.tree.as_ref()
    }

    /// Change how many workers share the pieces.
    pub fn set_requested_width(&mut self, width: usize) {
        self.options.requested_width = Some(width);
        self.assignment.update(self.num_pieces, width);
    }

    fn discover_on_root(&self) -> (usize, Vec<f64>) {
        let pieces = match self.reader.attribute(NUMBER_OF_PIECES) {
            Some(attr) => attr.value_as::<usize>().unwrap_or_else(|e| {
                log::warn!("unreadable {NUMBER_OF_PIECES} attribute ({e}); assuming 1");
                1
            }),
            None => {
                log::warn!("no {NUMBER_OF_PIECES} attribute; assuming 1");
                1
            }
        };
        let times = match self.reader.var(TIME_STAMP) {
            Some(var) => var.all_values::<f64>().unwrap_or_else(|e| {
                log::warn!("unreadable {TIME_STAMP} values ({e}); no time steps");
                Vec::new()
            }),
            None => Vec::new(),
        };
        (pieces, times)
    }

    /// Open the container and agree on the piece count and time steps.
    /// Collective on first call; later calls return the same tree.
    pub fn open_and_read_metadata(&mut self) -> Result<&DirTree, ContainerError> {
        if self.tree.is_none() {
            self.read_metadata()?;
        }
        self.tree.as_ref().ok_or(ContainerError::NotOpen)
    }

    fn read_metadata(&mut self) -> Result<(), ContainerError> {
        let opened = self.reader.open_file(&self.path);
        let comm_rank = self.reader.rank();

        let mut header = [0u64; 3];
        let mut times = Vec::new();
        if comm_rank == 0 && opened.is_ok() {
            let (pieces, t) = self.discover_on_root();
            header = [1, pieces as u64, t.len() as u64];
            times = t;
        }
        let header_bytes = broadcast_bytes(self.reader.comm(), 0, cast_slice(&header).to_vec())?;
        let header: Vec<u64> = from_bytes(&header_bytes);
        let times_bytes = broadcast_bytes(self.reader.comm(), 0, cast_slice(&times).to_vec())?;
        opened?;

        let (ok, pieces, count) = match header.as_slice() {
            [ok, pieces, count] => (*ok == 1, *pieces as usize, *count as usize),
            _ => return Err(ContainerError::Comm("short metadata header".into())),
        };
        if !ok {
            return Err(ContainerError::Comm("metadata discovery failed on rank 0".into()));
        }
        let times: Vec<f64> = from_bytes(&times_bytes);
        if times.len() != count {
            return Err(ContainerError::Comm(format!(
                "expected {count} time steps, received {}",
                times.len()
            )));
        }

        self.num_pieces = pieces;
        self.catalog = TimeStepCatalog::new(times);
        let width = self
            .options
            .requested_width
            .unwrap_or(self.reader.comm().size());
        self.assignment.update(pieces, width);
        self.tree = Some(DirTree::build(&self.reader));
        log::info!(
            "rank {comm_rank}: {pieces} pieces, {} time steps, reading pieces {:?}",
            self.catalog.len(),
            self.assignment.range()
        );
        Ok(())
    }

    /// Container step holding `time`. Without a time catalog every request
    /// maps to the first step.
    pub fn resolve_step(&self, time: f64) -> usize {
        let first = self.reader.step_range().map(|(first, _)| first).unwrap_or(0);
        if self.catalog.is_empty() {
            return first;
        }
        match self.catalog.index_of(time) {
            Some(i) => first + i,
            None => {
                log::warn!("no step at t = {time}; using the first step");
                first
            }
        }
    }

    /// Read this rank's pieces at `time`. A piece that fails is logged and
    /// left out; an empty assignment yields an empty result.
    pub fn request(&mut self, time: f64) -> Result<Vec<(usize, DataSet)>, ContainerError> {
        self.open_and_read_metadata()?;
        let step = self.resolve_step(time);
        let Some(tree) = self.tree.as_ref() else {
            return Err(ContainerError::NotOpen);
        };

        let mut pending = Vec::new();
        for piece in self.assignment.range() {
            match io::read(&mut self.reader, tree, DATASET_ROOT, step, piece) {
                Ok(Some(p)) => pending.push((piece, p)),
                Ok(None) => log::debug!("piece {piece} holds no dataset at step {step}"),
                Err(e) => log::warn!("skipping piece {piece} at step {step}: {e}"),
            }
        }
        self.reader.wait_for_reads()?;

        let mut out = Vec::with_capacity(pending.len());
        for (piece, p) in pending {
            match p.finish() {
                Ok(ds) => out.push((piece, ds)),
                Err(e) => log::warn!("dropping piece {piece} at step {step}: {e}"),
            }
        }
        Ok(out)
    }
}
