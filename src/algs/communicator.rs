//! Thin façade over serial, intra-process (threads) or inter-process (MPI)
//! message passing.
//!
//! Messages are *contiguous byte slices* (no zero-copy guarantees).
//! Point-to-point handles are **waitable**; the collectives built on top
//! (`broadcast`, `barrier`, [`gather_bytes`], [`broadcast_bytes`]) block until
//! every participating rank reaches the same call. A rank that skips a
//! collective deadlocks the others.

use crate::algs::wire::{WireLen, cast_slice, pod_from_prefix};
use crate::container_error::ContainerError;
use bytes::Bytes;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Tags reserved by the collectives in this module.
pub const TAG_BROADCAST: u16 = 0xB000;
pub const TAG_BARRIER: u16 = 0xB001;
pub const TAG_GATHER_LEN: u16 = 0xB002;
pub const TAG_GATHER_DATA: u16 = 0xB003;

/// Point-to-point messaging plus the collectives built on it.
pub trait Communicator {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Identity of the process group. Handles onto the same group agree.
    fn world_id(&self) -> u64;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Copy `buf` from `root` into every rank's `buf`.
    fn broadcast(&self, root: usize, buf: &mut [u8]) {
        if self.size() <= 1 {
            return;
        }
        if self.rank() == root {
            for peer in (0..self.size()).filter(|&p| p != root) {
                let _ = self.isend(peer, TAG_BROADCAST, buf).wait();
            }
        } else {
            let len = buf.len();
            let mut scratch = vec![0u8; len];
            if let Some(data) = self.irecv(root, TAG_BROADCAST, &mut scratch).wait() {
                let n = data.len().min(len);
                buf[..n].copy_from_slice(&data[..n]);
            }
        }
    }

    /// Block until every rank arrives.
    fn barrier(&self) {
        if self.size() <= 1 {
            return;
        }
        let mut token = [0u8; 1];
        if self.rank() == 0 {
            for peer in 1..self.size() {
                let _ = self.irecv(peer, TAG_BARRIER, &mut token).wait();
            }
        } else {
            let _ = self.isend(0, TAG_BARRIER, &token).wait();
        }
        self.broadcast(0, &mut token);
    }
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Compile-time no-op comm for pure serial use.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }
    fn size(&self) -> usize {
        1
    }
    fn world_id(&self) -> u64 {
        0
    }
    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}
    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- LocalComm: intra-process / multi-thread ---
type Key = (usize, usize, u16); // (src, dst, tag)

static NEXT_WORLD: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct LocalWorld {
    id: u64,
    mailbox: DashMap<Key, VecDeque<Bytes>>,
}

/// Ranks of one simulated job, each driven from its own thread.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    size: usize,
    world: Arc<LocalWorld>,
}

impl LocalComm {
    /// Create `size` connected ranks; hand one to each thread.
    pub fn world(size: usize) -> Vec<LocalComm> {
        let world = Arc::new(LocalWorld {
            id: NEXT_WORLD.fetch_add(1, Ordering::Relaxed),
            mailbox: DashMap::new(),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                size,
                world: world.clone(),
            })
            .collect()
    }
}

pub struct LocalHandle {
    key: Key,
    len: usize,
    world: Arc<LocalWorld>,
}

impl Wait for LocalHandle {
    fn wait(self) -> Option<Vec<u8>> {
        loop {
            let popped = self
                .world
                .mailbox
                .get_mut(&self.key)
                .and_then(|mut q| q.pop_front());
            if let Some(bytes) = popped {
                let n = bytes.len().min(self.len);
                return Some(bytes[..n].to_vec());
            }
            std::thread::yield_now();
        }
    }
}

impl Communicator for LocalComm {
    type SendHandle = ();
    type RecvHandle = LocalHandle;

    fn rank(&self) -> usize {
        self.rank
    }
    fn size(&self) -> usize {
        self.size
    }
    fn world_id(&self) -> u64 {
        self.world.id
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle {
        let key = (self.rank, peer, tag);
        self.world
            .mailbox
            .entry(key)
            .or_default()
            .push_back(Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle {
        LocalHandle {
            key: (peer, self.rank, tag),
            len: buf.len(),
            world: self.world.clone(),
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::environment::Universe;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    pub struct MpiComm {
        _universe: Universe,
        pub world: SimpleCommunicator,
        pub rank: usize,
        pub size: usize,
    }

    impl MpiComm {
        /// Initialize MPI for the whole process. Returns `None` if MPI is
        /// already initialized elsewhere.
        pub fn new() -> Option<Self> {
            let universe = mpi::initialize()?;
            let world = universe.world();
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Some(Self {
                _universe: universe,
                world,
                rank,
                size,
            })
        }
    }

    pub struct MpiHandle(Option<Vec<u8>>);

    impl Wait for MpiHandle {
        fn wait(self) -> Option<Vec<u8>> {
            self.0
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }
        fn size(&self) -> usize {
            self.size
        }
        fn world_id(&self) -> u64 {
            u64::MAX
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            self.world
                .process_at_rank(peer as i32)
                .send_with_tag(buf, tag as i32);
            MpiHandle(None)
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let (mut data, _status) = self
                .world
                .process_at_rank(peer as i32)
                .receive_vec_with_tag::<u8>(tag as i32);
            data.truncate(buf.len());
            MpiHandle(Some(data))
        }

        fn broadcast(&self, root: usize, buf: &mut [u8]) {
            self.world.process_at_rank(root as i32).broadcast_into(buf);
        }

        fn barrier(&self) {
            self.world.barrier();
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

/// Broadcast a variable-length payload from `root`.
///
/// Only `root`'s `data` is consulted; every rank returns the root's bytes.
pub fn broadcast_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    data: Vec<u8>,
) -> Result<Vec<u8>, ContainerError> {
    if comm.size() <= 1 {
        return Ok(data);
    }
    let mut len = [WireLen::new(data.len())];
    comm.broadcast(root, bytemuck::cast_slice_mut(&mut len));
    let mut payload = if comm.rank() == root {
        data
    } else {
        vec![0u8; len[0].get()]
    };
    if payload.len() != len[0].get() {
        return Err(ContainerError::Comm(format!(
            "broadcast length mismatch: expected {}, have {}",
            len[0].get(),
            payload.len()
        )));
    }
    comm.broadcast(root, &mut payload);
    Ok(payload)
}

/// Gather one variable-length payload per rank onto `root`.
///
/// Returns `Some(pieces)` ordered by rank on `root`, `None` elsewhere.
pub fn gather_bytes<C: Communicator>(
    comm: &C,
    root: usize,
    local: &[u8],
) -> Result<Option<Vec<Bytes>>, ContainerError> {
    let rank = comm.rank();
    let size = comm.size();
    if rank != root {
        let len = WireLen::new(local.len());
        let _ = comm.isend(root, TAG_GATHER_LEN, cast_slice(&[len])).wait();
        let _ = comm.isend(root, TAG_GATHER_DATA, local).wait();
        return Ok(None);
    }

    let mut pieces = Vec::with_capacity(size);
    for peer in 0..size {
        if peer == root {
            pieces.push(Bytes::copy_from_slice(local));
            continue;
        }
        let mut len_buf = [0u8; 8];
        let len = comm
            .irecv(peer, TAG_GATHER_LEN, &mut len_buf)
            .wait()
            .and_then(|buf| pod_from_prefix::<WireLen>(&buf))
            .ok_or_else(|| ContainerError::Comm(format!("no size header from rank {peer}")))?
            .get();
        let mut data_buf = vec![0u8; len];
        let payload = comm
            .irecv(peer, TAG_GATHER_DATA, &mut data_buf)
            .wait()
            .ok_or_else(|| ContainerError::Comm(format!("no payload from rank {peer}")))?;
        if payload.len() != len {
            return Err(ContainerError::Comm(format!(
                "payload length mismatch from rank {peer}: expected {len}, got {}",
                payload.len()
            )));
        }
        pieces.push(Bytes::from(payload));
    }
    Ok(Some(pieces))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_ranks<F>(size: usize, f: F)
    where
        F: Fn(LocalComm) + Send + Sync,
    {
        let comms = LocalComm::world(size);
        std::thread::scope(|s| {
            for comm in comms {
                let f = &f;
                s.spawn(move || f(comm));
            }
        });
    }

    #[test]
    fn local_roundtrip_two_ranks() {
        let comms = LocalComm::world(2);
        let mut recv_buf = [0u8; 4];
        let recv_handle = comms[1].irecv(0, 7, &mut recv_buf);
        comms[0].isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv_handle.wait().expect("data from rank 0");
        recv_buf.copy_from_slice(&data);
        assert_eq!(&recv_buf, &[1, 2, 3, 4]);
    }

    #[test]
    fn local_fifo_and_truncation() {
        let comms = LocalComm::world(2);
        for i in 0..5u8 {
            comms[0].isend(1, 3, &[i, i]);
        }
        let mut out = Vec::new();
        for _ in 0..5 {
            let mut b = [0u8; 1];
            out.push(comms[1].irecv(0, 3, &mut b).wait().unwrap());
        }
        assert_eq!(out, (0u8..5).map(|i| vec![i]).collect::<Vec<_>>());
    }

    #[test]
    fn worlds_are_isolated() {
        let a = LocalComm::world(2);
        let b = LocalComm::world(2);
        assert_ne!(a[0].world_id(), b[0].world_id());
        assert_eq!(a[0].world_id(), a[1].world_id());
    }

    #[test]
    fn broadcast_and_gather() {
        run_ranks(4, |comm| {
            let mine = if comm.rank() == 0 {
                b"catalog".to_vec()
            } else {
                Vec::new()
            };
            let got = broadcast_bytes(&comm, 0, mine).unwrap();
            assert_eq!(got, b"catalog");

            let local = vec![comm.rank() as u8; comm.rank() + 1];
            let gathered = gather_bytes(&comm, 0, &local).unwrap();
            if comm.rank() == 0 {
                let pieces = gathered.unwrap();
                assert_eq!(pieces.len(), 4);
                for (r, piece) in pieces.iter().enumerate() {
                    assert_eq!(piece.as_ref(), vec![r as u8; r + 1].as_slice());
                }
            } else {
                assert!(gathered.is_none());
            }
            comm.barrier();
        });
    }

    #[test]
    fn serial_collectives_are_trivial() {
        let comm = NoComm;
        let mut buf = [9u8; 2];
        comm.broadcast(0, &mut buf);
        comm.barrier();
        assert_eq!(buf, [9, 9]);
        let pieces = gather_bytes(&comm, 0, b"x").unwrap().unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(broadcast_bytes(&comm, 0, b"y".to_vec()).unwrap(), b"y");
    }
}
