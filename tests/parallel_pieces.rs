mod util;

use mesh_bp::prelude::*;
use serial_test::serial;
use std::path::Path;
use util::{run_ranks, scratch};

/// Piece of `rank` at step `step`: `rank + 1` triangles sharing one fan,
/// tagged with the rank and step in their cell data.
fn piece(rank: usize, step: usize) -> DataSet {
    let n = rank + 1;
    let mut coords = vec![0.0f64, 0.0, 0.0];
    for i in 0..=n {
        coords.extend_from_slice(&[i as f64, 1.0, step as f64]);
    }
    let mut ug = UnstructuredGrid {
        points: Some(DataArray::new("Points", 3, coords)),
        ..Default::default()
    };
    for i in 0..n as i64 {
        ug.push_cell(CellType::Triangle, &[0, i + 1, i + 2]);
    }
    ug.cell_data.add_array(DataArray::new("Owner", 1, vec![rank as i32; n]));
    ug.field_data.add_array(DataArray::new("Step", 1, vec![step as i32]));
    ug.into()
}

fn write_pieces(path: &Path, ranks: usize, times: &[f64]) {
    let results = run_ranks(ranks, |comm| {
        let opts = CoordinatorOptions {
            time_steps: times.to_vec(),
            ..Default::default()
        };
        let mut w = ParallelWriter::new(comm, path, WriterOptions::default(), opts)?;
        for step in 0..times.len() {
            let rank = w.writer().rank();
            w.write_step(&piece(rank, step))?;
        }
        Ok::<_, ContainerError>(w.steps_written())
    });
    for r in results {
        assert_eq!(r.unwrap(), times.len());
    }
}

fn check_piece(piece_id: usize, step: usize, ds: &DataSet) {
    let ug = ds.as_unstructured().expect("unstructured piece");
    assert_eq!(ug.num_cells(), piece_id + 1);
    assert_eq!(ug.num_points(), piece_id + 3);
    assert_eq!(
        ug.cell_data.array("Owner").unwrap().values.as_slice::<i32>(),
        Some(&vec![piece_id as i32; piece_id + 1][..])
    );
    assert_eq!(
        ug.field_data.array("Step").unwrap().values.as_slice::<i32>(),
        Some(&[step as i32][..])
    );
}

#[test]
#[serial]
fn three_writers_two_readers() {
    let path = scratch("par_3w2r");
    write_pieces(&path, 3, &[0.0, 0.5]);

    let got = run_ranks(2, |comm| {
        let mut r = ParallelReader::new(comm, &path, ReaderOptions::default(), CoordinatorOptions::default())
            .unwrap();
        r.open_and_read_metadata().unwrap();
        assert_eq!(r.num_pieces(), 3);
        assert_eq!(r.time_steps().values(), &[0.0, 0.5]);
        let pieces = r.request(0.5).unwrap();
        (r.assignment().range(), pieces)
    });

    assert_eq!(got[0].0, 0..2);
    assert_eq!(got[1].0, 2..3);
    for (range, pieces) in &got {
        assert_eq!(pieces.len(), range.len());
        for (id, ds) in pieces {
            assert!(range.contains(id));
            check_piece(*id, 1, ds);
        }
    }
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn surplus_readers_get_nothing() {
    let path = scratch("par_surplus");
    write_pieces(&path, 2, &[1.0]);

    let got = run_ranks(4, |comm| {
        let mut r = ParallelReader::new(comm, &path, ReaderOptions::default(), CoordinatorOptions::default())
            .unwrap();
        let pieces = r.request(1.0).unwrap();
        (r.assignment().is_empty(), pieces.len())
    });
    assert_eq!(got, vec![(false, 1), (false, 1), (true, 0), (true, 0)]);
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn unknown_time_falls_back_to_first_step() {
    let path = scratch("par_fallback");
    write_pieces(&path, 1, &[0.0, 2.0, 4.0]);

    let mut r = ParallelReader::new(NoComm, &path, ReaderOptions::default(), CoordinatorOptions::default())
        .unwrap();
    r.open_and_read_metadata().unwrap();
    assert_eq!(r.resolve_step(4.0), 2);
    assert_eq!(r.resolve_step(3.0), 0);
    assert_eq!(r.resolve_step(-0.0), 0);

    let got = r.request(2.0).unwrap();
    check_piece(0, 1, &got[0].1);
    let got = r.request(17.0).unwrap();
    check_piece(0, 0, &got[0].1);
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn narrower_width_reassigns_pieces() {
    let path = scratch("par_width");
    write_pieces(&path, 4, &[0.0]);

    let mut r = ParallelReader::new(NoComm, &path, ReaderOptions::default(), CoordinatorOptions::default())
        .unwrap();
    r.open_and_read_metadata().unwrap();
    assert_eq!(r.num_pieces(), 4);
    assert_eq!(r.assignment().range(), 0..4);
    r.set_requested_width(3);
    assert_eq!(r.assignment().range(), 0..2);
    let got = r.request(0.0).unwrap();
    let ids: Vec<usize> = got.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![0, 1]);
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn missing_container_fails_everywhere() {
    let path = scratch("par_missing");
    std::fs::remove_file(&path).ok();
    let got = run_ranks(3, |comm| {
        let mut r = ParallelReader::new(comm, &path, ReaderOptions::default(), CoordinatorOptions::default())
            .unwrap();
        r.open_and_read_metadata().is_err()
    });
    assert_eq!(got, vec![true; 3]);
}

#[test]
#[serial]
fn writer_records_piece_count_once() {
    let path = scratch("par_attr");
    write_pieces(&path, 3, &[0.0]);

    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    assert_eq!(r.attributes().len(), 1);
    assert_eq!(r.attribute("NumberOfPieces").unwrap().value::<i32>().unwrap(), 3);
    let ts = r.var("/TimeStamp").unwrap();
    assert_eq!(ts.num_blocks(0), 3);
    assert_eq!(ts.block_dims(0, 2).unwrap(), &[] as &[u64]);
    std::fs::remove_file(&path).ok();
}
