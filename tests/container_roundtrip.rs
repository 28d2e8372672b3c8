mod util;

use mesh_bp::prelude::*;
use serial_test::serial;
use util::{payload, scratch};

fn write_pressure_steps(path: &std::path::Path, steps: &[(f64, Vec<f32>)]) {
    let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
    w.define_scalar::<f64>("/TimeStamp").unwrap();
    w.define_array::<f32>("/grid/CellData/Pressure", &[Dim::from(100usize)], Transform::None)
        .unwrap();
    assert_eq!(w.group_size(), 8 + 400);
    for (k, (t, values)) in steps.iter().enumerate() {
        w.open(path, k > 0).unwrap();
        w.write_scalar("/TimeStamp", *t).unwrap();
        w.write_array("/grid/CellData/Pressure", values).unwrap();
        w.close().unwrap();
    }
    assert_eq!(w.steps_written(), steps.len() as u64);
}

#[test]
#[serial]
fn pressure_step_end_to_end() {
    let path = scratch("pressure");
    let values = payload(1, 100);
    write_pressure_steps(&path, &[(0.5, values.clone())]);

    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    assert_eq!(r.step_range(), Some((0, 0)));
    assert_eq!(r.scalars().count(), 1);
    assert_eq!(r.arrays().count(), 1);
    assert_eq!(r.var("/TimeStamp").unwrap().value::<f64>(0).unwrap(), 0.5);

    let pressure = r.var("/grid/CellData/Pressure").unwrap();
    assert_eq!(pressure.ctype(), ContainerType::Real);
    assert_eq!(pressure.dims(), &[100]);
    assert!(!pressure.is_scalar());

    let tree = DirTree::build(&r);
    let cell_data = tree.get_dir("/grid/CellData/Pressure", 1).unwrap();
    assert_eq!(cell_data.name(), "CellData");
    assert!(cell_data.array("Pressure").is_some());
    assert!(tree.get_dir("/grid/PointData", 0).is_none());
    let listing = tree.to_string();
    assert!(listing.contains("Scalar: TimeStamp"));
    assert!(listing.contains("Array: Pressure[100]"));

    let handle = r.schedule_read_array::<f32>("/grid/CellData/Pressure", 0, None).unwrap();
    assert!(!handle.is_ready());
    assert_eq!(r.pending(), 1);
    let summary = r.wait_for_reads().unwrap();
    assert_eq!(summary.buffers, 1);
    assert_eq!(r.pending(), 0);
    assert_eq!(handle.take().unwrap(), values);
    r.close();
    r.close();
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn adjacent_reads_merge_into_one_transfer() {
    let path = scratch("batching");
    let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
    for name in ["/a", "/b", "/c"] {
        w.define_array::<f64>(name, &[Dim::from(16usize)], Transform::None).unwrap();
    }
    w.open(&path, false).unwrap();
    for (i, name) in ["/a", "/b", "/c"].into_iter().enumerate() {
        w.write_array(name, &[i as f64; 16]).unwrap();
    }
    w.close().unwrap();
    drop(w);

    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    let handles: Vec<_> = ["/c", "/a", "/b"]
        .into_iter()
        .map(|n| r.schedule_read_array::<f64>(n, 0, Some(0)).unwrap())
        .collect();
    let summary = r.read_arrays().unwrap();
    assert_eq!(summary.buffers, 3);
    assert_eq!(summary.transfers, 1);
    assert_eq!(handles[0].take().unwrap(), vec![2.0; 16]);
    assert_eq!(handles[1].take().unwrap(), vec![0.0; 16]);

    let a = r.schedule_read_array::<f64>("/a", 0, None).unwrap();
    let c = r.schedule_read_array::<f64>("/c", 0, None).unwrap();
    assert_eq!(r.read_arrays().unwrap().transfers, 2);
    assert!(a.is_ready() && c.is_ready());

    assert_eq!(r.read_arrays().unwrap(), Default::default());
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn mismatched_read_type_fails_the_batch() {
    let path = scratch("mismatch");
    write_pressure_steps(&path, &[(0.0, vec![1.0; 100])]);

    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    let ok = r.schedule_read_array::<f32>("/grid/CellData/Pressure", 0, None).unwrap();
    let _bad = r.schedule_read_array::<f64>("/grid/CellData/Pressure", 0, None).unwrap();
    let err = r.read_arrays().unwrap_err();
    assert!(matches!(
        err,
        ContainerError::TypeMismatch {
            expected: ContainerType::Double,
            found: ContainerType::Real,
            ..
        }
    ));
    assert!(!ok.is_ready());
    assert_eq!(r.pending(), 0);
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn lookup_errors() {
    let path = scratch("lookups");
    write_pressure_steps(&path, &[(0.0, vec![0.0; 100])]);

    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    assert!(matches!(
        r.open_file(&path),
        Err(ContainerError::AlreadyOpen(_))
    ));
    assert!(matches!(
        r.schedule_read_array::<f32>("/nope", 0, None),
        Err(ContainerError::ArrayNotFound(_))
    ));
    assert!(matches!(
        r.schedule_read_array::<f64>("/TimeStamp", 0, None),
        Err(ContainerError::ArrayNotFound(_))
    ));
    assert!(matches!(
        r.schedule_read_array_by_id::<f32>(99, 0, None),
        Err(ContainerError::ArrayIdNotFound(99))
    ));
    assert!(matches!(
        r.schedule_read_array::<f32>("/grid/CellData/Pressure", 3, None),
        Err(ContainerError::StepOutOfRange { step: 3, .. })
    ));
    assert!(matches!(
        r.schedule_read_array::<f32>("/grid/CellData/Pressure", 0, Some(1)),
        Err(ContainerError::BlockOutOfRange { block: 1, .. })
    ));
    assert!(matches!(
        r.var("/TimeStamp").unwrap().value::<f32>(0),
        Err(ContainerError::TypeMismatch { .. })
    ));
    assert_eq!(r.var("/TimeStamp").unwrap().value_as::<i64>(0).unwrap(), 0);
    std::fs::remove_file(&path).ok();
}

#[test]
fn missing_file_is_an_io_error() {
    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    let err = r.open_file(scratch("does_not_exist")).unwrap_err();
    assert!(matches!(err, ContainerError::Io(_)));
    assert!(!r.is_open());
}

#[test]
#[serial]
fn appended_steps_accumulate() {
    let path = scratch("append");
    write_pressure_steps(&path, &[(0.0, vec![0.0; 100]), (0.5, vec![1.0; 100])]);
    // a fresh writer continues the step numbering of the existing file
    write_pressure_steps_appending(&path, 1.0, vec![2.0; 100]);

    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    assert_eq!(r.num_steps(), 3);
    assert_eq!(r.step_range(), Some((0, 2)));
    let times = r.var("/TimeStamp").unwrap().all_values::<f64>().unwrap();
    assert_eq!(times, vec![0.0, 0.5, 1.0]);
    let last = r.schedule_read_array::<f32>("/grid/CellData/Pressure", 2, None).unwrap();
    r.wait_for_reads().unwrap();
    assert_eq!(last.take().unwrap(), vec![2.0; 100]);
    std::fs::remove_file(&path).ok();
}

fn write_pressure_steps_appending(path: &std::path::Path, t: f64, values: Vec<f32>) {
    let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
    w.define_scalar::<f64>("/TimeStamp").unwrap();
    w.define_array::<f32>("/grid/CellData/Pressure", &[Dim::from(100usize)], Transform::None)
        .unwrap();
    w.open(path, true).unwrap();
    w.write_scalar("/TimeStamp", t).unwrap();
    w.write_array("/grid/CellData/Pressure", &values).unwrap();
    w.close().unwrap();
}

#[test]
#[serial]
fn streaming_exposes_one_step_at_a_time() {
    let path = scratch("stream");
    write_pressure_steps(&path, &[(0.0, vec![0.0; 100]), (0.25, vec![1.0; 100])]);

    let opts = ReaderOptions {
        method: ReadMethod::FlexPath,
        ..Default::default()
    };
    let mut r = Reader::initialize(NoComm, opts).unwrap();
    r.open_file(&path).unwrap();
    assert_eq!(r.num_steps(), 1);
    assert_eq!(r.var("/TimeStamp").unwrap().value::<f64>(0).unwrap(), 0.0);

    assert_eq!(r.advance().unwrap(), StepStatus::Ready(1));
    assert_eq!(r.step_range(), Some((1, 1)));
    assert_eq!(r.var("/TimeStamp").unwrap().value::<f64>(1).unwrap(), 0.25);
    let h = r.schedule_read_array::<f32>("/grid/CellData/Pressure", 1, None).unwrap();
    r.wait_for_reads().unwrap();
    assert_eq!(h.take().unwrap(), vec![1.0; 100]);

    assert_eq!(r.advance().unwrap(), StepStatus::EndOfStream);
    assert!(r.vars().is_empty());
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn file_method_cannot_advance() {
    let path = scratch("no_advance");
    write_pressure_steps(&path, &[(0.0, vec![0.0; 100])]);
    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    assert!(matches!(
        r.advance(),
        Err(ContainerError::UnsupportedMethod(_))
    ));
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn writer_protocol_errors() {
    let path = scratch("protocol");
    let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
    w.define_scalar::<i32>("/n").unwrap();
    w.define_array::<f64>("/v", &[Dim::from("/n")], Transform::Zlib).unwrap();
    assert!(matches!(
        w.define_array::<f64>("/w", &[Dim::from("/missing")], Transform::None),
        Err(ContainerError::MissingDimension { .. })
    ));
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
        w.write_array("/v", &[1.0f64; 3]),
        Err(ContainerError::MissingDimension { .. })
    ));
    w.write_scalar("/n", 3i32).unwrap();
    assert!(matches!(
        w.write_array("/v", &[1.0f64; 2]),
        Err(ContainerError::ShapeMismatch {
            expected: 3,
            actual: 2,
            ..
        })
    ));
    assert!(matches!(
        w.write_scalar("/undeclared", 1.0f64),
        Err(ContainerError::UndefinedVariable(_))
    ));
    w.write_array("/v", &[1.0f64, 2.0, 3.0]).unwrap();
    w.close().unwrap();
    w.close().unwrap();
    drop(w);

    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    assert_eq!(r.var("/v").unwrap().dims(), &[3]);
    let v = r.schedule_read_array::<f64>("/v", 0, None).unwrap();
    r.wait_for_reads().unwrap();
    assert_eq!(v.take().unwrap(), vec![1.0, 2.0, 3.0]);
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn attributes_and_strings_survive() {
    let path = scratch("attrs");
    let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
    w.define_attribute("NumberOfPieces", 4i32).unwrap();
    w.define_string_attribute("Title", "wind tunnel").unwrap();
    w.define_scalar::<str>("/label").unwrap();
    w.open(&path, false).unwrap();
    w.write_string("/label", "run-7").unwrap();
    w.close().unwrap();
    drop(w);

    let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
    r.open_file(&path).unwrap();
    assert_eq!(r.attributes().len(), 2);
    assert_eq!(r.attribute("NumberOfPieces").unwrap().value::<i32>().unwrap(), 4);
    assert_eq!(r.attribute("NumberOfPieces").unwrap().value_as::<usize>().unwrap(), 4);
    assert_eq!(r.attribute("Title").unwrap().string_value().unwrap(), "wind tunnel");
    let label = r.var("/label").unwrap();
    assert_eq!(label.ctype(), ContainerType::String);
    assert_eq!(label.string_value(0).unwrap(), "run-7");
    std::fs::remove_file(&path).ok();
}

#[test]
#[serial]
fn attributes_follow_every_new_file() {
    let paths = [scratch("attrs_a"), scratch("attrs_b"), scratch("attrs_c")];
    std::fs::remove_file(&paths[2]).ok();
    let mut w = Writer::initialize(NoComm, WriterOptions::default()).unwrap();
    w.define_attribute("NumberOfPieces", 1i32).unwrap();
    w.define_string_attribute("Title", "sweep").unwrap();
    w.define_scalar::<f64>("/TimeStamp").unwrap();
    for (k, (path, append)) in [(&paths[0], false), (&paths[1], false), (&paths[2], true), (&paths[0], false)]
        .into_iter()
        .enumerate()
    {
        w.open(path, append).unwrap();
        w.write_scalar("/TimeStamp", k as f64).unwrap();
        w.close().unwrap();
    }
    drop(w);

    for (path, time) in paths.iter().zip([3.0, 1.0, 2.0]) {
        let mut r = Reader::initialize(NoComm, ReaderOptions::default()).unwrap();
        r.open_file(path).unwrap();
        assert_eq!(r.attributes().len(), 2, "{}", path.display());
        assert_eq!(r.attribute("NumberOfPieces").unwrap().value::<i32>().unwrap(), 1);
        assert_eq!(r.attribute("Title").unwrap().string_value().unwrap(), "sweep");
        assert_eq!(r.step_range(), Some((0, 0)));
        assert_eq!(r.var("/TimeStamp").unwrap().value::<f64>(0).unwrap(), time);
        r.close();
        std::fs::remove_file(path).ok();
    }
}
