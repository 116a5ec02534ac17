//! Integration tests for markers

use crate::integration::test_utils::{path, Fixture};
use canopy::markers::{attributes, types, MarkerAttributes, MarkerDeltaKind, MarkerValue, SEVERITY_ERROR, SEVERITY_WARNING};
use canopy::monitor::NullMonitor;
use canopy::{Container, CreateFlags, DeltaFlags, Depth, Resource, UpdateFlags};

#[test]
fn test_marker_lifecycle_is_reported() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("main.c").unwrap();
    fx.ws.create_file(&file, b"int main;", CreateFlags::empty()).unwrap();
    fx.drain();

    let id = fx.ws.create_marker(&file, types::PROBLEM).unwrap();
    let delta = fx.single_delta();
    let node = delta.find_member(&path("/P/main.c")).unwrap();
    assert!(node.flags().contains(DeltaFlags::MARKERS));
    assert_eq!(node.marker_deltas().len(), 1);
    assert_eq!(node.marker_deltas()[0].kind, MarkerDeltaKind::Added);

    fx.ws
        .set_marker_attribute(&file, id, attributes::MESSAGE, "missing semicolon")
        .unwrap();
    fx.ws.set_marker_attribute(&file, id, attributes::SEVERITY, SEVERITY_ERROR).unwrap();
    let marker = fx.ws.marker(&file, id).unwrap().unwrap();
    assert_eq!(marker.string_attribute(attributes::MESSAGE), Some("missing semicolon"));
    assert_eq!(marker.int_attribute(attributes::SEVERITY, -1), SEVERITY_ERROR);
    let changes: Vec<_> = fx
        .deltas()
        .iter()
        .flat_map(|d| d.find_member(&path("/P/main.c")).unwrap().marker_deltas().to_vec())
        .collect();
    assert!(changes.iter().all(|c| c.kind == MarkerDeltaKind::Changed));

    assert!(fx.ws.delete_marker(&file, id).unwrap());
    assert!(!fx.ws.delete_marker(&file, id).unwrap());
    assert!(fx.ws.marker(&file, id).unwrap().is_none());
}

#[test]
fn test_find_markers_by_type_and_depth() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("src").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    let file = folder.file("a.c").unwrap();
    fx.ws.create_file(&file, b"", CreateFlags::empty()).unwrap();
    fx.ws.register_marker_type("org.example.lint", &[types::PROBLEM]);

    fx.ws.create_marker(&project, types::TASK).unwrap();
    fx.ws.create_marker(&folder, types::PROBLEM).unwrap();
    fx.ws.create_marker(&file, "org.example.lint").unwrap();
    fx.ws.create_marker(&file, types::BOOKMARK).unwrap();

    let problems = fx.ws.find_markers(&project, Some(types::PROBLEM), true, Depth::Infinite).unwrap();
    assert_eq!(problems.len(), 2);
    let exact = fx.ws.find_markers(&project, Some(types::PROBLEM), false, Depth::Infinite).unwrap();
    assert_eq!(exact.len(), 1);
    assert_eq!(exact[0].0, Resource::Folder(folder.clone()));

    let shallow = fx.ws.find_markers(&project, None, true, Depth::One).unwrap();
    assert_eq!(shallow.len(), 2);
    let everything = fx.ws.find_markers(&project, Some(types::MARKER), true, Depth::Infinite).unwrap();
    assert_eq!(everything.len(), 4);
}

#[test]
fn test_max_problem_severity() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.c").unwrap();
    fx.ws.create_file(&file, b"", CreateFlags::empty()).unwrap();
    assert_eq!(
        fx.ws.find_max_problem_severity(&project, None, true, Depth::Infinite).unwrap(),
        None
    );

    let mut warning = MarkerAttributes::new();
    warning.insert(attributes::SEVERITY.to_string(), MarkerValue::Integer(SEVERITY_WARNING));
    fx.ws.create_marker_with(&file, types::PROBLEM, warning).unwrap();
    // tasks never count, whatever their severity
    let mut task = MarkerAttributes::new();
    task.insert(attributes::SEVERITY.to_string(), MarkerValue::Integer(SEVERITY_ERROR));
    fx.ws.create_marker_with(&file, types::TASK, task).unwrap();

    assert_eq!(
        fx.ws.find_max_problem_severity(&project, None, true, Depth::Infinite).unwrap(),
        Some(SEVERITY_WARNING)
    );
}

#[test]
fn test_delete_markers_in_bulk() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.c").unwrap();
    fx.ws.create_file(&file, b"", CreateFlags::empty()).unwrap();
    for _ in 0..3 {
        fx.ws.create_marker(&file, types::PROBLEM).unwrap();
    }
    fx.ws.create_marker(&file, types::TASK).unwrap();

    let removed = fx
        .ws
        .delete_markers(&project, Some(types::PROBLEM), true, Depth::Infinite)
        .unwrap();
    assert_eq!(removed, 3);
    let left = fx.ws.find_markers(&file, None, true, Depth::Zero).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].1.marker_type, types::TASK);
}

#[test]
fn test_markers_follow_moves_but_not_copies() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.c").unwrap();
    fx.ws.create_file(&file, b"", CreateFlags::empty()).unwrap();
    fx.ws.create_marker(&file, types::BOOKMARK).unwrap();

    fx.ws
        .copy_resource(&file, &path("/P/copy.c"), UpdateFlags::empty(), &NullMonitor)
        .unwrap();
    let copy = project.file("copy.c").unwrap();
    assert!(fx.ws.find_markers(&copy, None, true, Depth::Zero).unwrap().is_empty());

    fx.ws
        .move_resource(&file, &path("/P/moved.c"), UpdateFlags::empty(), &NullMonitor)
        .unwrap();
    let moved = project.file("moved.c").unwrap();
    assert_eq!(fx.ws.find_markers(&moved, None, true, Depth::Zero).unwrap().len(), 1);
}

#[test]
fn test_markers_on_missing_resource_fail() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let err = fx
        .ws
        .create_marker(&project.file("ghost.c").unwrap(), types::PROBLEM)
        .unwrap_err();
    assert!(err.is_not_found());
}
