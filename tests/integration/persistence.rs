//! Integration tests for saving and restoring workspace state

use crate::integration::test_utils::{Fixture, WORKSPACE_LOCATION};
use canopy::config::WorkspaceConfig;
use canopy::markers::{attributes, types, MarkerAttributes, MarkerValue};
use canopy::monitor::NullMonitor;
use canopy::save::SaveRecord;
use canopy::store::{SaveStore, SledSaveStore};
use canopy::{Container, CreateFlags, Project, QualifiedName, UpdateFlags, Workspace};
use tempfile::TempDir;

fn partner() -> QualifiedName {
    QualifiedName::new("org.team", "vcs")
}

/// Populate a project with one of every kind of saved state.
fn populate(fx: &Fixture) -> Project {
    let project = fx.project("P");
    let file = project.file("a.c").unwrap();
    fx.ws.create_file(&file, b"int a;", CreateFlags::empty()).unwrap();

    let mut problem = MarkerAttributes::new();
    problem.insert(attributes::MESSAGE.to_string(), MarkerValue::from("unused"));
    fx.ws.create_marker_with(&file, types::PROBLEM, problem).unwrap();
    let mut transient = MarkerAttributes::new();
    transient.insert(attributes::TRANSIENT.to_string(), MarkerValue::Boolean(true));
    fx.ws.create_marker_with(&file, types::TASK, transient).unwrap();

    fx.ws
        .set_persistent_property(&file, QualifiedName::new("org.example", "owner"), Some("alice"))
        .unwrap();
    fx.ws.register_sync_partner(partner());
    fx.ws.set_sync_info(&partner(), &file, Some(b"1.1")).unwrap();
    let gone = project.file("gone.c").unwrap();
    fx.ws.create_file(&gone, b"", CreateFlags::empty()).unwrap();
    fx.ws.set_sync_info(&partner(), &gone, Some(b"1.2")).unwrap();
    fx.ws.delete(&gone, UpdateFlags::empty(), &NullMonitor).unwrap();
    project
}

#[test]
fn test_save_records_skip_transient_markers() {
    let fx = Fixture::new();
    populate(&fx);

    let records = fx.ws.save_records();
    let markers: Vec<_> = records
        .iter()
        .filter_map(|r| match r {
            SaveRecord::Marker { marker_type, .. } => Some(marker_type.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(markers, vec![types::PROBLEM]);
    assert!(records.iter().any(|r| matches!(
        r,
        SaveRecord::SyncInfo { phantom: true, path, .. } if path.to_string() == "/P/gone.c"
    )));
}

#[test]
fn test_restore_into_fresh_workspace() {
    let dir = TempDir::new().unwrap();
    let fx = Fixture::new();
    populate(&fx);

    let store = SledSaveStore::new(dir.path().join("state")).unwrap();
    let saved = fx.ws.save(&store).unwrap();
    store.flush().unwrap();
    assert_eq!(saved, 4);

    // a second workspace over the same file system
    let fresh = Workspace::new(WorkspaceConfig::for_location(WORKSPACE_LOCATION), fx.store.clone()).unwrap();
    let project = fresh.root().project("P").unwrap();
    fresh.create_project(&project, None).unwrap();
    fresh.open_project(&project, &NullMonitor).unwrap();

    let applied = fresh.restore(&store).unwrap();
    assert_eq!(applied, 4);

    let file = project.file("a.c").unwrap();
    let markers = fresh
        .find_markers(&file, None, true, canopy::Depth::Zero)
        .unwrap();
    assert_eq!(markers.len(), 1);
    assert_eq!(markers[0].1.string_attribute(attributes::MESSAGE), Some("unused"));
    assert_eq!(
        fresh
            .persistent_property(&file, &QualifiedName::new("org.example", "owner"))
            .unwrap()
            .as_deref(),
        Some("alice")
    );
    assert_eq!(fresh.sync_partners(), vec![partner()]);
    assert_eq!(fresh.sync_info(&partner(), &file).unwrap(), Some(b"1.1".to_vec()));

    let gone = project.file("gone.c").unwrap();
    assert!(fresh.is_phantom(&gone));
    assert_eq!(fresh.sync_info(&partner(), &gone).unwrap(), Some(b"1.2".to_vec()));

    // new markers never reuse a restored id
    let restored_id = markers[0].1.id;
    let next = fresh.create_marker(&file, types::BOOKMARK).unwrap();
    assert!(next > restored_id);
}

#[test]
fn test_restore_skips_records_for_missing_resources() {
    let dir = TempDir::new().unwrap();
    let fx = Fixture::new();
    populate(&fx);
    let store = SledSaveStore::new(dir.path().join("state")).unwrap();
    fx.ws.save(&store).unwrap();

    // no project P here: nothing can be reattached
    let empty = Workspace::new(WorkspaceConfig::for_location("/other"), fx.store.clone()).unwrap();
    assert_eq!(empty.restore(&store).unwrap(), 0);
    assert!(empty.find_markers(&empty.root(), None, true, canopy::Depth::Infinite).unwrap().is_empty());
}

#[test]
fn test_saving_again_replaces_the_stream() {
    let dir = TempDir::new().unwrap();
    let fx = Fixture::new();
    let project = populate(&fx);
    let store = SledSaveStore::new(dir.path().join("state")).unwrap();
    fx.ws.save(&store).unwrap();

    fx.ws
        .delete_markers(&project, None, true, canopy::Depth::Infinite)
        .unwrap();
    let saved = fx.ws.save(&store).unwrap();
    assert_eq!(saved, 3);

    assert_eq!(store.load().unwrap().len(), 3);
}
