//! Integration tests for resource creation, lookup, moves, copies and deletion

use crate::integration::test_utils::{path, Fixture};
use canopy::error::ErrorKind;
use canopy::monitor::NullMonitor;
use canopy::store::FileStore;
use canopy::{
    Container, CreateFlags, DeltaFlags, DeltaKind, Depth, MemberFlags, Resource, ResourceHandle, UpdateFlags,
};

fn names(resources: &[Resource]) -> Vec<String> {
    resources.iter().map(|r| r.name().to_string()).collect()
}

#[test]
fn test_create_and_list_members() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let src = project.folder("src").unwrap();
    fx.ws.create_folder(&src, CreateFlags::empty()).unwrap();
    let main = src.file("main.c").unwrap();
    fx.ws.create_file(&main, b"int main;", CreateFlags::empty()).unwrap();

    assert!(fx.ws.exists(&src));
    assert!(fx.ws.exists(&main));
    assert!(fx.disk_exists("/P/src/main.c"));
    assert_eq!(fx.ws.contents(&main, false).unwrap(), b"int main;");

    let members = fx.ws.members(&project, MemberFlags::empty()).unwrap();
    assert_eq!(names(&members), vec![".project", "src"]);
    let members = fx.ws.members(&src, MemberFlags::empty()).unwrap();
    assert_eq!(members, vec![Resource::File(main.clone())]);

    // a handle of the wrong kind does not exist
    let as_folder = src.folder("main.c").unwrap();
    assert!(!fx.ws.exists(&as_folder));
    assert_eq!(fx.ws.find_member(&fx.ws.root(), "P/src/main.c"), Some(Resource::File(main)));
}

#[test]
fn test_create_rejects_existing_and_orphaned_resources() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.txt").unwrap();
    fx.ws.create_file(&file, b"a", CreateFlags::empty()).unwrap();

    let err = fx.ws.create_file(&file, b"b", CreateFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExists);

    let orphan = project.folder("missing").unwrap().file("x.txt").unwrap();
    let err = fx.ws.create_file(&orphan, b"", CreateFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceNotFound);
}

#[test]
fn test_create_over_existing_local_file_requires_force() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.write_disk("/P/x.txt", b"external");
    let file = project.file("x.txt").unwrap();

    let err = fx.ws.create_file(&file, b"mine", CreateFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfSyncLocal);
    assert!(!fx.ws.exists(&file));

    fx.ws.create_file(&file, b"mine", CreateFlags::FORCE).unwrap();
    assert_eq!(fx.ws.contents(&file, false).unwrap(), b"mine");
}

#[test]
fn test_closed_project_hides_members() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.txt").unwrap();
    fx.ws.create_file(&file, b"a", CreateFlags::empty()).unwrap();

    fx.ws.close_project(&project, &NullMonitor).unwrap();
    assert!(fx.ws.exists(&project));
    assert!(!fx.ws.exists(&file));
    let err = fx.ws.members(&project, MemberFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProjectClosed);
    let err = fx.ws.create_file(&project.file("b.txt").unwrap(), b"", CreateFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProjectClosed);

    let delta = fx.deltas().pop().unwrap();
    let node = delta.find_member(project.path()).unwrap();
    assert!(node.flags().contains(DeltaFlags::OPEN));
    assert!(node.find_member(file.path()).is_none());

    fx.ws.open_project(&project, &NullMonitor).unwrap();
    assert!(fx.ws.exists(&file));
}

#[test]
fn test_refresh_discovers_external_changes() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.write_disk("/P/lib/util.c", b"void f();");

    fx.ws.refresh_local(&project, Depth::Infinite, &NullMonitor).unwrap();
    let delta = fx.single_delta();
    assert_eq!(delta.find_member(&path("/P/lib")).unwrap().kind(), DeltaKind::Added);
    assert_eq!(delta.find_member(&path("/P/lib/util.c")).unwrap().kind(), DeltaKind::Added);

    let util = project.folder("lib").unwrap().file("util.c").unwrap();
    fx.write_disk("/P/lib/util.c", b"void g();");
    fx.ws.refresh_local(&project, Depth::Infinite, &NullMonitor).unwrap();
    let delta = fx.single_delta();
    let changed = delta.find_member(util.path()).unwrap();
    assert_eq!(changed.kind(), DeltaKind::Changed);
    assert!(changed.flags().contains(DeltaFlags::CONTENT));

    fx.store.delete(&fx.disk("/P/lib")).unwrap();
    fx.ws.refresh_local(&project, Depth::Infinite, &NullMonitor).unwrap();
    let delta = fx.single_delta();
    assert_eq!(delta.find_member(&path("/P/lib")).unwrap().kind(), DeltaKind::Removed);
    assert!(!fx.ws.exists(&util));
}

#[test]
fn test_refresh_depth_zero_leaves_members_alone() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.write_disk("/P/late.txt", b"x");

    fx.ws.refresh_local(&project, Depth::Zero, &NullMonitor).unwrap();
    assert!(!fx.ws.exists(&project.file("late.txt").unwrap()));
    fx.ws.refresh_local(&project, Depth::One, &NullMonitor).unwrap();
    assert!(fx.ws.exists(&project.file("late.txt").unwrap()));
}

#[test]
fn test_move_file_reports_move_pair() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let a = project.file("a.txt").unwrap();
    fx.ws.create_file(&a, b"payload", CreateFlags::empty()).unwrap();
    fx.drain();

    fx.ws
        .move_resource(&a, &path("/P/b.txt"), UpdateFlags::empty(), &NullMonitor)
        .unwrap();

    let delta = fx.single_delta();
    let from = delta.find_member(&path("/P/a.txt")).unwrap();
    assert_eq!(from.kind(), DeltaKind::Removed);
    assert!(from.flags().contains(DeltaFlags::MOVED_TO));
    assert_eq!(from.moved_to_path(), Some(&path("/P/b.txt")));
    let to = delta.find_member(&path("/P/b.txt")).unwrap();
    assert_eq!(to.kind(), DeltaKind::Added);
    assert_eq!(to.moved_from_path(), Some(&path("/P/a.txt")));

    assert!(!fx.disk_exists("/P/a.txt"));
    let b = project.file("b.txt").unwrap();
    assert_eq!(fx.ws.contents(&b, false).unwrap(), b"payload");
}

#[test]
fn test_copy_folder_creates_new_identities() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let src = project.folder("src").unwrap();
    fx.ws.create_folder(&src, CreateFlags::empty()).unwrap();
    fx.ws
        .create_file(&src.file("a.txt").unwrap(), b"one", CreateFlags::DERIVED)
        .unwrap();
    fx.drain();

    fx.ws
        .copy_resource(&src, &path("/P/copy"), UpdateFlags::empty(), &NullMonitor)
        .unwrap();

    let copied = project.folder("copy").unwrap().file("a.txt").unwrap();
    assert_eq!(fx.ws.contents(&copied, false).unwrap(), b"one");
    assert!(fx.ws.is_derived(&copied, false));
    assert_ne!(
        fx.ws.resource_info(&copied).unwrap().node_id,
        fx.ws.resource_info(&src.file("a.txt").unwrap()).unwrap().node_id
    );

    let delta = fx.single_delta();
    let added = delta.find_member(&path("/P/copy")).unwrap();
    assert_eq!(added.kind(), DeltaKind::Added);
    assert!(added.moved_from_path().is_none());
}

#[test]
fn test_delete_out_of_sync_touches_nothing() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("f").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    fx.ws.create_file(&folder.file("a.txt").unwrap(), b"a", CreateFlags::empty()).unwrap();
    fx.ws.create_file(&folder.file("b.txt").unwrap(), b"b", CreateFlags::empty()).unwrap();
    fx.write_disk("/P/f/b.txt", b"changed behind our back");

    let err = fx.ws.delete(&folder, UpdateFlags::empty(), &NullMonitor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OutOfSyncLocal);
    assert!(fx.disk_exists("/P/f/a.txt"));
    assert!(fx.ws.exists(&folder.file("a.txt").unwrap()));

    fx.ws.delete(&folder, UpdateFlags::FORCE, &NullMonitor).unwrap();
    assert!(!fx.disk_exists("/P/f"));
    assert!(!fx.ws.exists(&folder));
}

#[test]
fn test_rename_project_moves_default_location() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.ws.create_file(&project.file("a.txt").unwrap(), b"a", CreateFlags::empty()).unwrap();

    fx.ws
        .move_resource(&project, &path("/Q"), UpdateFlags::empty(), &NullMonitor)
        .unwrap();

    let renamed = fx.ws.root().project("Q").unwrap();
    assert!(!fx.ws.exists(&project));
    assert!(fx.ws.exists(&renamed.file("a.txt").unwrap()));
    assert!(fx.disk_exists("/Q/a.txt"));
    assert!(!fx.disk_exists("/P"));
    assert_eq!(fx.ws.description(&renamed).unwrap().name, "Q");
}

#[test]
fn test_delete_project_content_follows_open_state() {
    let fx = Fixture::new();
    let open = fx.project("Open");
    let closed = fx.project("Closed");
    fx.ws.close_project(&closed, &NullMonitor).unwrap();

    fx.ws.delete(&open, UpdateFlags::empty(), &NullMonitor).unwrap();
    fx.ws.delete(&closed, UpdateFlags::empty(), &NullMonitor).unwrap();

    assert!(!fx.ws.exists(&open));
    assert!(!fx.ws.exists(&closed));
    assert!(!fx.disk_exists("/Open"));
    assert!(fx.disk_exists("/Closed/.project"));
}

#[test]
fn test_root_cannot_be_deleted() {
    let fx = Fixture::new();
    let err = fx.ws.delete(&fx.ws.root(), UpdateFlags::FORCE, &NullMonitor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DerivedRootOrProject);
}
