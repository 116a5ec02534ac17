//! Integration tests for sync partner info and phantom resources

use crate::integration::test_utils::{path, Fixture};
use canopy::monitor::NullMonitor;
use canopy::{
    Container, CreateFlags, DeltaFlags, DeltaKind, Depth, MemberFlags, QualifiedName, Resource, ResourceHandle,
    UpdateFlags,
};

fn partner() -> QualifiedName {
    QualifiedName::new("org.team", "vcs")
}

#[test]
fn test_sync_info_change_is_reported() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.txt").unwrap();
    fx.ws.create_file(&file, b"a", CreateFlags::empty()).unwrap();
    fx.ws.register_sync_partner(partner());
    fx.drain();

    fx.ws.set_sync_info(&partner(), &file, Some(b"rev-1")).unwrap();
    assert_eq!(fx.ws.sync_info(&partner(), &file).unwrap(), Some(b"rev-1".to_vec()));
    let delta = fx.single_delta();
    assert!(delta.find_member(&path("/P/a.txt")).unwrap().flags().contains(DeltaFlags::SYNC));

    // same bytes again: nothing to report
    fx.ws.set_sync_info(&partner(), &file, Some(b"rev-1")).unwrap();
    assert!(fx.deltas().is_empty());
}

#[test]
fn test_deleted_resource_with_sync_info_leaves_phantom() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("f").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    let tracked = folder.file("tracked.txt").unwrap();
    let untracked = folder.file("scratch.txt").unwrap();
    fx.ws.create_file(&tracked, b"t", CreateFlags::empty()).unwrap();
    fx.ws.create_file(&untracked, b"s", CreateFlags::empty()).unwrap();
    fx.ws.register_sync_partner(partner());
    fx.ws.set_sync_info(&partner(), &tracked, Some(b"1.4")).unwrap();
    fx.drain();

    fx.ws.delete(&folder, UpdateFlags::empty(), &NullMonitor).unwrap();

    assert!(!fx.ws.exists(&tracked));
    assert!(fx.ws.is_phantom(&tracked));
    assert!(fx.ws.is_phantom(&folder));
    assert!(!fx.ws.is_phantom(&untracked));
    assert_eq!(fx.ws.sync_info(&partner(), &tracked).unwrap(), Some(b"1.4".to_vec()));

    let visible = fx.ws.members(&project, MemberFlags::empty()).unwrap();
    assert!(!visible.contains(&Resource::Folder(folder.clone())));
    let all = fx.ws.members(&project, MemberFlags::INCLUDE_PHANTOMS).unwrap();
    assert!(all.contains(&Resource::Folder(folder.clone())));

    let delta = fx.single_delta();
    assert_eq!(delta.find_member(&path("/P/f/tracked.txt")).unwrap().kind(), DeltaKind::Removed);
}

#[test]
fn test_recreating_over_phantom_revives_sync_info() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.txt").unwrap();
    fx.ws.create_file(&file, b"a", CreateFlags::empty()).unwrap();
    fx.ws.register_sync_partner(partner());
    fx.ws.set_sync_info(&partner(), &file, Some(b"r7")).unwrap();
    fx.ws.delete(&file, UpdateFlags::empty(), &NullMonitor).unwrap();
    fx.drain();

    fx.ws.create_file(&file, b"again", CreateFlags::empty()).unwrap();

    assert!(fx.ws.exists(&file));
    assert!(!fx.ws.is_phantom(&file));
    assert_eq!(fx.ws.sync_info(&partner(), &file).unwrap(), Some(b"r7".to_vec()));
    let delta = fx.single_delta();
    assert_eq!(delta.find_member(file.path()).unwrap().kind(), DeltaKind::Added);
}

#[test]
fn test_sync_info_on_missing_resource_creates_phantom_chain() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.ws.register_sync_partner(partner());
    let deep = project.folder("gone").unwrap().file("old.txt").unwrap();

    fx.ws.set_sync_info(&partner(), &deep, Some(b"base")).unwrap();
    assert!(fx.ws.is_phantom(&deep));
    assert!(fx.ws.is_phantom(&project.folder("gone").unwrap()));
    let delta = fx.single_delta();
    let node = delta.find_member(&path("/P/gone/old.txt")).unwrap();
    assert_eq!(node.kind(), DeltaKind::AddedPhantom);
    assert!(node.is_phantom());

    // clearing the only entry prunes the phantom and its empty parent
    fx.ws.set_sync_info(&partner(), &deep, None).unwrap();
    assert!(!fx.ws.is_phantom(&deep));
    assert!(!fx.ws.is_phantom(&project.folder("gone").unwrap()));
}

#[test]
fn test_flush_and_unregister_drop_phantoms() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.ws.register_sync_partner(partner());
    let live = project.file("live.txt").unwrap();
    fx.ws.create_file(&live, b"", CreateFlags::empty()).unwrap();
    fx.ws.set_sync_info(&partner(), &live, Some(b"1")).unwrap();
    let ghost = project.file("ghost.txt").unwrap();
    fx.ws.set_sync_info(&partner(), &ghost, Some(b"2")).unwrap();

    fx.ws.flush_sync_info(&partner(), &project, Depth::One).unwrap();
    assert_eq!(fx.ws.sync_info(&partner(), &live).unwrap(), None);
    assert!(!fx.ws.is_phantom(&ghost));
    assert!(fx.ws.exists(&live));

    fx.ws.set_sync_info(&partner(), &ghost, Some(b"3")).unwrap();
    fx.ws.unregister_sync_partner(&partner()).unwrap();
    assert!(!fx.ws.is_phantom(&ghost));
    assert!(fx.ws.sync_info(&partner(), &ghost).is_err());
}

#[test]
fn test_moved_source_keeps_sync_phantom() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.txt").unwrap();
    fx.ws.create_file(&file, b"a", CreateFlags::empty()).unwrap();
    fx.ws.register_sync_partner(partner());
    fx.ws.set_sync_info(&partner(), &file, Some(b"r1")).unwrap();

    fx.ws
        .move_resource(&file, &path("/P/b.txt"), UpdateFlags::empty(), &NullMonitor)
        .unwrap();

    let moved = project.file("b.txt").unwrap();
    assert!(fx.ws.is_phantom(&file));
    assert_eq!(fx.ws.sync_info(&partner(), &file).unwrap(), Some(b"r1".to_vec()));
    assert_eq!(fx.ws.sync_info(&partner(), &moved).unwrap(), None);
}

#[test]
fn test_project_delete_discards_descendant_sync_info() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("src").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    let file = folder.file("main.c").unwrap();
    fx.ws.create_file(&file, b"int main;", CreateFlags::empty()).unwrap();
    fx.ws.register_sync_partner(partner());
    fx.ws.set_sync_info(&partner(), &file, Some(b"1.1")).unwrap();
    fx.ws.set_sync_info(&partner(), &project, Some(b"root")).unwrap();

    fx.ws.delete(&project, UpdateFlags::empty(), &NullMonitor).unwrap();

    assert!(!fx.ws.exists(&project));
    assert!(!fx.ws.is_phantom(&project));
    assert!(!fx.ws.is_phantom(&folder));
    assert!(!fx.ws.is_phantom(&file));
    assert_eq!(fx.ws.sync_info(&partner(), &file).unwrap(), None);
    assert_eq!(fx.ws.sync_info(&partner(), &project).unwrap(), None);
    assert!(fx
        .ws
        .members(&fx.ws.root(), MemberFlags::INCLUDE_PHANTOMS)
        .unwrap()
        .is_empty());
}
