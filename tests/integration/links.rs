//! Integration tests for linked and virtual resources

use crate::integration::test_utils::{path, Fixture};
use canopy::error::ErrorKind;
use canopy::monitor::NullMonitor;
use canopy::store::FileStore;
use canopy::{Container, CreateFlags, Depth, MemberFlags, Resource, ResourceHandle, UpdateFlags};
use std::path::Path;

#[test]
fn test_folder_link_exposes_target_members() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.write_disk("/ext/lib/a.c", b"a");
    fx.write_disk("/ext/lib/b.c", b"b");
    let link = project.folder("lib").unwrap();

    fx.ws.create_link(&link, &fx.disk("/ext/lib"), CreateFlags::empty()).unwrap();

    assert!(fx.ws.is_linked(&link));
    assert_eq!(fx.ws.location(&link).unwrap(), fx.disk("/ext/lib"));
    let names: Vec<String> = fx
        .ws
        .members(&link, MemberFlags::empty())
        .unwrap()
        .iter()
        .map(|r| r.name().to_string())
        .collect();
    assert_eq!(names, vec!["a.c", "b.c"]);
    let file = link.file("a.c").unwrap();
    assert_eq!(fx.ws.contents(&file, false).unwrap(), b"a");
    assert_eq!(fx.ws.location(&file).unwrap(), fx.disk("/ext/lib/a.c"));

    let description = fx.ws.description(&project).unwrap();
    assert_eq!(description.links.len(), 1);
    assert_eq!(description.links[0].path, "lib");
}

#[test]
fn test_link_target_must_exist_with_matching_type() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let link = project.folder("lib").unwrap();

    let err = fx
        .ws
        .create_link(&link, &fx.disk("/nowhere"), CreateFlags::empty())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LinkMissingLocal);

    fx.write_disk("/ext/file.txt", b"");
    let err = fx
        .ws
        .create_link(&link, &fx.disk("/ext/file.txt"), CreateFlags::empty())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WrongTypeLocal);

    let err = fx
        .ws
        .create_link(&link, Path::new("relative/dir"), CreateFlags::empty())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    fx.ws
        .create_link(&link, &fx.disk("/nowhere"), CreateFlags::ALLOW_MISSING_LOCAL)
        .unwrap();
    assert!(fx.ws.exists(&link));
    assert!(!fx.ws.is_local(&link));
    // nothing can be created below a dangling link
    let err = fx
        .ws
        .create_file(&link.file("x.txt").unwrap(), b"", CreateFlags::empty())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LinkMissingLocal);
}

#[test]
fn test_deleting_link_keeps_target() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.write_disk("/ext/data/keep.txt", b"keep");
    let link = project.folder("data").unwrap();
    fx.ws.create_link(&link, &fx.disk("/ext/data"), CreateFlags::empty()).unwrap();

    fx.ws.delete(&link, UpdateFlags::empty(), &NullMonitor).unwrap();

    assert!(!fx.ws.exists(&link));
    assert!(fx.disk_exists("/ext/data/keep.txt"));
    assert!(fx.ws.description(&project).unwrap().links.is_empty());
}

#[test]
fn test_shallow_copy_keeps_link_and_deep_copy_materializes() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.write_disk("/ext/data/x.txt", b"x");
    let link = project.folder("data").unwrap();
    fx.ws.create_link(&link, &fx.disk("/ext/data"), CreateFlags::empty()).unwrap();

    fx.ws
        .copy_resource(&link, &path("/P/shallow"), UpdateFlags::SHALLOW, &NullMonitor)
        .unwrap();
    let shallow = project.folder("shallow").unwrap();
    assert!(fx.ws.is_linked(&shallow));
    assert_eq!(fx.ws.location(&shallow).unwrap(), fx.disk("/ext/data"));

    fx.ws
        .copy_resource(&link, &path("/P/deep"), UpdateFlags::empty(), &NullMonitor)
        .unwrap();
    let deep = project.folder("deep").unwrap();
    assert!(!fx.ws.is_linked(&deep));
    assert!(fx.disk_exists("/P/deep/x.txt"));
    assert_eq!(fx.ws.contents(&deep.file("x.txt").unwrap(), false).unwrap(), b"x");
}

#[test]
fn test_virtual_folder_holds_only_links() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let group = project.folder("group").unwrap();
    fx.ws.create_folder(&group, CreateFlags::VIRTUAL).unwrap();

    assert!(fx.ws.is_virtual(&group));
    assert!(!fx.disk_exists("/P/group"));

    let err = fx
        .ws
        .create_file(&group.file("plain.txt").unwrap(), b"", CreateFlags::empty())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidValue);

    fx.write_disk("/ext/readme.md", b"# hi");
    let linked = group.file("readme.md").unwrap();
    fx.ws.create_link(&linked, &fx.disk("/ext/readme.md"), CreateFlags::empty()).unwrap();
    assert_eq!(
        fx.ws.members(&group, MemberFlags::empty()).unwrap(),
        vec![Resource::File(linked.clone())]
    );

    // the virtual folder survives reopening through the description
    fx.ws.close_project(&project, &NullMonitor).unwrap();
    fx.ws.open_project(&project, &NullMonitor).unwrap();
    assert!(fx.ws.is_virtual(&group));
    assert!(fx.ws.is_linked(&linked));
}

#[test]
fn test_changes_through_one_alias_appear_in_the_other() {
    let fx = Fixture::new();
    let a = fx.project("A");
    let b = fx.project("B");
    let shared = a.folder("shared").unwrap();
    fx.ws.create_folder(&shared, CreateFlags::empty()).unwrap();
    let alias = b.folder("shared").unwrap();
    fx.ws.create_link(&alias, &fx.disk("/A/shared"), CreateFlags::empty()).unwrap();

    fx.ws
        .create_file(&shared.file("x.txt").unwrap(), b"x", CreateFlags::empty())
        .unwrap();

    assert!(fx.ws.exists(&alias.file("x.txt").unwrap()));
}

#[test]
fn test_shallow_move_keeps_link_and_location() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.write_disk("/ext/lib/a.c", b"a");
    let link = project.folder("lib").unwrap();
    fx.ws.create_link(&link, &fx.disk("/ext/lib"), CreateFlags::empty()).unwrap();

    fx.ws
        .move_resource(&link, &path("/P/vendor"), UpdateFlags::SHALLOW, &NullMonitor)
        .unwrap();

    let moved = project.folder("vendor").unwrap();
    assert!(!fx.ws.exists(&link));
    assert!(fx.ws.is_linked(&moved));
    assert_eq!(fx.ws.location(&moved).unwrap(), fx.disk("/ext/lib"));
    assert!(fx.disk_exists("/ext/lib/a.c"));
    assert!(!fx.disk_exists("/P/vendor"));
    assert_eq!(fx.ws.contents(&moved.file("a.c").unwrap(), false).unwrap(), b"a");
    let description = fx.ws.description(&project).unwrap();
    assert_eq!(description.links.len(), 1);
    assert_eq!(description.links[0].path, "vendor");
}

#[test]
fn test_missing_link_target_fails_reads_until_it_returns() {
    let fx = Fixture::new();
    let project = fx.project("P");
    fx.write_disk("/ext/lib/a.c", b"a");
    let link = project.folder("lib").unwrap();
    fx.ws.create_link(&link, &fx.disk("/ext/lib"), CreateFlags::empty()).unwrap();
    let file = link.file("a.c").unwrap();

    fx.store.delete(&fx.disk("/ext/lib")).unwrap();
    fx.ws.refresh_local(&project, Depth::Infinite, &NullMonitor).unwrap();

    assert!(fx.ws.exists(&link));
    let err = fx.ws.members(&link, MemberFlags::empty()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LinkMissingLocal);
    let err = fx.ws.contents(&file, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LinkMissingLocal);

    fx.write_disk("/ext/lib/a.c", b"back");
    fx.ws.refresh_local(&project, Depth::Infinite, &NullMonitor).unwrap();

    assert_eq!(
        fx.ws.members(&link, MemberFlags::empty()).unwrap(),
        vec![Resource::File(file.clone())]
    );
    assert_eq!(fx.ws.contents(&file, false).unwrap(), b"back");
}
