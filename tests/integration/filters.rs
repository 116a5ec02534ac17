//! Integration tests for resource filters

use crate::integration::test_utils::{path, Fixture};
use canopy::filter::{FilterType, MatcherDescription};
use canopy::error::ErrorKind;
use canopy::monitor::{NullMonitor, TokenMonitor};
use canopy::{Container, CreateFlags, DeltaKind, Depth, Folder, MemberFlags, Resource, ResourceHandle};

fn regex(pattern: &str) -> MatcherDescription {
    MatcherDescription::Regex(pattern.to_string())
}

fn member_names(fx: &Fixture, folder: &Folder) -> Vec<String> {
    fx.ws
        .members(folder, MemberFlags::empty())
        .unwrap()
        .iter()
        .map(|r| r.name().to_string())
        .collect()
}

#[test]
fn test_include_only_filter_limits_refreshed_members() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("F").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    fx.ws
        .create_filter(
            &folder,
            FilterType::INCLUDE_ONLY | FilterType::FILES,
            regex(r".*\.c"),
            &NullMonitor,
        )
        .unwrap();

    fx.write_disk("/P/F/foo.c", b"int x;");
    fx.write_disk("/P/F/bar.h", b"extern int x;");
    fx.ws.refresh_local(&fx.ws.root(), Depth::Infinite, &NullMonitor).unwrap();

    let members = fx.ws.members(&folder, MemberFlags::empty()).unwrap();
    assert_eq!(members, vec![Resource::File(folder.file("foo.c").unwrap())]);
    assert!(fx.ws.is_filtered(&path("/P/F/bar.h"), false));
    assert!(!fx.ws.is_filtered(&path("/P/F/foo.c"), false));
}

#[test]
fn test_new_filter_removes_existing_members_in_same_operation() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("out").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    for name in ["a.o", "b.o", "main.c"] {
        fx.ws
            .create_file(&folder.file(name).unwrap(), b"", CreateFlags::empty())
            .unwrap();
    }
    fx.drain();

    let id = fx
        .ws
        .create_filter(&folder, FilterType::EXCLUDE_ALL, regex(r".*\.o"), &NullMonitor)
        .unwrap();

    assert_eq!(member_names(&fx, &folder), vec!["main.c"]);
    // filtered resources leave the namespace, not the disk
    assert!(fx.disk_exists("/P/out/a.o"));
    let delta = fx.single_delta();
    assert_eq!(delta.find_member(&path("/P/out/a.o")).unwrap().kind(), DeltaKind::Removed);

    fx.ws.remove_filter(&folder, id, &NullMonitor).unwrap();
    assert_eq!(member_names(&fx, &folder), vec!["a.o", "b.o", "main.c"]);
    assert!(fx.ws.filters(&folder).unwrap().is_empty());
}

#[test]
fn test_includes_combine_and_excludes_subtract() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("src").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    for name in ["a.c", "a.h", "test.c", "notes.txt"] {
        fx.write_disk(&format!("/P/src/{}", name), b"");
    }
    fx.ws
        .create_filter(&folder, FilterType::INCLUDE_ONLY, regex(r".*\.c"), &NullMonitor)
        .unwrap();
    fx.ws
        .create_filter(&folder, FilterType::INCLUDE_ONLY, regex(r".*\.h"), &NullMonitor)
        .unwrap();
    fx.ws
        .create_filter(&folder, FilterType::EXCLUDE_ALL, regex(r"test.*"), &NullMonitor)
        .unwrap();

    assert_eq!(member_names(&fx, &folder), vec!["a.c", "a.h"]);
    assert_eq!(fx.ws.filters(&folder).unwrap().len(), 3);
}

#[test]
fn test_inheritable_filter_applies_below() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let top = project.folder("top").unwrap();
    fx.ws.create_folder(&top, CreateFlags::empty()).unwrap();
    fx.write_disk("/P/top/nested/keep.rs", b"");
    fx.write_disk("/P/top/nested/drop.bak", b"");

    fx.ws
        .create_filter(
            &top,
            FilterType::EXCLUDE_ALL | FilterType::FILES | FilterType::INHERITABLE,
            regex(r".*\.bak"),
            &NullMonitor,
        )
        .unwrap();

    let nested = top.folder("nested").unwrap();
    assert!(fx.ws.exists(&nested));
    assert_eq!(member_names(&fx, &nested), vec!["keep.rs"]);
}

#[test]
fn test_filters_never_hide_links() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("F").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    fx.write_disk("/elsewhere/data.bin", b"\x00");
    let link = folder.file("data.bin").unwrap();
    fx.ws
        .create_link(&link, &fx.disk("/elsewhere/data.bin"), CreateFlags::empty())
        .unwrap();

    fx.ws
        .create_filter(&folder, FilterType::EXCLUDE_ALL, regex(r".*\.bin"), &NullMonitor)
        .unwrap();
    assert!(fx.ws.exists(&link));
}

#[test]
fn test_filters_survive_reopen() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let folder = project.folder("F").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    fx.ws
        .create_filter(&folder, FilterType::EXCLUDE_ALL, regex(r"tmp"), &NullMonitor)
        .unwrap();
    fx.write_disk("/P/F/tmp", b"");
    fx.write_disk("/P/F/kept", b"");

    fx.ws.close_project(&project, &NullMonitor).unwrap();
    fx.ws.open_project(&project, &NullMonitor).unwrap();

    assert_eq!(member_names(&fx, &folder), vec!["kept"]);
    assert_eq!(fx.ws.description(&project).unwrap().filters.len(), 1);
}

#[test]
fn test_filter_on_root_or_file_is_rejected() {
    let fx = Fixture::new();
    let err = fx
        .ws
        .create_filter(&fx.ws.root(), FilterType::EXCLUDE_ALL, regex("x"), &NullMonitor)
        .unwrap_err();
    assert_eq!(err.kind(), canopy::error::ErrorKind::DerivedRootOrProject);

    let project = fx.project("P");
    let err = fx
        .ws
        .create_filter(&project, FilterType::EXCLUDE_ALL, regex("("), &NullMonitor)
        .unwrap_err();
    assert_eq!(err.kind(), canopy::error::ErrorKind::InvalidValue);
}

/// Folder `/P/F` holding one C source and three headers.
fn sources(fx: &Fixture) -> Folder {
    let project = fx.project("P");
    let folder = project.folder("F").unwrap();
    fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    for name in ["a.c", "b.h", "c.h", "d.h"] {
        fx.ws
            .create_file(&folder.file(name).unwrap(), b"", CreateFlags::empty())
            .unwrap();
    }
    fx.drain();
    folder
}

#[test]
fn test_canceled_filter_creation_leaves_nothing_behind() {
    let fx = Fixture::new();
    let folder = sources(&fx);
    let project = fx.ws.root().project("P").unwrap();

    let err = fx
        .ws
        .create_filter(
            &folder,
            FilterType::INCLUDE_ONLY | FilterType::FILES,
            regex(r".*\.c"),
            &TokenMonitor::cancel_after(2),
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    assert!(fx.ws.filters(&folder).unwrap().is_empty());
    assert!(fx.ws.description(&project).unwrap().filters.is_empty());
    assert_eq!(member_names(&fx, &folder), vec!["a.c", "b.h", "c.h", "d.h"]);
    assert!(fx.ws.is_synchronized(&project));
    assert!(fx.deltas().is_empty());
}

#[test]
fn test_canceled_filter_removal_keeps_the_filter() {
    let fx = Fixture::new();
    let folder = sources(&fx);
    let project = fx.ws.root().project("P").unwrap();
    let id = fx
        .ws
        .create_filter(
            &folder,
            FilterType::INCLUDE_ONLY | FilterType::FILES,
            regex(r".*\.c"),
            &NullMonitor,
        )
        .unwrap();
    fx.drain();

    let err = fx
        .ws
        .remove_filter(&folder, id, &TokenMonitor::cancel_after(1))
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    assert_eq!(fx.ws.filters(&folder).unwrap().len(), 1);
    assert_eq!(fx.ws.description(&project).unwrap().filters.len(), 1);
    assert_eq!(member_names(&fx, &folder), vec!["a.c"]);
    assert!(fx.ws.is_synchronized(&project));
    assert!(fx.deltas().is_empty());
}

#[test]
fn test_identical_filter_is_not_added_twice() {
    let fx = Fixture::new();
    let folder = sources(&fx);
    let filter_type = FilterType::EXCLUDE_ALL | FilterType::FILES;

    let first = fx
        .ws
        .create_filter(&folder, filter_type, regex(r".*\.h"), &NullMonitor)
        .unwrap();
    fx.drain();
    let second = fx
        .ws
        .create_filter(&folder, filter_type, regex(r".*\.h"), &NullMonitor)
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(fx.ws.filters(&folder).unwrap().len(), 1);
    assert!(fx.deltas().is_empty());

    // a different matcher is a different filter
    let third = fx
        .ws
        .create_filter(&folder, filter_type, regex(r".*\.o"), &NullMonitor)
        .unwrap();
    assert_ne!(third, first);
    assert_eq!(fx.ws.filters(&folder).unwrap().len(), 2);
}
