//! Integration tests over the real file system

use canopy::config::CONFIG_DIR;
use canopy::monitor::NullMonitor;
use canopy::{Container, CreateFlags, DeltaKind, Depth, EventMask, ResourceHandle, UpdateFlags, Workspace};
use canopy::events::ChannelListener;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_open_reads_workspace_config() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(CONFIG_DIR);
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("config.toml"),
        "[workspace]\ndefault_charset = \"ISO-8859-1\"\n",
    )
    .unwrap();

    let ws = Workspace::open(temp.path()).unwrap();
    assert_eq!(ws.config().workspace.location, temp.path());
    let project = ws.root().project("P").unwrap();
    ws.create_project(&project, None).unwrap();
    ws.open_project(&project, &NullMonitor).unwrap();
    let file = project.file("a.txt").unwrap();
    ws.create_file(&file, b"", CreateFlags::empty()).unwrap();
    assert_eq!(ws.charset(&file).unwrap(), "ISO-8859-1");
}

#[test]
fn test_resources_map_to_local_files() {
    let temp = TempDir::new().unwrap();
    let ws = Workspace::open(temp.path()).unwrap();
    let project = ws.root().project("P").unwrap();
    ws.create_project(&project, None).unwrap();
    ws.open_project(&project, &NullMonitor).unwrap();

    let folder = project.folder("src").unwrap();
    ws.create_folder(&folder, CreateFlags::empty()).unwrap();
    let file = folder.file("main.rs").unwrap();
    ws.create_file(&file, b"fn main() {}", CreateFlags::empty()).unwrap();

    let local = temp.path().join("P").join("src").join("main.rs");
    assert_eq!(fs::read(&local).unwrap(), b"fn main() {}");
    assert!(temp.path().join("P").join(".project").is_file());
    assert_eq!(ws.location(&file).unwrap(), local);

    ws.move_resource(&folder, &canopy::ResourcePath::parse("/P/lib").unwrap(), UpdateFlags::empty(), &NullMonitor)
        .unwrap();
    assert!(temp.path().join("P").join("lib").join("main.rs").is_file());
    assert!(!temp.path().join("P").join("src").exists());
}

#[test]
fn test_refresh_sees_external_edits() {
    let temp = TempDir::new().unwrap();
    let ws = Workspace::open(temp.path()).unwrap();
    let project = ws.root().project("P").unwrap();
    ws.create_project(&project, None).unwrap();
    ws.open_project(&project, &NullMonitor).unwrap();
    let file = project.file("notes.txt").unwrap();
    ws.create_file(&file, b"short", CreateFlags::empty()).unwrap();
    let (listener, events) = ChannelListener::new_pair();
    ws.add_resource_change_listener(listener, EventMask::POST_CHANGE);

    fs::write(temp.path().join("P").join("notes.txt"), b"a good deal longer").unwrap();
    fs::write(temp.path().join("P").join("new.txt"), b"new").unwrap();
    assert!(!ws.is_synchronized(&file));

    ws.refresh_local(&project, Depth::One, &NullMonitor).unwrap();

    assert!(ws.is_synchronized(&project));
    assert_eq!(ws.contents(&file, false).unwrap(), b"a good deal longer");
    let delta = events.try_recv().unwrap().delta.unwrap();
    assert_eq!(delta.find_member(file.path()).unwrap().kind(), DeltaKind::Changed);
    assert_eq!(
        delta.find_member(project.file("new.txt").unwrap().path()).unwrap().kind(),
        DeltaKind::Added
    );
}
