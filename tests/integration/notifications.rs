//! Integration tests for operation batching, listeners and the build hook

use crate::integration::test_utils::{path, Fixture};
use canopy::build::{BuildKind, BuildParticipant};
use canopy::config::WorkspaceConfig;
use canopy::error::{ErrorKind, ResourceError};
use canopy::events::ChannelListener;
use canopy::monitor::{NullMonitor, TokenMonitor};
use canopy::rules::SchedulingRule;
use canopy::{
    Container, CreateFlags, DeltaFlags, DeltaKind, Depth, EventMask, EventPhase, ResourceChangeEvent, ResourceDelta,
    ResourceHandle, UpdateFlags, Workspace,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[test]
fn test_nested_operations_notify_once() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let a = project.file("a.txt").unwrap();
    let b = project.file("b.txt").unwrap();

    fx.ws
        .run(SchedulingRule::Workspace, false, &NullMonitor, |ws| {
            ws.create_file(&a, b"a", CreateFlags::empty())?;
            ws.create_file(&b, b"b", CreateFlags::empty())?;
            assert!(ws.is_in_operation());
            Ok(())
        })
        .unwrap();

    assert!(!fx.ws.is_in_operation());
    let delta = fx.single_delta();
    assert_eq!(delta.find_member(&path("/P/a.txt")).unwrap().kind(), DeltaKind::Added);
    assert_eq!(delta.find_member(&path("/P/b.txt")).unwrap().kind(), DeltaKind::Added);
}

#[test]
fn test_create_then_delete_in_one_operation_is_silent() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("temp.txt").unwrap();

    fx.ws
        .run(SchedulingRule::for_path(project.path()), false, &NullMonitor, |ws| {
            ws.create_file(&file, b"", CreateFlags::empty())?;
            ws.delete(&file, UpdateFlags::empty(), &NullMonitor)
        })
        .unwrap();

    assert!(fx.deltas().is_empty());
}

#[test]
fn test_unchanged_state_produces_no_notification() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("a.txt").unwrap();
    fx.ws.create_file(&file, b"", CreateFlags::empty()).unwrap();
    fx.ws.set_charset(&file, Some("UTF-16")).unwrap();
    fx.drain();

    let before = fx.ws.modification_stamp(&file);
    fx.ws.touch(&file).unwrap();
    assert!(fx.ws.modification_stamp(&file) > before);
    fx.ws.set_charset(&file, Some("UTF-16")).unwrap();
    fx.ws.set_derived(&project, true).unwrap();

    assert!(fx.deltas().is_empty());
    assert!(!fx.ws.is_derived(&project, false));
}

#[test]
fn test_listener_cannot_modify_during_post_change() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let attempt = Arc::new(Mutex::new(None));
    let seen = Arc::clone(&attempt);
    let target = project.file("from_listener.txt").unwrap();
    fx.ws.add_resource_change_listener(
        move |event: &ResourceChangeEvent<'_>| {
            let result = event.workspace.create_file(&target, b"", CreateFlags::empty());
            *seen.lock() = Some(result.map_err(|e| e.kind()));
        },
        EventMask::POST_CHANGE,
    );

    fx.ws
        .create_file(&project.file("a.txt").unwrap(), b"", CreateFlags::empty())
        .unwrap();

    assert_eq!(*attempt.lock(), Some(Err(ErrorKind::TreeLocked)));
    assert!(!fx.ws.exists(&project.file("from_listener.txt").unwrap()));
}

#[test]
fn test_listener_can_read_during_notification() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&observed);
    let probe = project.file("a.txt").unwrap();
    fx.ws.add_resource_change_listener(
        move |event: &ResourceChangeEvent<'_>| {
            sink.lock().push(event.workspace.exists(&probe));
        },
        EventMask::POST_CHANGE,
    );

    fx.ws
        .create_file(&project.file("a.txt").unwrap(), b"", CreateFlags::empty())
        .unwrap();
    assert_eq!(*observed.lock(), vec![true]);
}

#[test]
fn test_removed_listener_is_not_called() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let (listener, events) = ChannelListener::new_pair();
    let id = fx.ws.add_resource_change_listener(listener, EventMask::POST_CHANGE);
    assert!(fx.ws.remove_resource_change_listener(id));
    assert!(!fx.ws.remove_resource_change_listener(id));

    fx.ws
        .create_file(&project.file("a.txt").unwrap(), b"", CreateFlags::empty())
        .unwrap();
    assert!(events.try_recv().is_err());
}

#[test]
fn test_pre_close_and_pre_delete_carry_the_project() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let (listener, events) = ChannelListener::new_pair();
    fx.ws
        .add_resource_change_listener(listener, EventMask::PRE_CLOSE | EventMask::PRE_DELETE);

    fx.ws.close_project(&project, &NullMonitor).unwrap();
    fx.ws.delete(&project, UpdateFlags::empty(), &NullMonitor).unwrap();

    let phases: Vec<_> = events.try_iter().map(|e| (e.phase, e.resource, e.delta.is_some())).collect();
    assert_eq!(phases.len(), 2);
    assert_eq!(phases[0].0, EventPhase::PreClose);
    assert_eq!(phases[1].0, EventPhase::PreDelete);
    assert!(phases
        .iter()
        .all(|(_, resource, has_delta)| resource.as_ref().map(|r| r.path()) == Some(project.path()) && !has_delta));
}

struct CountingBuilder {
    calls: Mutex<Vec<BuildKind>>,
}

impl BuildParticipant for CountingBuilder {
    fn build(
        &self,
        workspace: &Workspace,
        kind: BuildKind,
        delta: &ResourceDelta,
        _monitor: &dyn canopy::monitor::ProgressMonitor,
    ) -> Result<(), ResourceError> {
        self.calls.lock().push(kind);
        // derive an output for every added source file
        let mut outputs = Vec::new();
        delta.accept(false, &mut |node: &ResourceDelta| {
            if node.kind() == DeltaKind::Added && node.path().to_string().ends_with(".c") {
                outputs.push(node.path().to_string().replace(".c", ".o"));
            }
            true
        });
        for output in outputs {
            let file = canopy::File::parse(&output)?;
            workspace.create_file(&file, b"obj", CreateFlags::DERIVED)?;
        }
        Ok(())
    }
}

#[test]
fn test_auto_build_output_is_folded_into_the_notification() {
    let mut config = WorkspaceConfig::for_location(crate::integration::test_utils::WORKSPACE_LOCATION);
    config.workspace.auto_build = true;
    let fx = Fixture::with_config(config);
    let project = fx.project("P");
    let builder = Arc::new(CountingBuilder {
        calls: Mutex::new(Vec::new()),
    });
    fx.ws.set_build_participant(Some(builder.clone()));
    let (listener, builds) = ChannelListener::new_pair();
    fx.ws.add_resource_change_listener(
        listener,
        EventMask::PRE_BUILD | EventMask::POST_BUILD | EventMask::POST_AUTO_BUILD,
    );

    fx.ws
        .create_file(&project.file("main.c").unwrap(), b"int main;", CreateFlags::empty())
        .unwrap();

    assert_eq!(*builder.calls.lock(), vec![BuildKind::Auto]);
    let phases: Vec<EventPhase> = builds.try_iter().map(|e| e.phase).collect();
    assert_eq!(
        phases,
        vec![EventPhase::PreBuild, EventPhase::PostBuild, EventPhase::PostAutoBuild]
    );
    let delta = fx.single_delta();
    assert_eq!(delta.find_member(&path("/P/main.o")).unwrap().kind(), DeltaKind::Added);
    assert!(fx.ws.is_derived(&project.file("main.o").unwrap(), false));
}

#[test]
fn test_build_runs_only_when_requested() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let builder = Arc::new(CountingBuilder {
        calls: Mutex::new(Vec::new()),
    });
    fx.ws.set_build_participant(Some(builder.clone()));

    fx.ws
        .create_file(&project.file("a.txt").unwrap(), b"", CreateFlags::empty())
        .unwrap();
    assert!(builder.calls.lock().is_empty());

    let file = project.file("b.txt").unwrap();
    fx.ws
        .run(SchedulingRule::for_path(file.path()), true, &NullMonitor, |ws| {
            ws.create_file(&file, b"", CreateFlags::empty())
        })
        .unwrap();
    assert_eq!(*builder.calls.lock(), vec![BuildKind::Incremental]);
}

#[test]
fn test_nested_rule_must_be_contained() {
    let fx = Fixture::new();
    let p = fx.project("P");
    let q = fx.project("Q");
    let result = fx.ws.run(SchedulingRule::for_path(p.path()), false, &NullMonitor, |ws| {
        ws.create_file(&q.file("x.txt").unwrap(), b"", CreateFlags::empty())
    });
    assert_eq!(result.unwrap_err().kind(), ErrorKind::RuleConflict);
    assert!(!fx.ws.is_in_operation());
}

#[test]
fn test_end_operation_outside_operation_fails() {
    let fx = Fixture::new();
    let err = fx.ws.end_operation(false, &NullMonitor).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInOperation);
}

#[test]
fn test_canceled_refresh_restores_the_subtree() {
    let fx = Fixture::new();
    let project = fx.project("P");
    for i in 0..10 {
        fx.write_disk(&format!("/P/gen/f{}.txt", i), b"x");
    }

    let monitor = TokenMonitor::cancel_after(3);
    let err = fx.ws.refresh_local(&project, Depth::Infinite, &monitor).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    assert!(!fx.ws.exists(&project.folder("gen").unwrap()));
    assert!(fx.deltas().is_empty());

    fx.ws.refresh_local(&project, Depth::Infinite, &NullMonitor).unwrap();
    assert!(fx.ws.exists(&project.folder("gen").unwrap().file("f9.txt").unwrap()));
}

#[test]
fn test_canceled_copy_restores_the_destination() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let source = project.folder("src").unwrap();
    fx.ws.create_folder(&source, CreateFlags::empty()).unwrap();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
        fx.ws
            .create_file(&source.file(name).unwrap(), name.as_bytes(), CreateFlags::empty())
            .unwrap();
    }
    fx.drain();

    let monitor = TokenMonitor::cancel_after(3);
    let err = fx
        .ws
        .copy_resource(&source, &path("/P/dest"), UpdateFlags::empty(), &monitor)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    let dest = project.folder("dest").unwrap();
    assert!(!fx.ws.exists(&dest));
    assert!(!fx.ws.exists(&dest.file("a.txt").unwrap()));
    assert!(!fx.disk_exists("/P/dest"));
    assert!(fx.ws.is_synchronized(&project));
    assert!(fx.deltas().is_empty());

    fx.ws
        .copy_resource(&source, &path("/P/dest"), UpdateFlags::empty(), &NullMonitor)
        .unwrap();
    assert_eq!(fx.ws.contents(&dest.file("d.txt").unwrap(), false).unwrap(), b"d.txt");
}

#[test]
fn test_canceled_delete_leaves_the_tree_alone() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let generated = project.folder("gen").unwrap();
    fx.ws.create_folder(&generated, CreateFlags::empty()).unwrap();
    for name in ["x", "y", "z"] {
        let folder = generated.folder(name).unwrap();
        fx.ws.create_folder(&folder, CreateFlags::empty()).unwrap();
        fx.ws
            .create_file(&folder.file("out.o").unwrap(), b"", CreateFlags::empty())
            .unwrap();
    }
    fx.drain();

    let monitor = TokenMonitor::cancel_after(2);
    let err = fx.ws.delete(&generated, UpdateFlags::empty(), &monitor).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::OperationCanceled);
    for name in ["x", "y", "z"] {
        let file = generated.folder(name).unwrap().file("out.o").unwrap();
        assert!(fx.ws.exists(&file));
    }
    assert!(fx.disk_exists("/P/gen/z/out.o"));
    assert!(fx.ws.is_synchronized(&project));
    assert!(fx.deltas().is_empty());
}

#[test]
fn test_keep_history_records_replaced_contents() {
    let fx = Fixture::new();
    let project = fx.project("P");
    let file = project.file("notes.txt").unwrap();
    fx.ws.create_file(&file, b"v1", CreateFlags::empty()).unwrap();
    fx.ws.set_contents(&file, b"v2", UpdateFlags::KEEP_HISTORY).unwrap();
    fx.ws.set_contents(&file, b"v3", UpdateFlags::KEEP_HISTORY).unwrap();
    fx.ws.set_contents(&file, b"v4", UpdateFlags::empty()).unwrap();

    let history = fx.ws.file_history(&file);
    let contents: Vec<&[u8]> = history.iter().map(|s| s.contents.as_slice()).collect();
    assert_eq!(contents, vec![&b"v2"[..], &b"v1"[..]]);

    let delta = fx.deltas().pop().unwrap();
    assert!(delta
        .find_member(&path("/P/notes.txt"))
        .unwrap()
        .flags()
        .contains(DeltaFlags::CONTENT));

    fx.ws.clear_history(&file);
    assert!(fx.ws.file_history(&file).is_empty());
}
