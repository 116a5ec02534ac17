//! Property-based tests for snapshot isolation and delta completeness

use crate::property::model::{delta, file_changes, file_path, op, Model, FILE_COUNT};
use canopy::DeltaKind;
use proptest::prelude::*;

/// A snapshot keeps describing the tree as it was, whatever happens later
#[test]
fn test_snapshot_isolation_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(prop::collection::vec(op(), 0..20), prop::collection::vec(op(), 1..20)),
            |(before, after)| {
                let mut model = Model::new();
                for op in before {
                    model.apply(op);
                }
                let expected = model.files();
                let snapshot = model.tree.snapshot();

                for op in after {
                    model.apply(op);
                }

                for i in 0..FILE_COUNT {
                    let path = file_path(i);
                    let seen = model
                        .tree
                        .info_in(snapshot.root(), &path)
                        .map(|info| info.content_id);
                    let name = format!("f{}.txt", i);
                    prop_assert_eq!(seen, expected.get(&name).copied());
                }
                model.tree.release(snapshot);
                Ok(())
            },
        )
        .unwrap();
}

/// Every file that appears or disappears between two versions is reported
#[test]
fn test_delta_completeness_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(prop::collection::vec(op(), 0..15), prop::collection::vec(op(), 1..15)),
            |(setup, change)| {
                let mut model = Model::new();
                for op in setup {
                    model.apply(op);
                }
                let old_files = model.files();
                let baseline = model.tree.snapshot();
                for op in change {
                    model.apply(op);
                }
                let new_files = model.files();

                let delta = delta(&model.tree, baseline.root(), model.tree.current());
                let changes = file_changes(delta.as_ref());
                for i in 0..FILE_COUNT {
                    let name = format!("f{}.txt", i);
                    let key = file_path(i).to_string();
                    let reported = changes.get(&key).map(|(kind, _)| *kind);
                    match (old_files.get(&name), new_files.get(&name)) {
                        (None, Some(_)) => prop_assert_eq!(reported, Some(DeltaKind::Added)),
                        (Some(_), None) => prop_assert_eq!(reported, Some(DeltaKind::Removed)),
                        (None, None) => prop_assert_eq!(reported, None),
                        (Some(_), Some(_)) => {}
                    }
                }
                if old_files == new_files {
                    prop_assert!(changes.values().all(|(kind, _)| *kind == DeltaKind::Changed));
                }
                model.tree.release(baseline);
                Ok(())
            },
        )
        .unwrap();
}
