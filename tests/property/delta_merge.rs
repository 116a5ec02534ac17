//! Property-based tests for merging consecutive deltas

use crate::property::model::{delta, file_changes, op, Model};
use canopy::delta::merge;
use proptest::prelude::*;

/// Merging the deltas of two consecutive intervals reports the same
/// file changes as diffing across both at once
#[test]
fn test_merge_matches_direct_diff_property() {
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(
            &(
                prop::collection::vec(op(), 0..10),
                prop::collection::vec(op(), 0..10),
                prop::collection::vec(op(), 0..10),
            ),
            |(setup, first, second)| {
                let mut model = Model::new();
                for op in setup {
                    model.apply(op);
                }
                let v0 = model.tree.snapshot();
                for op in first {
                    model.apply(op);
                }
                let v1 = model.tree.snapshot();
                for op in second {
                    model.apply(op);
                }
                let v2 = model.tree.snapshot();

                let d01 = delta(&model.tree, v0.root(), v1.root());
                let d12 = delta(&model.tree, v1.root(), v2.root());
                let d02 = delta(&model.tree, v0.root(), v2.root());
                let merged = match (&d01, &d12) {
                    (Some(a), Some(b)) => merge(a, b),
                    (Some(a), None) => Some(a.clone()),
                    (None, b) => b.clone(),
                };

                prop_assert_eq!(file_changes(merged.as_ref()), file_changes(d02.as_ref()));

                model.tree.release(v0);
                model.tree.release(v1);
                model.tree.release(v2);
                Ok(())
            },
        )
        .unwrap();
}
