//! Shared replica fixture for store tests.

use assertables::*;
use rstest::fixture;
use tempfile::{TempDir, tempdir};

use crate::replica::Replica;

pub(crate) struct TestReplica {
    pub dir: TempDir,
    pub replica: Replica,
}

#[fixture]
pub(crate) fn replica() -> TestReplica {
    let dir = assert_ok!(tempdir());
    let replica = assert_ok!(Replica::open(dir.path(), "alice"));
    TestReplica { dir, replica }
}
