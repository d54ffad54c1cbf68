//! Cluster management commands.

use crate::core::command::Cmd;

/// `CLUSTER SLOTS`: slot ranges with their master and replicas.
pub fn cluster_slots() -> Cmd {
    Cmd::new("CLUSTER").arg("SLOTS")
}

/// `ASKING`: lets the next command hit a slot that is being imported.
///
/// The flag is one-shot and only covers the immediately following command.
pub fn asking() -> Cmd {
    Cmd::new("ASKING")
}
