pub mod keyspace;
pub(crate) mod write;

pub use keyspace::{DriveTables, IndexKeyspace, IndexSnapshot, MembershipIndex, UniqueIdIndex};
