//! Internal plumbing for snapshot publication. The unsafe epoch handling
//! lives here, behind a small typed interface.

pub(crate) mod slot;
