use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique operator handle identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OpId(pub u64);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

pub fn next_op_id() -> OpId {
    OpId(NEXT_OP_ID.fetch_add(1, AtomicOrdering::Relaxed))
}
