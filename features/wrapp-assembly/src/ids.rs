//! Integer handles used in place of references between scopes, nodes and slots.

use std::fmt;

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub(crate) const fn new(index: usize) -> Self {
                $name(index as u32)
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    };
}

index_id!(
    /// Position of a value in a [`ValuePool`](crate::pool::ValuePool)
    SlotId,
    "slot#"
);
index_id!(
    /// Slot reserved inside a single scope, before the resolver picks the scope's base
    LocalSlot,
    "local#"
);
index_id!(
    /// A registered bean, numbered in declaration order
    NodeId,
    "node#"
);
index_id!(ScopeId, "scope#");
index_id!(ExtensionId, "ext#");

impl SlotId {
    /// Places a scope local slot at the scope's base
    pub(crate) fn offset(base: usize, local: LocalSlot) -> SlotId {
        SlotId::new(base + local.index())
    }
}
