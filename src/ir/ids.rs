//! Newtype arena indices, replacing the raw pointers of the original IR
//! (`IRBB*`, `IRStmt*`, ...). See SPEC_FULL.md §4.0.

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id!(BBId);
define_id!(StmtId);
define_id!(PortId);
define_id!(StorageId);
define_id!(BypassId);
define_id!(TimeVarId);
define_id!(PipeId);
define_id!(PipeStageId);
