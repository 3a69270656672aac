use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! ast_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn from_raw(raw: u32) -> Self {
                $name(raw)
            }

            #[must_use]
            pub fn idx(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

ast_id!(ExprId);
ast_id!(StmtId);
ast_id!(LocalId);
ast_id!(BodyId);
ast_id!(ClassDeclId);
ast_id!(MethodDeclId);
ast_id!(FieldDeclId);
