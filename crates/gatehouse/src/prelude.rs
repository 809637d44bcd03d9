pub use gatehouse_types::prelude::*;

// vim: ts=4
