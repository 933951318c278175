pub use arbor_types::prelude::*;

// vim: ts=4
