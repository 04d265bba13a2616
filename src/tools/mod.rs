//! Building blocks shared by the compression modules

pub mod bit_io;
pub mod huff_tree;
