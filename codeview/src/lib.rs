//! CodeView record decoding
//!
//! CodeView is the debugging format carried in the type and symbol streams of a PDB. This crate
//! decodes type records (TPI/IPI), field lists, numeric leaves, and the symbol records that a
//! symbol reader needs. It performs no I/O; callers hand it byte slices.
//!
//! # References
//!
//! * [CodeView Symbols](https://llvm.org/docs/PDB/CodeViewSymbols.html)
//! * [CodeView Type Records](https://llvm.org/docs/PDB/CodeViewTypes.html)
//! * [`cvinfo.h`](https://github.com/microsoft/microsoft-pdb/blob/805655a28bd8198004be2ac27e6e0290121a5e89/include/cvinfo.h)

#![forbid(unsafe_code)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]
#![allow(clippy::needless_lifetimes)]

pub mod parser;
pub mod syms;
pub mod types;
