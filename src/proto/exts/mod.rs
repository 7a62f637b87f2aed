//! Protocol buffer type extensions
//!
//! Helper constructors and accessors for the generated header and region
//! types used by both the reference server and the harness drivers.

mod metapb_ext;
mod pdpb_ext;
