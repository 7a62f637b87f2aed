//! Protocol Buffer definitions and generated code for RPC services.
//!
//! Generated by [`tonic-build`] from `proto/*.proto` at build time. All
//! messages also derive serde so the HTTP surface can serve them as JSON.

pub mod metapb {
    tonic::include_proto!("metapb");
}

pub mod pdpb {
    tonic::include_proto!("pdpb");
}

pub mod peerpb {
    tonic::include_proto!("peerpb");
}

mod exts;
