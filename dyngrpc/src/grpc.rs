//! # Generic gRPC Transport
//!
//! The low-level building blocks for performing gRPC calls with
//! schema-described messages.
//!
//! Unlike standard `tonic` clients which are strongly typed (e.g.
//! `HelloRequest`), the components here move [`DynamicMessage`] values whose
//! shape is only known at runtime, transcoding them to Protobuf binary format
//! on the fly.
//!
//! [`DynamicMessage`]: crate::message::DynamicMessage
pub mod client;
pub mod codec;
