//! Manifest module

pub mod kube;
pub mod serializer;
pub mod values;
