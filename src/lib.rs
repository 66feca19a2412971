pub mod adapters;
pub mod buffers;
pub mod config;
pub mod domain;
pub mod idle;
pub mod ops;
pub mod ports;
