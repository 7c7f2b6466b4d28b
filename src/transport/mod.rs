#![forbid(unsafe_code)]

pub mod jsonrpc;
