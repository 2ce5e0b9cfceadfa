#![forbid(unsafe_code)]

pub mod fetch;
