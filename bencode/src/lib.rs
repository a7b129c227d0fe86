#![allow(unused)]

// Convention from https://serde.rs/conventions.html
pub mod encode;
pub mod decode;
pub mod error;
mod token;

pub use decode::{decode_bytes, decode_str};
pub use encode::{encode_to_raw, encode_to_string};
pub use error::{Error, Result};
