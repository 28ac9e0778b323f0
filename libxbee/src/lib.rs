//! Library for the API frame format spoken by XBee-style radio modules over a
//! serial link: start delimiter, big-endian length, payload and an 8-bit
//! checksum, with optional byte-stuffing of reserved control bytes.

pub mod api;
