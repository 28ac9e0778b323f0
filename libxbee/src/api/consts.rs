//! Flag bytes, escape parameters and sizes used in the API frame encoding.

pub mod flags {
    pub const DELIMITER: u8 = 0x7E;
    pub const ESCAPE: u8 = 0x7D;
    pub const XON: u8 = 0x11;
    pub const XOFF: u8 = 0x13;
}

pub mod escape {
    use super::flags;

    pub const MASK: u8 = 0x20;

    /// Bytes that never appear unescaped on the link after the delimiter.
    pub const RESERVED: [u8; 4] = [flags::DELIMITER, flags::ESCAPE, flags::XON, flags::XOFF];
}

pub mod size {
    /// Delimiter and two length bytes.
    pub const HEADER: usize = 3;

    /// Header and trailing checksum.
    pub const OVERHEAD: usize = HEADER + 1;

    pub const MAX_PAYLOAD: usize = u16::MAX as usize;
}
