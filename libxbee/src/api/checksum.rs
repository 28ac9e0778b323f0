//! Additive checksum used by the API frame format.
//!
//! The checksum byte is `0xFF` minus the low byte of the payload sum, so that
//! adding the low byte of the sum and the checksum yields `0xFF` for an intact
//! frame.


#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum {
    sum: u32,
}

impl Checksum {
    pub fn new() -> Self {
        Self { sum: 0 }
    }

    pub fn put_u8(&mut self, byte: u8) {
        self.sum = self.sum.wrapping_add(byte as u32);
    }

    pub fn put_slice(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.put_u8(*b);
        }
    }

    /// Raw, untruncated sum of all bytes seen so far.
    pub fn bytesum(&self) -> u32 {
        self.sum
    }

    pub fn value(&self) -> u8 {
        0xFF - (self.sum & 0xFF) as u8
    }
}


/// Check the checksum identity `((bytesum & 0xFF) + checksum) & 0xFF == 0xFF`.
pub fn verify(bytesum: u32, checksum: u8) -> bool {
    ((bytesum & 0xFF) as u8).wrapping_add(checksum) == 0xFF
}

pub fn checksum(bytes: &[u8]) -> u8 {
    let mut c = Checksum::new();
    c.put_slice(bytes);
    c.value()
}
