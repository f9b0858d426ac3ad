//! Bus module descriptors

/// Width of a module name on the bus, space padded
pub const MODULE_NAME_LEN: usize = 7;

/// Bus address of the controller
pub const CONTROLLER_ADDRESS: u8 = 8;

/// Address of the first registered module; census index `i` lives at `11 + i`
pub const FIRST_MODULE_ADDRESS: u8 = 11;

/// Largest census the address space can hold (addresses 11..=255)
pub const MAX_MODULES: u16 = (u8::MAX - FIRST_MODULE_ADDRESS) as u16 + 1;

/// Bus address of the module at census position `index`
pub fn module_address(index: u8) -> Option<u8> {
    FIRST_MODULE_ADDRESS.checked_add(index)
}

/// Snapshot of one attached module, as described by the controller
///
/// Not live state: re-enumerate to refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub address: u8,
    /// Name exactly as stored on the bus (7 bytes, space padded)
    pub name: String,
}

impl ModuleDescriptor {
    /// Decode the buffer returned by the describe command
    ///
    /// The name occupies the first [`MODULE_NAME_LEN`] bytes; a short buffer
    /// is padded with spaces and anything after the name is ignored.
    pub fn from_buffer(buffer: &[u8], address: u8) -> Self {
        let mut raw = [b' '; MODULE_NAME_LEN];
        let n = buffer.len().min(MODULE_NAME_LEN);
        raw[..n].copy_from_slice(&buffer[..n]);
        Self {
            address,
            name: String::from_utf8_lossy(&raw).into_owned(),
        }
    }

    /// Name without the trailing padding
    pub fn trimmed_name(&self) -> &str {
        self.name.trim_end()
    }
}

/// Pad a queried name the way stored names are padded
///
/// Only names shorter than [`MODULE_NAME_LEN`] are padded; longer names are
/// returned unchanged and therefore only match a stored name of the same
/// length.
pub fn pad_name(name: &str) -> String {
    format!("{:<width$}", name, width = MODULE_NAME_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_buffer() {
        let desc = ModuleDescriptor::from_buffer(b"gsm    \x01\x02", 11);
        assert_eq!(desc.address, 11);
        assert_eq!(desc.name, "gsm    ");
        assert_eq!(desc.trimmed_name(), "gsm");

        let short = ModuleDescriptor::from_buffer(b"ab", 12);
        assert_eq!(short.name, "ab     ");
    }

    #[test]
    fn test_module_address() {
        assert_eq!(module_address(0), Some(11));
        assert_eq!(module_address((MAX_MODULES - 1) as u8), Some(255));
        assert_eq!(module_address(MAX_MODULES as u8), None);
    }

    #[test]
    fn test_pad_name() {
        assert_eq!(pad_name("gsm"), "gsm    ");
        assert_eq!(pad_name("sensors"), "sensors");
        assert_eq!(pad_name("toolongname"), "toolongname");
    }
}
