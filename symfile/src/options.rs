//! Options for opening a symbol file.

/// Controls how addresses are computed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SymbolFileOptions {
    /// The address at which the image is loaded. Section-relative addresses are relocated by
    /// this amount.
    pub load_address: u64,
    /// The size in bytes of an address on the target. This is the width of the operand of
    /// `DW_OP_addr` in location expressions.
    pub address_size: u8,
}

impl Default for SymbolFileOptions {
    fn default() -> Self {
        Self {
            load_address: 0,
            address_size: 8,
        }
    }
}

impl SymbolFileOptions {
    /// Sets `load_address`.
    pub fn with_load_address(mut self, load_address: u64) -> Self {
        self.load_address = load_address;
        self
    }

    /// Sets `address_size`.
    pub fn with_address_size(mut self, address_size: u8) -> Self {
        self.address_size = address_size;
        self
    }
}

#[test]
fn builder_setters() {
    let o = SymbolFileOptions::default();
    assert_eq!(o.load_address, 0);
    assert_eq!(o.address_size, 8);

    let o = o.with_load_address(0x1_4000_0000).with_address_size(4);
    assert_eq!(o.load_address, 0x1_4000_0000);
    assert_eq!(o.address_size, 4);
}
