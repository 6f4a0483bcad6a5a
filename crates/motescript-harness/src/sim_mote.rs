//! In-memory motes.
//!
//! A `SimMote` stands in for a simulated device: it has an id and a flat RAM
//! image with a symbol table, which is all the accessor needs.

use std::collections::BTreeMap;

use motescript_core::{AccessError, Endianness, MemoryImage, Node, NodeId, Symbol, VarWidth};

/// Start of the simulated RAM region.
pub const RAM_BASE: u64 = 0x1c00;

/// Port variables declared by the stock exercise firmware.
pub const FIRMWARE_PORT_VARIABLES: [&str; 3] =
    ["tcp_test_port", "udp_server_port", "udp_client_port"];

/// RAM image plus symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimMemory {
    symbols: BTreeMap<String, Symbol>,
    bytes: Vec<u8>,
    endianness: Endianness,
}

impl SimMemory {
    /// Empty image.
    pub fn new(endianness: Endianness) -> Self {
        Self { symbols: BTreeMap::new(), bytes: Vec::new(), endianness }
    }

    /// Declare a zero-initialized variable, aligned to its width.
    ///
    /// Redeclaring a name returns the existing symbol.
    pub fn define(&mut self, name: &str, width: VarWidth) -> Symbol {
        if let Some(symbol) = self.symbols.get(name) {
            return *symbol;
        }

        let size = width.bytes();
        let offset = self.bytes.len().next_multiple_of(size);
        self.bytes.resize(offset + size, 0);

        let symbol = Symbol { address: RAM_BASE + offset as u64, size };
        self.symbols.insert(name.to_string(), symbol);
        symbol
    }

    /// Raw RAM contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn range(&self, address: u64, len: usize) -> Result<std::ops::Range<usize>, AccessError> {
        let out_of_bounds = AccessError::OutOfBounds { address, len };
        let start = address
            .checked_sub(RAM_BASE)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(|| out_of_bounds.clone())?;
        let end = start.checked_add(len).ok_or_else(|| out_of_bounds.clone())?;

        if end > self.bytes.len() {
            return Err(out_of_bounds);
        }
        Ok(start..end)
    }
}

impl MemoryImage for SimMemory {
    fn resolve(&self, name: &str) -> Option<Symbol> {
        self.symbols.get(name).copied()
    }

    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), AccessError> {
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<(), AccessError> {
        let range = self.range(address, bytes.len())?;
        self.bytes[range].copy_from_slice(bytes);
        Ok(())
    }

    fn endianness(&self) -> Endianness {
        self.endianness
    }
}

/// A simulated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimMote {
    id: NodeId,
    memory: SimMemory,
}

impl SimMote {
    /// Mote with an empty little-endian image.
    pub fn new(id: NodeId) -> Self {
        Self { id, memory: SimMemory::new(Endianness::Little) }
    }

    /// Mote running the stock exercise firmware (all port variables).
    pub fn with_firmware_layout(id: NodeId) -> Self {
        FIRMWARE_PORT_VARIABLES
            .iter()
            .fold(Self::new(id), |mote, name| mote.with_variable(name, VarWidth::Int16))
    }

    /// Declare an additional variable.
    #[must_use]
    pub fn with_variable(mut self, name: &str, width: VarWidth) -> Self {
        self.memory.define(name, width);
        self
    }

    /// Switch the image's byte order.
    #[must_use]
    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.memory.endianness = endianness;
        self
    }
}

impl Node for SimMote {
    type Memory = SimMemory;

    fn id(&self) -> NodeId {
        self.id
    }

    fn memory(&self) -> &SimMemory {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut SimMemory {
        &mut self.memory
    }
}
