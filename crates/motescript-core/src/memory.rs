//! Typed access to named variables in a node's memory image.
//!
//! A plan never touches node memory directly. It names a firmware variable
//! (`tcp_test_port`, `udp_server_port`, ...) and the [`VarAccessor`] resolves
//! that symbol against the node's layout, checks the declared width and
//! performs a width-bounded store.
//!
//! # Invariants
//!
//! - Write guard: if the symbol does not resolve, memory is not touched.
//! - Width guard: the symbol's declared size must equal the access width.
//! - Verbose read-back is observational only and never changes the outcome
//!   of the write.

use std::fmt;

use crate::error::AccessError;

/// Identifier of a simulated node (mote), as reported by the simulator.
pub type NodeId = u32;

/// Byte order of a node's memory image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Least significant byte first (MSP430, ARM Cortex-M).
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// Resolved location of a named variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    /// Start address in the node's address space.
    pub address: u64,
    /// Declared storage size in bytes.
    pub size: usize,
}

/// Memory layout and raw byte storage of a single node.
///
/// Production and test implementations differ only in what backs the
/// storage: a real simulated node or an in-memory fake.
pub trait MemoryImage {
    /// Resolve a symbolic name to its address and size.
    fn resolve(&self, name: &str) -> Option<Symbol>;

    /// Read `buf.len()` bytes starting at `address`.
    fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), AccessError>;

    /// Write `bytes` starting at `address`.
    fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<(), AccessError>;

    /// Byte order used for multi-byte values.
    fn endianness(&self) -> Endianness {
        Endianness::Little
    }
}

/// Handle to a participating node.
pub trait Node {
    /// Memory image type backing this node.
    type Memory: MemoryImage;

    /// Node identifier.
    fn id(&self) -> NodeId;

    /// Read-only view of the node's memory.
    fn memory(&self) -> &Self::Memory;

    /// Mutable view of the node's memory.
    fn memory_mut(&mut self) -> &mut Self::Memory;
}

/// Access width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarWidth {
    /// One byte, interpreted as a boolean.
    Bool8,
    /// Two bytes, unsigned.
    Int16,
}

impl VarWidth {
    /// Width in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::Bool8 => 1,
            Self::Int16 => 2,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Bool8 => "bool",
            Self::Int16 => "int16",
        }
    }
}

/// A typed value written to or read from a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarValue {
    /// Boolean stored as a single byte (0 or 1).
    Bool(bool),
    /// 16-bit integer.
    Int16(u16),
}

impl VarValue {
    /// Access width of this value.
    pub fn width(self) -> VarWidth {
        match self {
            Self::Bool(_) => VarWidth::Bool8,
            Self::Int16(_) => VarWidth::Int16,
        }
    }

    fn encode(self, endianness: Endianness) -> Vec<u8> {
        match (self, endianness) {
            (Self::Bool(b), _) => vec![u8::from(b)],
            (Self::Int16(v), Endianness::Little) => v.to_le_bytes().to_vec(),
            (Self::Int16(v), Endianness::Big) => v.to_be_bytes().to_vec(),
        }
    }

    fn decode(width: VarWidth, bytes: &[u8], endianness: Endianness) -> Option<Self> {
        match width {
            VarWidth::Bool8 => bytes.first().map(|b| Self::Bool(*b != 0)),
            VarWidth::Int16 => {
                let raw: [u8; 2] = bytes.try_into().ok()?;
                let value = match endianness {
                    Endianness::Little => u16::from_le_bytes(raw),
                    Endianness::Big => u16::from_be_bytes(raw),
                };
                Some(Self::Int16(value))
            },
        }
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int16(v) => write!(f, "{v}"),
        }
    }
}

/// Outcome of a successful write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    /// Symbol that was written.
    pub symbol: Symbol,
    /// Value read back before the write (verbose mode only).
    pub previous: Option<VarValue>,
}

/// Resolves named variables and performs width-bounded reads and writes.
#[derive(Debug, Clone, Copy, Default)]
pub struct VarAccessor {
    verbose: bool,
}

impl VarAccessor {
    /// Accessor without read-before-write auditing.
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Accessor that reads and logs the previous value before each write.
    pub fn verbose() -> Self {
        Self { verbose: true }
    }

    /// Whether read-before-write auditing is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Write `value` to the variable `name` on `node`.
    ///
    /// Returns `false` (and logs the reason) if the variable cannot be
    /// written. Never panics on a missing symbol.
    pub fn write<N: Node>(&self, node: &mut N, name: &str, value: VarValue) -> bool {
        match self.try_write(node, name, value) {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(node = node.id(), "ERR: {}", e);
                false
            },
        }
    }

    /// Write a boolean variable.
    pub fn set_bool<N: Node>(&self, node: &mut N, name: &str, value: bool) -> bool {
        self.write(node, name, VarValue::Bool(value))
    }

    /// Write a 16-bit integer variable.
    pub fn set_int16<N: Node>(&self, node: &mut N, name: &str, value: u16) -> bool {
        self.write(node, name, VarValue::Int16(value))
    }

    /// Write `value` to `name`, reporting the failure reason.
    pub fn try_write<N: Node>(
        &self,
        node: &mut N,
        name: &str,
        value: VarValue,
    ) -> Result<WriteReport, AccessError> {
        let node_id = node.id();
        let memory = node.memory_mut();
        let symbol = resolve_checked(memory, name, value.width())?;

        let previous = if self.verbose {
            match read_symbol(memory, symbol, value.width()) {
                Ok(old) => {
                    tracing::info!(
                        node = node_id,
                        "Set {} {} (address 0x{:x}/{}: {}) to {}",
                        value.width().label(),
                        name,
                        symbol.address,
                        symbol.size,
                        old,
                        value
                    );
                    Some(old)
                },
                Err(e) => {
                    tracing::warn!(node = node_id, "read-back of '{}' failed: {}", name, e);
                    None
                },
            }
        } else {
            None
        };

        let bytes = value.encode(memory.endianness());
        memory.write_bytes(symbol.address, &bytes)?;

        Ok(WriteReport { symbol, previous })
    }

    /// Read the variable `name` at the given width.
    pub fn read<N: Node>(
        &self,
        node: &N,
        name: &str,
        width: VarWidth,
    ) -> Result<VarValue, AccessError> {
        let memory = node.memory();
        let symbol = resolve_checked(memory, name, width)?;
        read_symbol(memory, symbol, width)
    }
}

fn resolve_checked<M: MemoryImage>(
    memory: &M,
    name: &str,
    width: VarWidth,
) -> Result<Symbol, AccessError> {
    let symbol =
        memory.resolve(name).ok_or_else(|| AccessError::VariableNotFound { name: name.to_string() })?;

    if symbol.size != width.bytes() {
        return Err(AccessError::WidthMismatch {
            name: name.to_string(),
            expected: width.bytes(),
            actual: symbol.size,
        });
    }

    Ok(symbol)
}

fn read_symbol<M: MemoryImage>(
    memory: &M,
    symbol: Symbol,
    width: VarWidth,
) -> Result<VarValue, AccessError> {
    let mut buf = vec![0u8; width.bytes()];
    memory.read_bytes(symbol.address, &mut buf)?;
    VarValue::decode(width, &buf, memory.endianness())
        .ok_or(AccessError::OutOfBounds { address: symbol.address, len: width.bytes() })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    /// Flat byte image with a fixed symbol table.
    struct FakeMemory {
        symbols: HashMap<String, Symbol>,
        bytes: Vec<u8>,
        endianness: Endianness,
    }

    impl MemoryImage for FakeMemory {
        fn resolve(&self, name: &str) -> Option<Symbol> {
            self.symbols.get(name).copied()
        }

        fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), AccessError> {
            let start = address as usize;
            let src = self
                .bytes
                .get(start..start + buf.len())
                .ok_or(AccessError::OutOfBounds { address, len: buf.len() })?;
            buf.copy_from_slice(src);
            Ok(())
        }

        fn write_bytes(&mut self, address: u64, bytes: &[u8]) -> Result<(), AccessError> {
            let start = address as usize;
            let dst = self
                .bytes
                .get_mut(start..start + bytes.len())
                .ok_or(AccessError::OutOfBounds { address, len: bytes.len() })?;
            dst.copy_from_slice(bytes);
            Ok(())
        }

        fn endianness(&self) -> Endianness {
            self.endianness
        }
    }

    struct FakeNode {
        memory: FakeMemory,
    }

    impl Node for FakeNode {
        type Memory = FakeMemory;

        fn id(&self) -> NodeId {
            7
        }

        fn memory(&self) -> &FakeMemory {
            &self.memory
        }

        fn memory_mut(&mut self) -> &mut FakeMemory {
            &mut self.memory
        }
    }

    fn node(endianness: Endianness) -> FakeNode {
        let mut symbols = HashMap::new();
        symbols.insert("port".to_string(), Symbol { address: 0, size: 2 });
        symbols.insert("enabled".to_string(), Symbol { address: 2, size: 1 });
        symbols.insert("dangling".to_string(), Symbol { address: 30, size: 2 });
        FakeNode { memory: FakeMemory { symbols, bytes: vec![0; 8], endianness } }
    }

    #[test]
    fn int16_write_is_little_endian_by_default() {
        let mut n = node(Endianness::Little);
        assert!(VarAccessor::new().set_int16(&mut n, "port", 0x1234));
        assert_eq!(&n.memory.bytes[..2], &[0x34, 0x12]);
    }

    #[test]
    fn int16_write_respects_big_endian() {
        let mut n = node(Endianness::Big);
        assert!(VarAccessor::new().set_int16(&mut n, "port", 0x1234));
        assert_eq!(&n.memory.bytes[..2], &[0x12, 0x34]);
    }

    #[test]
    fn bool_write_stores_single_byte() {
        let mut n = node(Endianness::Little);
        assert!(VarAccessor::new().set_bool(&mut n, "enabled", true));
        assert_eq!(n.memory.bytes, vec![0, 0, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn missing_variable_returns_false_and_leaves_memory_untouched() {
        let mut n = node(Endianness::Little);
        let before = n.memory.bytes.clone();

        assert!(!VarAccessor::verbose().set_int16(&mut n, "no_such_var", 80));
        assert_eq!(n.memory.bytes, before);
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let mut n = node(Endianness::Little);
        let err = VarAccessor::new().try_write(&mut n, "enabled", VarValue::Int16(1)).unwrap_err();
        assert_eq!(
            err,
            AccessError::WidthMismatch { name: "enabled".to_string(), expected: 2, actual: 1 }
        );
        assert_eq!(n.memory.bytes, vec![0; 8]);
    }

    #[test]
    fn verbose_write_reports_previous_value() {
        let mut n = node(Endianness::Little);
        let accessor = VarAccessor::verbose();

        let first = accessor.try_write(&mut n, "port", VarValue::Int16(1883)).unwrap();
        assert_eq!(first.previous, Some(VarValue::Int16(0)));

        let second = accessor.try_write(&mut n, "port", VarValue::Int16(443)).unwrap();
        assert_eq!(second.previous, Some(VarValue::Int16(1883)));
        assert_eq!(second.symbol, Symbol { address: 0, size: 2 });
    }

    #[test]
    fn quiet_write_skips_read_back() {
        let mut n = node(Endianness::Little);
        let report = VarAccessor::new().try_write(&mut n, "port", VarValue::Int16(80)).unwrap();
        assert_eq!(report.previous, None);
    }

    #[test]
    fn out_of_bounds_symbol_fails_softly() {
        let mut n = node(Endianness::Little);
        assert!(!VarAccessor::new().set_int16(&mut n, "dangling", 80));
    }

    #[test]
    fn read_returns_written_value() {
        let mut n = node(Endianness::Big);
        let accessor = VarAccessor::new();
        accessor.set_int16(&mut n, "port", 5683);
        accessor.set_bool(&mut n, "enabled", true);

        assert_eq!(accessor.read(&n, "port", VarWidth::Int16), Ok(VarValue::Int16(5683)));
        assert_eq!(accessor.read(&n, "enabled", VarWidth::Bool8), Ok(VarValue::Bool(true)));
    }

    /// Memory whose reads always fail, as on a write-only peripheral window.
    struct WriteOnlyNode {
        bytes: [u8; 2],
    }

    impl MemoryImage for WriteOnlyNode {
        fn resolve(&self, name: &str) -> Option<Symbol> {
            (name == "port").then_some(Symbol { address: 0x40, size: 2 })
        }

        fn read_bytes(&self, address: u64, buf: &mut [u8]) -> Result<(), AccessError> {
            Err(AccessError::OutOfBounds { address, len: buf.len() })
        }

        fn write_bytes(&mut self, _address: u64, bytes: &[u8]) -> Result<(), AccessError> {
            self.bytes.copy_from_slice(bytes);
            Ok(())
        }
    }

    impl Node for WriteOnlyNode {
        type Memory = Self;

        fn id(&self) -> NodeId {
            2
        }

        fn memory(&self) -> &Self {
            self
        }

        fn memory_mut(&mut self) -> &mut Self {
            self
        }
    }

    #[test]
    fn failed_read_back_does_not_block_verbose_write() {
        let mut n = WriteOnlyNode { bytes: [0; 2] };
        let accessor = VarAccessor::verbose();

        let report = accessor.try_write(&mut n, "port", VarValue::Int16(0x1234)).unwrap();
        assert_eq!(report.previous, None);
        assert_eq!(n.bytes, [0x34, 0x12]);

        assert!(accessor.set_int16(&mut n, "port", 80));
        assert_eq!(n.bytes, [80, 0]);
    }
}
