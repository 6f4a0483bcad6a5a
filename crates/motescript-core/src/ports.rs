//! Protocol port selection.
//!
//! Tests exercise the network stack on ports that real deployments use
//! (MQTT, CoAP, DNS, ...) and on random ephemeral ports. Selection is driven
//! by an explicitly passed, seeded generator so that a run can be replayed
//! from its simulation seed.

use std::ops::RangeInclusive;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Well-known protocol ports, in draw order.
///
/// The order is part of the replay contract: changing it changes which port
/// a given seed produces.
pub const WELL_KNOWN_PORTS: [u16; 24] = [
    20, 21, 22, 23, 53, 80, 123, 161, 443, 546, 5457, 1900, 5222, 5223, 5269, 5298, 5353, 5683,
    5684, 5671, 5672, 1883, 8882, 8883,
];

/// Ephemeral port range used by the overflow bucket.
pub const EPHEMERAL_PORTS: RangeInclusive<u16> = 32768..=65535;

/// Port value that firmware treats as "not configured".
pub const NEUTRAL_PORT: u16 = 0;

/// Whether `port` can be produced by [`PortAllocator::allocate`].
pub fn is_allocatable(port: u16) -> bool {
    WELL_KNOWN_PORTS.contains(&port) || EPHEMERAL_PORTS.contains(&port)
}

/// Seeded port allocator.
#[derive(Debug, Clone)]
pub struct PortAllocator<R = ChaCha8Rng> {
    rng: R,
}

impl PortAllocator<ChaCha8Rng> {
    /// Allocator seeded from the simulation seed.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: RngCore> PortAllocator<R> {
    /// Allocator drawing from `rng`.
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Pick a port for `role`.
    ///
    /// Draws uniformly among the well-known ports plus one overflow bucket;
    /// the overflow bucket yields a uniform ephemeral port.
    pub fn allocate(&mut self, role: &str) -> u16 {
        let bucket = self.rng.gen_range(0..=WELL_KNOWN_PORTS.len());
        let port = match WELL_KNOWN_PORTS.get(bucket) {
            Some(&port) => port,
            None => self.rng.gen_range(EPHEMERAL_PORTS),
        };

        tracing::info!("Using {} protocol {}", role, port);
        port
    }
}
