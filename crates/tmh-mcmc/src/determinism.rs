use tmh_core::derive_substream_seed;

const INIT_SALT: u64 = 0x1A17_1A17_1A17_1A17;

/// Seed for the prior run that produces the starting trace.
pub fn init_seed(master_seed: u64) -> u64 {
    derive_substream_seed(master_seed ^ INIT_SALT, 0)
}

/// Seed for the kernel application at `iteration`.
pub fn transition_seed(master_seed: u64, iteration: usize) -> u64 {
    derive_substream_seed(master_seed, iteration as u64)
}
