pub mod bellatrix {
    pub const INTERVALS_PER_SLOT: u64 = 3;
}

pub mod deneb {
    pub use kzg::VERSIONED_HASH_VERSION_KZG;
}
