pub use metrics::*;
use std::sync::LazyLock;

pub static SEEN_BLOCK_INPUT_CACHE_SIZE: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "block_input_seen_cache_size",
        "Number of block inputs currently tracked by the seen cache",
    )
});

pub static BLOCK_INPUT_CREATED_BY_BLOCK: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "block_input_created_by_block_total",
        "Block inputs created from a block sighting",
        &["source"],
    )
});

pub static BLOCK_INPUT_CREATED_BY_SIDECAR: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "block_input_created_by_sidecar_total",
        "Block inputs created from a sidecar sighting",
        &["source"],
    )
});

pub static DUPLICATE_BLOCK_SIGHTINGS: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "block_input_duplicate_block_total",
        "Block sightings that were already cached",
        &["source"],
    )
});

pub static DUPLICATE_BLOB_SIGHTINGS: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "block_input_duplicate_blob_total",
        "Blob sidecar sightings that were already cached",
        &["source"],
    )
});

pub static DUPLICATE_COLUMN_SIGHTINGS: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "block_input_duplicate_column_total",
        "Data-column sidecar sightings that were already cached",
        &["source"],
    )
});

pub static BLOBS_FROM_EL_EXPECTED: LazyLock<Result<Histogram>> = LazyLock::new(|| {
    try_create_histogram(
        "block_input_blobs_from_el_expected",
        "Number of blobs expected when querying the execution engine",
    )
});

pub static BLOBS_FROM_EL_RECEIVED: LazyLock<Result<Histogram>> = LazyLock::new(|| {
    try_create_histogram(
        "block_input_blobs_from_el_received",
        "Number of blobs returned by the execution engine",
    )
});

pub static BLOBS_FROM_EL_HIT_TOTAL: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_blobs_from_el_hit_total",
        "Engine blob queries that returned at least one blob",
    )
});

pub static BLOBS_FROM_EL_MISS_TOTAL: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_blobs_from_el_miss_total",
        "Engine blob queries that returned no blobs",
    )
});

pub static BLOBS_FROM_EL_ERROR_TOTAL: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_blobs_from_el_error_total",
        "Engine blob queries that failed outright",
    )
});

pub static PERSISTED_BLOCK_INPUTS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_persisted_total",
        "Block inputs written to the store after import",
    )
});

pub static PERSIST_ERRORS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_persist_errors_total",
        "Store write failures while persisting block inputs",
    )
});
