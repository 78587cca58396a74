pub use metrics::*;
use std::sync::LazyLock;

pub static BALANCER_ACTIVE_REQUESTS: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "block_input_sync_balancer_active_requests",
        "Total in-flight requests across all peers",
    )
});

pub static BALANCER_PEERS: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "block_input_sync_balancer_peers",
        "Peers currently known to the balancer",
    )
});

pub static PENDING_BLOCK_INPUTS: LazyLock<Result<IntGauge>> = LazyLock::new(|| {
    try_create_int_gauge(
        "block_input_sync_pending_blocks",
        "Entries in the driver's pending map",
    )
});

pub static PENDING_BLOCK_INPUTS_EVICTED: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_sync_pending_blocks_evicted_total",
        "Pending entries evicted because the map was full",
    )
});

pub static DOWNLOAD_ATTEMPTS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_sync_download_attempts_total",
        "By-root download attempts issued by the driver",
    )
});

pub static DOWNLOAD_OUTCOMES: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "block_input_sync_download_outcomes_total",
        "Terminal outcomes of by-root downloads",
        &["outcome"],
    )
});

pub static PROCESSED_BLOCKS: LazyLock<Result<IntCounterVec>> = LazyLock::new(|| {
    try_create_int_counter_vec(
        "block_input_sync_processed_blocks_total",
        "Blocks handed to the processor, by result",
        &["result"],
    )
});

pub static RANGE_RESPONSE_ERRORS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_sync_range_response_errors_total",
        "By-range responses rejected by validation",
    )
});

pub static RANGE_COLUMN_WARNINGS: LazyLock<Result<IntCounter>> = LazyLock::new(|| {
    try_create_int_counter(
        "block_input_sync_range_column_warnings_total",
        "By-range column responses kept despite warnings",
    )
});
