use serde::{Deserialize, Serialize};

/// Parent-to-child: either one item to apply the target function to, or the
/// sentinel that tells a fast-path child its batch is done.
#[derive(Serialize, Deserialize)]
pub(crate) enum PoolMessage {
    Item { index: u64, payload: Vec<u8> },
    Shutdown,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct PoolResponse {
    pub index: u64,
    pub outcome: ItemOutcome,
}

#[derive(Serialize, Deserialize)]
pub(crate) enum ItemOutcome {
    Ok(Vec<u8>),
    Panicked(String),
}
