//! Picks the fast or slow dispatch path and restores the caller's expected
//! ordering.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::PoolError;
use crate::{fast, slow};

pub(crate) enum Sequencing {
    Ordered,
    Unordered,
}

pub(crate) fn run_batch<F, T, O>(
    workers: usize,
    timeout: Option<Duration>,
    f: F,
    items: Vec<T>,
    sequencing: Sequencing,
) -> Result<Vec<O>, PoolError>
where
    F: Fn(T) -> O + Clone + Send + Sync + 'static,
    T: Serialize + DeserializeOwned + Send + 'static,
    O: Serialize + DeserializeOwned + Send + 'static,
{
    let work: Vec<(usize, T)> = items.into_iter().enumerate().collect();
    let mut outcomes = match timeout {
        None => fast::run(workers, f, work)?,
        Some(d) => slow::run(workers, d, f, work)?,
    };

    match sequencing {
        Sequencing::Ordered => {
            outcomes.sort_by_key(|(index, _)| *index);
        }
        Sequencing::Unordered => {}
    }
    Ok(outcomes.into_iter().map(|(_, value)| value).collect())
}
