use std::sync::RwLock;

use anyhow::{Context, Result};
use autoscale_cuckoo_filter::CuckooFilter;

use crate::store::PayrollStore;

const FALSE_POSITIVE_RATE: f64 = 0.001;

/// Probabilistic set of serial values already minted.
///
/// A hit only means "maybe taken" and the candidate is thrown away; a miss still has to
/// survive the storage unique constraint.
pub struct SerialFilter {
    inner: RwLock<CuckooFilter<String>>,
}

impl SerialFilter {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(CuckooFilter::new(capacity, FALSE_POSITIVE_RATE)),
        }
    }

    pub fn might_exist(&self, serial: &str) -> bool {
        self.inner
            .read()
            .expect("serial filter poisoned")
            .contains(&serial.to_string())
    }

    pub fn insert(&self, serial: &str) {
        self.inner
            .write()
            .expect("serial filter poisoned")
            .add(&serial.to_string());
    }

    pub fn insert_batch(&self, serials: &[String]) {
        let mut filter = self.inner.write().expect("serial filter poisoned");
        for serial in serials {
            filter.add(serial);
        }
    }

    /// Loads every persisted serial, `chunk` rows per round trip.
    pub async fn warmup<S: PayrollStore>(&self, store: &S, chunk: u32) -> Result<usize> {
        let mut after_id = 0;
        let mut total = 0usize;

        loop {
            let rows = store
                .serial_chunk(after_id, chunk)
                .await
                .context("serial chunk fetch failed")?;
            let Some(&(last_id, _)) = rows.last() else {
                break;
            };

            let values: Vec<String> = rows.into_iter().map(|(_, value)| value).collect();
            self.insert_batch(&values);
            total += values.len();
            after_id = last_id;
        }

        tracing::info!(total, "serial filter warmup complete");
        Ok(total)
    }
}
