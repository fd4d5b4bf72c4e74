use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::filter::SerialFilter;
use crate::error::PayrollError;
use crate::model::serial::{SerialNumber, SerialSpec};
use crate::store::{PayrollStore, StoreTx};

/// Upper-case letters minus the ones easily mistaken for digits.
const LETTERS: &[u8] = b"ABCDEFGHJKLMNPRSTUVWXYZ";

/// Mints identifiers that are unique once they survive the storage unique constraint.
///
/// The counter and timestamp only spread out the random seeds of concurrent callers;
/// collisions are expected and retried.
pub struct SerialNumberGenerator {
    counter: Mutex<u16>,
    salt: u64,
    filter: SerialFilter,
    max_attempts: usize,
    max_batch_attempts: usize,
}

impl SerialNumberGenerator {
    pub fn new(filter: SerialFilter, max_attempts: usize, max_batch_attempts: usize) -> Self {
        Self {
            counter: Mutex::new(rand::random()),
            salt: rand::random(),
            filter,
            max_attempts,
            max_batch_attempts,
        }
    }

    pub fn filter(&self) -> &SerialFilter {
        &self.filter
    }

    /// Mints one serial inside the caller's unit of work.
    pub async fn next<T: StoreTx>(
        &self,
        tx: &mut T,
        spec: &SerialSpec,
        now: DateTime<Utc>,
    ) -> Result<String, PayrollError> {
        check_spec(spec)?;

        for _ in 0..self.max_attempts {
            let value = self.candidate(spec, now);
            if self.filter.might_exist(&value) {
                continue;
            }
            if self.persist(tx, &value, spec, now).await? {
                return Ok(value);
            }
        }

        tracing::error!(
            purpose = %spec.purpose,
            attempts = self.max_attempts,
            "serial number generation exhausted"
        );
        Err(PayrollError::SerialExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Mints and commits `count` serials. Each round is its own unit of work and only
    /// the shortfall of the previous round is generated again.
    pub async fn next_batch<S: PayrollStore>(
        &self,
        store: &S,
        count: usize,
        spec: &SerialSpec,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, PayrollError> {
        check_spec(spec)?;

        let mut minted = Vec::with_capacity(count);
        let mut rejected = 0;

        while minted.len() < count {
            if rejected >= self.max_batch_attempts {
                return Err(self.batch_exhausted(spec, minted.len(), count));
            }

            let shortfall = count - minted.len();
            let mut tx = store.begin().await?;
            let mut accepted = Vec::with_capacity(shortfall);
            for _ in 0..shortfall {
                let value = self.candidate(spec, now);
                if self.filter.might_exist(&value)
                    || !self.persist(&mut tx, &value, spec, now).await?
                {
                    rejected += 1;
                    continue;
                }
                accepted.push(value);
            }
            tx.commit().await?;

            tracing::debug!(
                accepted = accepted.len(),
                shortfall,
                rejected,
                "serial batch round committed"
            );
            minted.extend(accepted);
        }

        Ok(minted)
    }

    async fn persist<T: StoreTx>(
        &self,
        tx: &mut T,
        value: &str,
        spec: &SerialSpec,
        now: DateTime<Utc>,
    ) -> Result<bool, PayrollError> {
        let serial = SerialNumber {
            value: value.to_string(),
            purpose: spec.purpose.clone(),
            created_at: now,
        };
        if !tx.insert_serial(&serial).await? {
            tracing::debug!(serial = value, "serial candidate collided");
            return Ok(false);
        }
        self.filter.insert(value);
        Ok(true)
    }

    fn candidate(&self, spec: &SerialSpec, now: DateTime<Utc>) -> String {
        let mut rng = StdRng::seed_from_u64(self.seed(now));

        let mut body: Vec<u8> = (0..spec.total_length - spec.letter_count)
            .map(|_| b'0' + rng.gen_range(0..10))
            .collect();
        for _ in 0..spec.letter_count {
            body.push(LETTERS[rng.gen_range(0..LETTERS.len())]);
        }
        body.shuffle(&mut rng);

        let mut value = String::with_capacity(spec.prefix.len() + body.len());
        value.push_str(&spec.prefix);
        value.extend(body.into_iter().map(char::from));
        value
    }

    fn seed(&self, now: DateTime<Utc>) -> u64 {
        let tick = {
            let mut counter = self.counter.lock().expect("serial counter poisoned");
            *counter = counter.wrapping_add(1);
            *counter
        };
        (((now.timestamp_millis() as u64) << 16) | u64::from(tick)) ^ self.salt
    }

    fn batch_exhausted(&self, spec: &SerialSpec, minted: usize, count: usize) -> PayrollError {
        tracing::error!(
            purpose = %spec.purpose,
            minted,
            count,
            attempts = self.max_batch_attempts,
            "serial number batch generation exhausted"
        );
        PayrollError::SerialExhausted {
            attempts: self.max_batch_attempts,
        }
    }
}

fn check_spec(spec: &SerialSpec) -> Result<(), PayrollError> {
    if spec.total_length == 0 {
        return Err(PayrollError::validation(
            "invalid_serial_spec",
            "serial length must be positive",
        ));
    }
    if spec.letter_count > spec.total_length {
        return Err(PayrollError::validation(
            "invalid_serial_spec",
            "letter count exceeds serial length",
        ));
    }
    Ok(())
}
