//! Six-digit identifier allocation shared by every entity kind.

use crate::error::{Error, Result};
use rand::Rng;
use std::collections::HashSet;

pub const ID_MIN: u32 = 100_000;
pub const ID_MAX: u32 = 1_000_000;

/// Draw an id from the six-digit space that is not already in use.
///
/// Callers pass the union of ids across users, resources and polls so the
/// namespace stays global across entity kinds; bulk import mutates the
/// document row by row, so ids allocated earlier in a batch are already in
/// the set on the next call.
pub fn allocate(existing: &HashSet<u32>) -> Result<u32> {
    if existing.len() >= (ID_MAX - ID_MIN) as usize {
        return Err(Error::IdSpaceExhausted);
    }
    let mut rng = rand::thread_rng();
    loop {
        let id = rng.gen_range(ID_MIN..ID_MAX);
        if !existing.contains(&id) {
            return Ok(id);
        }
    }
}
