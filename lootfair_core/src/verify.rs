use serde::{Deserialize, Serialize};

use crate::{
    error::FairResult,
    rng::{commitment_hash, roll_integer, ROLL_DIVISOR},
    selector::{select_winner, WeightedItem},
};

/// Independent recomputation of a disclosed roll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub server_seed_hash: String,
    pub roll_integer: u32,
    pub roll_value: f64,
    pub winning_item_id: Option<String>,
}

/// Recomputes hash, roll and (given the case's ordered items) the winner from revealed seeds.
pub fn verify_roll(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    items: Option<&[WeightedItem]>,
) -> FairResult<Verification> {
    let integer = roll_integer(server_seed, client_seed, nonce);
    let roll_value = integer as f64 / ROLL_DIVISOR;
    let winning_item_id = match items {
        Some(items) => Some(select_winner(items, roll_value)?.id.clone()),
        None => None,
    };
    Ok(Verification {
        server_seed_hash: commitment_hash(server_seed),
        roll_integer: integer,
        roll_value,
        winning_item_id,
    })
}
