use serde::{Deserialize, Serialize};

use crate::error::{FairError, FairResult};

/// Catalog item as seen by the selector. Weights are relative; they need not sum to 1 or 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedItem {
    pub id: String,
    pub weight: f64,
}

impl WeightedItem {
    pub fn new(id: impl Into<String>, weight: f64) -> Self {
        Self {
            id: id.into(),
            weight,
        }
    }
}

/// Checks a case's items can be rolled against, returning the total weight.
pub fn validate_items(items: &[WeightedItem]) -> FairResult<f64> {
    if items.is_empty() {
        return Err(FairError::EmptyItemSet);
    }
    if let Some(bad) = items
        .iter()
        .find(|item| !item.weight.is_finite() || item.weight < 0.0)
    {
        return Err(FairError::InvalidWeight(format!(
            "item {} has weight {}",
            bad.id, bad.weight
        )));
    }
    let total: f64 = items.iter().map(|item| item.weight).sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(FairError::InvalidWeight(format!("total weight {total}")));
    }
    Ok(total)
}

/// Picks the winner for `roll` in supplied order: the first item whose running
/// weight exceeds `roll * total`. Float residue past the last threshold falls
/// back to the last item.
pub fn select_winner(items: &[WeightedItem], roll: f64) -> FairResult<&WeightedItem> {
    let total = validate_items(items)?;
    if !(0.0..1.0).contains(&roll) {
        return Err(FairError::InvalidRoll(roll));
    }
    let target = roll * total;
    let mut threshold = 0.0;
    for item in items {
        threshold += item.weight;
        if target < threshold {
            return Ok(item);
        }
    }
    // validate_items guarantees at least one item
    Ok(&items[items.len() - 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case() -> Vec<WeightedItem> {
        vec![
            WeightedItem::new("knife", 10.0),
            WeightedItem::new("gloves", 20.0),
            WeightedItem::new("sticker", 70.0),
        ]
    }

    #[test]
    fn picks_by_cumulative_threshold() {
        let items = case();
        assert_eq!(select_winner(&items, 0.05).unwrap().id, "knife");
        assert_eq!(select_winner(&items, 0.25).unwrap().id, "gloves");
        assert_eq!(select_winner(&items, 0.95).unwrap().id, "sticker");
    }

    #[test]
    fn boundary_goes_to_next_item() {
        let items = case();
        // target 10 is not < 10, so the first item does not win
        assert_eq!(select_winner(&items, 0.10).unwrap().id, "gloves");
        assert_eq!(select_winner(&items, 0.0).unwrap().id, "knife");
    }

    #[test]
    fn single_item_always_wins() {
        let items = vec![WeightedItem::new("only", 3.5)];
        for roll in [0.0, 0.3, 0.999_999_999] {
            assert_eq!(select_winner(&items, roll).unwrap().id, "only");
        }
    }

    #[test]
    fn zero_weight_items_never_win() {
        let items = vec![
            WeightedItem::new("ghost", 0.0),
            WeightedItem::new("real", 1.0),
        ];
        assert_eq!(select_winner(&items, 0.0).unwrap().id, "real");
    }

    #[test]
    fn roll_near_one_picks_last_item() {
        let items: Vec<WeightedItem> = (0..10)
            .map(|i| WeightedItem::new(format!("i{i}"), 0.1))
            .collect();
        let roll = 0.999_999_999_999_999_9;
        assert_eq!(select_winner(&items, roll).unwrap().id, "i9");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(select_winner(&[], 0.5), Err(FairError::EmptyItemSet)));
        let zero = vec![WeightedItem::new("a", 0.0)];
        assert!(matches!(select_winner(&zero, 0.5), Err(FairError::InvalidWeight(_))));
        let negative = vec![WeightedItem::new("a", 5.0), WeightedItem::new("b", -1.0)];
        assert!(matches!(validate_items(&negative), Err(FairError::InvalidWeight(_))));
        let nan = vec![WeightedItem::new("a", f64::NAN)];
        assert!(matches!(validate_items(&nan), Err(FairError::InvalidWeight(_))));
        assert!(matches!(select_winner(&case(), 1.0), Err(FairError::InvalidRoll(_))));
    }
}
