//! Cart line reconciliation.
//!
//! A cart line is identified by its product and the exact set of variations
//! selected for it. Adding the same product with the same variations bumps
//! the existing line; anything else starts a new line. Login-time merging
//! applies the same rule to move a guest cart into an account cart.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The variations selected for a cart or order line, compared as a set.
///
/// Ordering of selection does not matter and duplicates collapse, so
/// `{red, XL}` and `{XL, red}` are the same line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariationSet(BTreeSet<i64>);

impl VariationSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<i64> {
        self.0.iter().copied().collect()
    }
}

impl FromIterator<i64> for VariationSet {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<i64>> for VariationSet {
    fn from(ids: Vec<i64>) -> Self {
        ids.into_iter().collect()
    }
}

/// The identity-relevant part of a cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    pub id: i64,
    pub product_id: i64,
    pub variations: VariationSet,
    pub quantity: i32,
}

impl CartLine {
    #[must_use]
    pub fn matches(&self, product_id: i64, variations: &VariationSet) -> bool {
        self.product_id == product_id && &self.variations == variations
    }
}

/// Returns the id of the first line in `lines` for the same product with an
/// identical variation set.
///
/// Callers pass lines in ascending id order, so the oldest matching line
/// wins when more than one matches.
#[must_use]
pub fn find_matching_line(
    lines: &[CartLine],
    product_id: i64,
    variations: &VariationSet,
) -> Option<i64> {
    lines
        .iter()
        .find(|line| line.matches(product_id, variations))
        .map(|line| line.id)
}

/// One step of moving a guest cart into an account cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Add the guest line's quantity to an existing account line, then drop
    /// the guest line.
    Absorb {
        guest_line_id: i64,
        into_line_id: i64,
        quantity: i32,
    },
    /// Hand the guest line over to the account unchanged.
    Reassign { guest_line_id: i64 },
}

/// Plans the login-time merge of `guest` lines into `account` lines.
///
/// Each guest line is matched against the account's lines by product and
/// exact variation set. A match absorbs the guest quantity into the first
/// matching account line; otherwise the guest line is reassigned. Reassigned
/// lines join the candidate list, so two guest lines for the same product
/// and variations still end up as one account line.
#[must_use]
pub fn plan_merge(guest: &[CartLine], account: &[CartLine]) -> Vec<MergeAction> {
    let mut candidates: Vec<CartLine> = account.to_vec();
    let mut actions = Vec::with_capacity(guest.len());

    for line in guest {
        match find_matching_line(&candidates, line.product_id, &line.variations) {
            Some(into_line_id) => actions.push(MergeAction::Absorb {
                guest_line_id: line.id,
                into_line_id,
                quantity: line.quantity,
            }),
            None => {
                actions.push(MergeAction::Reassign {
                    guest_line_id: line.id,
                });
                candidates.push(line.clone());
            }
        }
    }

    actions
}

/// Result of decrementing a line by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decrement {
    /// The line survives with this quantity.
    Reduced(i32),
    /// The line would drop below one and must be deleted.
    Delete,
}

/// Decides what happens to a line of `quantity` when one unit is removed.
#[must_use]
pub fn decrement(quantity: i32) -> Decrement {
    if quantity > 1 {
        Decrement::Reduced(quantity - 1)
    } else {
        Decrement::Delete
    }
}

#[cfg(test)]
#[path = "cart_test.rs"]
mod tests;
