//! Assigns the per-user weight both policies divide cluster resources by.

use std::collections::HashMap;

use crate::types::UserId;

pub trait ShareAssigner {
    fn user_share(&self, user: UserId) -> f64;
}

/// Every user gets the same weight.
pub struct EqualShare;

impl ShareAssigner for EqualShare {
    fn user_share(&self, _user: UserId) -> f64 {
        1.0
    }
}

/// Per-user weights loaded from a share file; users not listed fall back
/// to a weight of 1.0.
pub struct CustomShare(HashMap<UserId, f64>);

impl CustomShare {
    pub fn new(weights: HashMap<UserId, f64>) -> Self {
        Self(weights)
    }
}

impl ShareAssigner for CustomShare {
    fn user_share(&self, user: UserId) -> f64 {
        *self.0.get(&user).unwrap_or(&1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_share_is_always_one() {
        assert_eq!(EqualShare.user_share(1), 1.0);
        assert_eq!(EqualShare.user_share(42), 1.0);
    }

    #[test]
    fn custom_share_falls_back_to_one() {
        let mut weights = HashMap::new();
        weights.insert(1, 2.5);
        let shares = CustomShare::new(weights);
        assert_eq!(shares.user_share(1), 2.5);
        assert_eq!(shares.user_share(2), 1.0);
    }
}
