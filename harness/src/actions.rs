//! # Action Catalog
//!
//! The set of economic actions a token makes legal. The catalog is computed
//! once from the token's capability and never changes during a run.
//!
//! | Capability | Actions                                    |
//! |------------|--------------------------------------------|
//! | vault      | deposit, deposit all, withdraw, withdraw all |
//! | elastic    | rebase, buy, buy all, sell, sell all       |
//! | base       | none                                       |

use std::fmt;

use crate::token::Token;

/// Capability an action requires from the token under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Vault,
    Elastic,
}

/// A randomly selectable action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Deposit a random share of the reserve balance.
    Deposit,
    DepositAll,
    /// Withdraw a random share of the vault token balance.
    Withdraw,
    WithdrawAll,
    /// Rebase, if the token says one is available.
    Rebase,
    /// Convert a random share of the reference balance into the token.
    Buy,
    BuyAll,
    /// Convert a random share of the token balance into the reference.
    Sell,
    SellAll,
}

impl Action {
    /// Vault actions, in catalog order.
    pub const VAULT: [Action; 4] = [
        Action::Deposit,
        Action::DepositAll,
        Action::Withdraw,
        Action::WithdrawAll,
    ];

    /// Elastic actions, in catalog order.
    pub const ELASTIC: [Action; 5] = [
        Action::Rebase,
        Action::Buy,
        Action::BuyAll,
        Action::Sell,
        Action::SellAll,
    ];

    /// Upper-case label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Deposit => "DEPOSIT",
            Action::DepositAll => "DEPOSIT ALL",
            Action::Withdraw => "WITHDRAW",
            Action::WithdrawAll => "WITHDRAW ALL",
            Action::Rebase => "REBASE",
            Action::Buy => "BUY",
            Action::BuyAll => "BUY ALL",
            Action::Sell => "SELL",
            Action::SellAll => "SELL ALL",
        }
    }

    /// Whether the action spends the full balance instead of a random share.
    pub fn is_all(&self) -> bool {
        matches!(
            self,
            Action::DepositAll | Action::WithdrawAll | Action::BuyAll | Action::SellAll
        )
    }

    pub fn capability(&self) -> Capability {
        match self {
            Action::Deposit | Action::DepositAll | Action::Withdraw | Action::WithdrawAll => {
                Capability::Vault
            }
            _ => Capability::Elastic,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Capability {
    /// Whether `token` exposes this capability.
    pub fn held_by(&self, token: &Token) -> bool {
        match self {
            Capability::Vault => token.as_vault().is_some(),
            Capability::Elastic => token.as_elastic().is_some(),
        }
    }
}

/// Actions legal for `token`, in fixed order.
pub fn catalog(token: &Token) -> Vec<Action> {
    Action::VAULT
        .into_iter()
        .chain(Action::ELASTIC)
        .filter(|action| action.capability().held_by(token))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_log_format() {
        assert_eq!(Action::DepositAll.label(), "DEPOSIT ALL");
        assert_eq!(Action::Sell.to_string(), "SELL");
    }

    #[test]
    fn all_variants_are_flagged() {
        let all: Vec<_> = Action::VAULT
            .into_iter()
            .chain(Action::ELASTIC)
            .filter(Action::is_all)
            .collect();
        assert_eq!(
            all,
            vec![
                Action::DepositAll,
                Action::WithdrawAll,
                Action::BuyAll,
                Action::SellAll
            ]
        );
        assert!(all.iter().all(|a| a.label().ends_with(" ALL")));
    }

    #[test]
    fn capability_partitions_catalog() {
        assert!(Action::VAULT
            .iter()
            .all(|a| a.capability() == Capability::Vault));
        assert!(Action::ELASTIC
            .iter()
            .all(|a| a.capability() == Capability::Elastic));
    }
}
