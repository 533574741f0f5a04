// Ordered-inventory reconciliation between the authoritative owner and its
// remote mirrors.
//
// The owner never ships the whole sequence on change. It compares the prior
// sequence length against the mirror's last-known length and emits exactly
// one indexed op - append, remove-at, or replace-at - which mirrors apply
// verbatim. That keeps reconciliation O(1) per change; a full snapshot is
// reserved for late-join bootstrap.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::quiver::{Quiver, QuiverChange, QuiverNode};

/// Indexed reconciliation op applied to a mirror, exactly as instructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuiverOp {
    Append { node: QuiverNode },
    RemoveAt { index: usize },
    ReplaceAt { index: usize, node: QuiverNode },
}

/// Owner-side bookkeeping: the sequence length each mirror last agreed to.
#[derive(Debug, Default)]
pub struct InventoryReplicator {
    mirror_lens: HashMap<u64, usize>,
}

impl InventoryReplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translates a local quiver mutation into the op to broadcast. Called by
    /// the authoritative owner after every add/remove/count change.
    pub fn reconcile(&mut self, owner: u64, quiver: &Quiver, change: QuiverChange) -> QuiverOp {
        let known = self.mirror_lens.get(&owner).copied().unwrap_or(0);
        let now = quiver.len();
        let op = if now > known {
            // The mirror is about to grow: ship the appended node.
            QuiverOp::Append {
                node: quiver.nodes()[now - 1],
            }
        } else if now < known {
            QuiverOp::RemoveAt {
                index: change.index,
            }
        } else {
            match quiver.nodes().get(change.index) {
                Some(&node) => QuiverOp::ReplaceAt {
                    index: change.index,
                    node,
                },
                // Drain of an absent kind: nothing to mirror, but the
                // remove-at is a safe no-op on the other side.
                None => QuiverOp::RemoveAt {
                    index: change.index,
                },
            }
        };
        self.mirror_lens.insert(owner, now);
        op
    }

    /// Forgets a departed owner so a rejoin starts from a fresh snapshot.
    pub fn forget(&mut self, owner: u64) {
        self.mirror_lens.remove(&owner);
    }
}

/// Mirror-side application. The mirror never recomputes diffs; out-of-bounds
/// indices are no-ops to survive out-of-order delivery.
pub fn apply_op(mirror: &mut Quiver, op: &QuiverOp) {
    match *op {
        QuiverOp::Append { node } => mirror.append_node(node),
        QuiverOp::RemoveAt { index } => mirror.remove_at(index),
        QuiverOp::ReplaceAt { index, node } => mirror.replace_at(index, node),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::AmmoKind;

    /// Owner mutation + reconcile + mirror apply in one step.
    fn replicate(
        replicator: &mut InventoryReplicator,
        owner_quiver: &mut Quiver,
        mirror: &mut Quiver,
        kind: AmmoKind,
        amount: i32,
    ) {
        let change = owner_quiver.collect(kind, amount);
        let op = replicator.reconcile(7, owner_quiver, change);
        apply_op(mirror, &op);
    }

    #[test]
    fn when_the_owner_gains_a_new_kind_then_the_mirror_appends() {
        let mut replicator = InventoryReplicator::new();
        let mut owner = Quiver::default();
        let mut mirror = Quiver::default();

        replicate(&mut replicator, &mut owner, &mut mirror, AmmoKind::Normal, 3);

        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.nodes()[0].kind, AmmoKind::Normal);
        assert_eq!(mirror.nodes()[0].count, 3);
    }

    #[test]
    fn when_only_a_count_changes_then_the_mirror_replaces_in_place() {
        let mut replicator = InventoryReplicator::new();
        let mut owner = Quiver::default();
        let mut mirror = Quiver::default();

        replicate(&mut replicator, &mut owner, &mut mirror, AmmoKind::Normal, 3);
        replicate(&mut replicator, &mut owner, &mut mirror, AmmoKind::Normal, 2);

        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.nodes()[0].count, 5);
    }

    #[test]
    fn when_a_kind_depletes_then_the_mirror_removes_at_the_same_index() {
        let mut replicator = InventoryReplicator::new();
        let mut owner = Quiver::default();
        let mut mirror = Quiver::default();

        replicate(&mut replicator, &mut owner, &mut mirror, AmmoKind::Normal, 1);
        replicate(&mut replicator, &mut owner, &mut mirror, AmmoKind::Ghost, 2);
        replicate(&mut replicator, &mut owner, &mut mirror, AmmoKind::Normal, -1);

        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.nodes()[0].kind, AmmoKind::Ghost);
    }

    #[test]
    fn when_many_ops_interleave_then_totals_converge() {
        let mut replicator = InventoryReplicator::new();
        let mut owner = Quiver::default();
        let mut mirror = Quiver::default();

        let moves: &[(AmmoKind, i32)] = &[
            (AmmoKind::Normal, 3),
            (AmmoKind::Anvil, 1),
            (AmmoKind::Normal, -1),
            (AmmoKind::Ghost, 2),
            (AmmoKind::Anvil, -1),
            (AmmoKind::Normal, -2),
            (AmmoKind::Chopstick, 5),
            (AmmoKind::Ghost, -1),
        ];
        for &(kind, amount) in moves {
            replicate(&mut replicator, &mut owner, &mut mirror, kind, amount);
            assert_eq!(owner.total_count(), mirror.total_count());
        }

        assert_eq!(owner.len(), mirror.len());
        assert_eq!(owner.nodes(), mirror.nodes());
    }

    #[test]
    fn when_an_op_arrives_for_an_unknown_index_then_the_mirror_is_untouched() {
        let mut mirror = Quiver::default();
        mirror.collect(AmmoKind::Normal, 2);

        apply_op(&mut mirror, &QuiverOp::RemoveAt { index: 4 });
        apply_op(
            &mut mirror,
            &QuiverOp::ReplaceAt {
                index: 4,
                node: QuiverNode {
                    kind: AmmoKind::Anvil,
                    count: 9,
                },
            },
        );

        assert_eq!(mirror.len(), 1);
        assert_eq!(mirror.total_count(), 2);
    }
}
