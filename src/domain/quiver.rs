// Ordered ammo inventory with a current-selection index.
//
// The sequence is unique by kind and its order is the cycling order for
// "next ammo". A node's count is always positive; a node that reaches zero is
// removed from the sequence.

use serde::{Deserialize, Serialize};

use crate::domain::state::AmmoKind;

/// One (kind, count) entry in the quiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuiverNode {
    pub kind: AmmoKind,
    pub count: u32,
}

/// What a mutation did to the sequence, reported so the replication layer can
/// translate it into an indexed reconciliation op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuiverChange {
    /// Index the mutation touched (post-append index for additions).
    pub index: usize,
    /// True when the selection moved as part of the mutation.
    pub selection_changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Quiver {
    nodes: Vec<QuiverNode>,
    selected: Option<usize>,
}

impl Quiver {
    pub fn nodes(&self) -> &[QuiverNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn total_count(&self) -> u32 {
        self.nodes.iter().map(|n| n.count).sum()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected_kind(&self) -> Option<AmmoKind> {
        self.selected.and_then(|i| self.nodes.get(i)).map(|n| n.kind)
    }

    /// Wire form of the selection index, -1 meaning none.
    pub fn selection_wire(&self) -> i32 {
        self.selected.map_or(-1, |i| i as i32)
    }

    /// Applies a wire selection index. Out-of-range indices clear the
    /// selection rather than fault.
    pub fn set_selection_wire(&mut self, selected: i32) {
        self.selected = usize::try_from(selected)
            .ok()
            .filter(|i| *i < self.nodes.len());
    }

    /// Adds (or drains, for negative amounts) ammo of one kind. An empty
    /// quiver auto-selects the first collected node.
    pub fn collect(&mut self, kind: AmmoKind, amount: i32) -> QuiverChange {
        match self.nodes.iter().position(|n| n.kind == kind) {
            Some(index) => {
                let node = &mut self.nodes[index];
                let next = node.count as i64 + amount as i64;
                if next <= 0 {
                    self.nodes.remove(index);
                    QuiverChange {
                        index,
                        selection_changed: self.fix_selection_after_remove(index),
                    }
                } else {
                    node.count = next as u32;
                    QuiverChange {
                        index,
                        selection_changed: false,
                    }
                }
            }
            None => {
                if amount <= 0 {
                    // Draining an absent kind changes nothing.
                    return QuiverChange {
                        index: self.nodes.len(),
                        selection_changed: false,
                    };
                }
                self.nodes.push(QuiverNode {
                    kind,
                    count: amount as u32,
                });
                let index = self.nodes.len() - 1;
                let selection_changed = self.selected.is_none();
                if selection_changed {
                    self.selected = Some(index);
                }
                QuiverChange {
                    index,
                    selection_changed,
                }
            }
        }
    }

    /// Spends one round of the selected kind. Returns the kind spent and the
    /// resulting change, or `None` when nothing is selected.
    pub fn consume_selected(&mut self) -> Option<(AmmoKind, QuiverChange)> {
        let index = self.selected?;
        let kind = self.nodes.get(index)?.kind;
        Some((kind, self.collect(kind, -1)))
    }

    /// Advances the selection to the next node in sequence order.
    pub fn cycle_next(&mut self) -> bool {
        let Some(index) = self.selected else {
            return false;
        };
        if self.nodes.len() < 2 {
            return false;
        }
        self.selected = Some((index + 1) % self.nodes.len());
        true
    }

    /// Wholesale overwrite used by late-join bootstrap on mirrors.
    pub fn restore(&mut self, nodes: Vec<QuiverNode>, selected: i32) {
        self.nodes = nodes;
        self.set_selection_wire(selected);
    }

    /// Mirror-side indexed ops. Out-of-bounds indices are deliberate no-ops
    /// to tolerate out-of-order delivery.
    pub fn append_node(&mut self, node: QuiverNode) {
        self.nodes.push(node);
        if self.selected.is_none() {
            self.selected = Some(self.nodes.len() - 1);
        }
    }

    pub fn remove_at(&mut self, index: usize) {
        if index >= self.nodes.len() {
            return;
        }
        self.nodes.remove(index);
        self.fix_selection_after_remove(index);
    }

    pub fn replace_at(&mut self, index: usize, node: QuiverNode) {
        if let Some(slot) = self.nodes.get_mut(index) {
            *slot = node;
        }
    }

    /// Keeps the selection meaningful after a removal: the node that slid
    /// into the removed slot stays selected, wrapping at the end; an empty
    /// quiver clears the selection. Returns true when the selection moved.
    fn fix_selection_after_remove(&mut self, removed: usize) -> bool {
        let Some(selected) = self.selected else {
            return false;
        };
        if self.nodes.is_empty() {
            self.selected = None;
            return true;
        }
        if selected > removed {
            self.selected = Some(selected - 1);
            return true;
        }
        if selected == removed {
            if selected >= self.nodes.len() {
                self.selected = Some(0);
            }
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_first_kind_is_collected_then_it_becomes_selected() {
        let mut quiver = Quiver::default();
        let change = quiver.collect(AmmoKind::Normal, 2);

        assert_eq!(change.index, 0);
        assert!(change.selection_changed);
        assert_eq!(quiver.selected_kind(), Some(AmmoKind::Normal));
        assert_eq!(quiver.total_count(), 2);
    }

    #[test]
    fn when_collecting_an_existing_kind_then_counts_merge_in_place() {
        let mut quiver = Quiver::default();
        quiver.collect(AmmoKind::Normal, 2);
        quiver.collect(AmmoKind::Anvil, 1);
        let change = quiver.collect(AmmoKind::Normal, 3);

        assert_eq!(change.index, 0);
        assert_eq!(quiver.nodes()[0].count, 5);
        assert_eq!(quiver.len(), 2);
    }

    #[test]
    fn when_selected_ammo_depletes_then_node_is_removed_and_selection_cleared() {
        // Two shots from [(Normal, 2)]: count 1 after the first, gone after
        // the second with no selection left.
        let mut quiver = Quiver::default();
        quiver.collect(AmmoKind::Normal, 2);

        let (kind, change) = quiver.consume_selected().expect("first shot");
        assert_eq!(kind, AmmoKind::Normal);
        assert!(!change.selection_changed);
        assert_eq!(quiver.nodes()[0].count, 1);
        assert_eq!(quiver.selected_kind(), Some(AmmoKind::Normal));

        let (_, change) = quiver.consume_selected().expect("second shot");
        assert!(change.selection_changed);
        assert!(quiver.is_empty());
        assert_eq!(quiver.selected_kind(), None);
        assert_eq!(quiver.selection_wire(), -1);
    }

    #[test]
    fn when_selected_ammo_depletes_with_others_left_then_selection_slides() {
        let mut quiver = Quiver::default();
        quiver.collect(AmmoKind::Normal, 1);
        quiver.collect(AmmoKind::Ghost, 3);

        let (_, change) = quiver.consume_selected().expect("shot");
        assert!(change.selection_changed);
        assert_eq!(quiver.selected_kind(), Some(AmmoKind::Ghost));
    }

    #[test]
    fn when_cycling_then_selection_wraps_in_sequence_order() {
        let mut quiver = Quiver::default();
        quiver.collect(AmmoKind::Normal, 1);
        quiver.collect(AmmoKind::Ghost, 1);
        quiver.collect(AmmoKind::Anvil, 1);

        assert!(quiver.cycle_next());
        assert_eq!(quiver.selected_kind(), Some(AmmoKind::Ghost));
        assert!(quiver.cycle_next());
        assert_eq!(quiver.selected_kind(), Some(AmmoKind::Anvil));
        assert!(quiver.cycle_next());
        assert_eq!(quiver.selected_kind(), Some(AmmoKind::Normal));
    }

    #[test]
    fn when_mirror_op_index_is_out_of_bounds_then_nothing_changes() {
        let mut quiver = Quiver::default();
        quiver.collect(AmmoKind::Normal, 2);

        quiver.remove_at(5);
        quiver.replace_at(
            9,
            QuiverNode {
                kind: AmmoKind::Anvil,
                count: 1,
            },
        );

        assert_eq!(quiver.len(), 1);
        assert_eq!(quiver.nodes()[0].kind, AmmoKind::Normal);
    }
}
