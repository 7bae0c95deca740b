use std::collections::HashSet;

use crate::entry::{InstanceId, NavEntry};

/// Ordered sequence of nav entries; the tail is the visible ("current")
/// entry, everything before it is the stack behind. Invariant: no two
/// entries share an instance id, and the stack never empties through
/// pop-style mutation (edits may empty it deliberately).
#[derive(Debug, Default)]
pub struct BackStack {
    entries: Vec<NavEntry>,
}

impl BackStack {
    pub(crate) fn new(first: NavEntry) -> Self {
        Self {
            entries: vec![first],
        }
    }

    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&NavEntry> {
        self.entries.last()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut NavEntry> {
        self.entries.last_mut()
    }

    pub fn entries(&self) -> &[NavEntry] {
        &self.entries
    }

    /// The retained entries behind the current one, oldest first.
    pub fn behind(&self) -> &[NavEntry] {
        match self.entries.len() {
            0 => &[],
            n => &self.entries[..n - 1],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_instance(&self, id: &InstanceId) -> bool {
        self.entries.iter().any(|e| e.instance_id() == id)
    }

    pub(crate) fn push(&mut self, entry: NavEntry) {
        debug_assert!(
            !self.contains_instance(entry.instance_id()),
            "instance id collision on push"
        );
        self.entries.push(entry);
    }

    /// Swap the current entry for a new one, returning the discarded entry.
    pub(crate) fn replace(&mut self, entry: NavEntry) -> Option<NavEntry> {
        let old = self.entries.pop();
        self.entries.push(entry);
        old
    }

    /// Pop the current entry. Refuses to pop the last one; multiple rapid
    /// back presses must bottom out as no-ops, not crashes.
    pub(crate) fn pop(&mut self) -> Option<NavEntry> {
        if self.entries.len() <= 1 {
            return None;
        }
        self.entries.pop()
    }

    /// Pop until the first entry (searching from the top) matching `target`
    /// becomes current. Returns the popped entries, newest first, or `None`
    /// with zero mutation when nothing matches. A current entry that already
    /// matches succeeds with zero pops.
    pub(crate) fn pop_to<F>(&mut self, target: F) -> Option<Vec<NavEntry>>
    where
        F: Fn(&NavEntry) -> bool,
    {
        let index = self.entries.iter().rposition(&target)?;
        let mut popped: Vec<NavEntry> = self.entries.drain(index + 1..).collect();
        popped.reverse();
        Some(popped)
    }

    pub(crate) fn instance_ids(&self) -> HashSet<InstanceId> {
        self.entries
            .iter()
            .map(|e| e.instance_id().clone())
            .collect()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut NavEntry> {
        self.entries.iter_mut()
    }

    pub(crate) fn drain_all(&mut self) -> Vec<NavEntry> {
        self.entries.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::Destination;

    fn entry(name: &str, seq: u32) -> NavEntry {
        let dest = Destination::build(name).finish();
        NavEntry::new(format!("{name}#{seq}"), dest, None, None)
    }

    fn stack(names: &[&str]) -> BackStack {
        let mut iter = names.iter().enumerate();
        let (_, first) = iter.next().expect("non-empty");
        let mut stack = BackStack::new(entry(first, 0));
        for (i, name) in iter {
            stack.push(entry(name, i as u32));
        }
        stack
    }

    #[test]
    fn tail_is_current() {
        let stack = stack(&["Home", "A", "B"]);
        assert_eq!(stack.current().unwrap().destination().name(), "B");
        assert_eq!(stack.behind().len(), 2);
        assert_eq!(stack.behind()[0].destination().name(), "Home");
    }

    #[test]
    fn pop_never_empties() {
        let mut stack = stack(&["Home", "A"]);
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_none());
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn pop_to_matching_target() {
        let mut stack = stack(&["Home", "A", "B", "C"]);
        let popped = stack
            .pop_to(|e| e.destination().name() == "Home")
            .expect("home is present");
        assert_eq!(popped.len(), 3);
        assert_eq!(popped[0].destination().name(), "C");
        assert_eq!(stack.current().unwrap().destination().name(), "Home");
    }

    #[test]
    fn pop_to_current_is_zero_pops() {
        let mut stack = stack(&["Home", "A"]);
        let popped = stack.pop_to(|e| e.destination().name() == "A").unwrap();
        assert!(popped.is_empty());
        assert_eq!(stack.len(), 2);
    }

    #[test]
    fn pop_to_without_match_is_untouched() {
        let mut stack = stack(&["Home", "A"]);
        assert!(stack.pop_to(|e| e.destination().name() == "X").is_none());
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.current().unwrap().destination().name(), "A");
    }

    #[test]
    fn drain_preserves_relative_order() {
        let mut stack = stack(&["Home", "A", "B", "C"]);
        let mut entries = stack.drain_all();
        entries.retain(|e| e.destination().name() != "B");
        for entry in entries {
            stack.push(entry);
        }
        let names: Vec<_> = stack
            .entries()
            .iter()
            .map(|e| e.destination().name().to_string())
            .collect();
        assert_eq!(names, ["Home", "A", "C"]);
    }
}
