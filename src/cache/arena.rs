use crate::statement::Statement;

/// Stable handle to a statement owned by a [`StatementArena`].
///
/// A handle outlives the statement it names: once the slot is released its generation moves
/// on, and the old handle resolves to nothing instead of to whatever reuses the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatementId {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    statement: Option<Statement>,
}

#[derive(Default)]
pub struct StatementArena {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    live: usize,
}

impl StatementArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, statement: Statement) -> StatementId {
        self.live += 1;
        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            slot.statement = Some(statement);
            return StatementId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            statement: Some(statement),
        });
        StatementId {
            index,
            generation: 0,
        }
    }

    fn slot(&self, id: StatementId) -> Option<&Slot> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    #[must_use]
    pub fn get(&self, id: StatementId) -> Option<&Statement> {
        self.slot(id).and_then(|slot| slot.statement.as_ref())
    }

    pub fn get_mut(&mut self, id: StatementId) -> Option<&mut Statement> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.statement.as_mut())
    }

    #[must_use]
    pub fn contains(&self, id: StatementId) -> bool {
        self.get(id).is_some()
    }

    /// Take the statement out and retire the handle.
    pub fn remove(&mut self, id: StatementId) -> Option<Statement> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let statement = slot.statement.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant.push(id.index);
        self.live -= 1;
        Some(statement)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::statement::testing::FakeNative;

    fn statement(sql: &str) -> Statement {
        Statement::new(sql, Box::new(FakeNative::with_rows(0, Arc::new(Mutex::new(Vec::new())))))
    }

    #[test]
    fn stale_handles_do_not_resolve_to_reused_slots() {
        let mut arena = StatementArena::new();
        let first = arena.insert(statement("SELECT 1"));
        assert!(arena.remove(first).is_some());
        assert!(arena.remove(first).is_none());

        let second = arena.insert(statement("SELECT 2"));
        assert_ne!(first, second);
        assert!(!arena.contains(first));
        assert_eq!(arena.get(second).map(Statement::sql), Some("SELECT 2"));
        assert_eq!(arena.len(), 1);
    }
}
