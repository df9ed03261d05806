use crate::db::store::Mutation;
use crate::models::{UserId, Version};

/// One conditional row update inside a [`UnitOfWork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub id: UserId,
    pub expected: Version,
    pub mutation: Mutation,
}

/// Collects the row updates of one logical operation so a store can apply
/// them together or not at all.
///
/// A unit is a plain value: it holds no connection and no open transaction,
/// so units cannot nest. The store opens exactly one transaction per unit
/// in [`VersionedStore::atomically`](crate::db::VersionedStore::atomically).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    steps: Vec<Step>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, id: UserId, expected: Version, mutation: Mutation) -> &mut Self {
        self.steps.push(Step {
            id,
            expected,
            mutation,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Steps sorted by ascending row id. Every store acquires rows in this
    /// order so two units touching the same pair cannot deadlock each other.
    /// The sort is stable: steps on the same row keep insertion order.
    pub fn ordered_steps(self) -> Vec<Step> {
        let mut steps = self.steps;
        steps.sort_by_key(|step| step.id);
        steps
    }
}
