//! Experience replay buffer

use rand::Rng;
use std::collections::VecDeque;

use robo_rl_core::{RLError, Result, Transition};

/// Fixed-capacity FIFO store of transitions with uniform sampling
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    /// Buffer storage, oldest at the front
    buffer: VecDeque<Transition>,
    /// Maximum capacity
    capacity: usize,
    /// Transitions ever pushed, including evicted ones
    pushed: u64,
}

impl ReplayBuffer {
    /// Create a new replay buffer
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RLError::config("replay buffer capacity must be at least 1"));
        }
        Ok(Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            pushed: 0,
        })
    }

    /// Add a transition, evicting the oldest one when full
    pub fn push(&mut self, transition: Transition) {
        if self.buffer.len() >= self.capacity {
            self.buffer.pop_front();
        }
        self.buffer.push_back(transition);
        self.pushed += 1;
    }

    /// Draw `batch_size` distinct transitions uniformly at random
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Vec<Transition>> {
        if self.buffer.len() < batch_size {
            return Err(RLError::InsufficientData {
                requested: batch_size,
                available: self.buffer.len(),
            });
        }

        let batch = rand::seq::index::sample(rng, self.buffer.len(), batch_size)
            .into_iter()
            .map(|i| self.buffer[i].clone())
            .collect();

        Ok(batch)
    }

    /// Oldest transition still held
    #[must_use]
    pub fn oldest(&self) -> Option<&Transition> {
        self.buffer.front()
    }

    /// Most recently pushed transition
    #[must_use]
    pub fn newest(&self) -> Option<&Transition> {
        self.buffer.back()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        self.buffer.iter()
    }

    /// Get the current size of the buffer
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Maximum number of transitions held
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total pushes since creation
    #[must_use]
    pub fn total_pushed(&self) -> u64 {
        self.pushed
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
