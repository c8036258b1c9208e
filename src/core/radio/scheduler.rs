//! Deferred write actions.
//!
//! Temporary and successive downlink commands leave one pending write each,
//! held in a fixed pool of slots. Due actions are copied out and their
//! slots freed before the write runs, so a slow bus exchange can never
//! block a slot past its time.

use tokio::time::Instant;
use tracing::debug;

use crate::error::{NodeBusError, Result};

pub const MAX_ACTIONS: usize = 8;

/// One pending deferred write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledAction {
    pub execute_at: Instant,
    pub address: u8,
    pub register: u8,
    /// In-register field mask; `None` writes the full declared field
    pub mask: Option<u32>,
    pub value: u32,
    /// Receipt hash of the downlink command that scheduled this action
    pub hash: u16,
}

#[derive(Debug, Default)]
pub struct ActionList {
    slots: [Option<ScheduledAction>; MAX_ACTIONS],
}

impl ActionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// File an action in the first free slot.
    pub fn schedule(&mut self, action: ScheduledAction) -> Result<()> {
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(NodeBusError::ActionListFull(MAX_ACTIONS))?;
        debug!(
            "scheduled write 0x{:02X}@0x{:02X} = 0x{:08X} (hash 0x{:03X})",
            action.register, action.address, action.value, action.hash
        );
        *slot = Some(action);
        Ok(())
    }

    /// Take every action due at `now`, freeing its slot.
    pub fn take_due(&mut self, now: Instant) -> Vec<ScheduledAction> {
        let mut due = Vec::new();
        for slot in &mut self.slots {
            if slot.is_some_and(|a| a.execute_at <= now) {
                if let Some(action) = slot.take() {
                    due.push(action);
                }
            }
        }
        // Oldest deadline first.
        due.sort_by_key(|a| a.execute_at);
        due
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Earliest pending deadline, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots.iter().flatten().map(|a| a.execute_at).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn action(at: Instant, register: u8, value: u32) -> ScheduledAction {
        ScheduledAction {
            execute_at: at,
            address: 0x08,
            register,
            mask: None,
            value,
            hash: 0x123,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_actions_taken_in_deadline_order() {
        let mut list = ActionList::new();
        let now = Instant::now();
        list.schedule(action(now + Duration::from_secs(30), 0x05, 2)).unwrap();
        list.schedule(action(now + Duration::from_secs(10), 0x04, 1)).unwrap();
        assert_eq!(list.len(), 2);

        assert!(list.take_due(now).is_empty());

        let due = list.take_due(now + Duration::from_secs(60));
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].register, 0x04);
        assert_eq!(due[1].register, 0x05);
        assert!(list.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_list_rejects_schedule() {
        let mut list = ActionList::new();
        let now = Instant::now();
        for i in 0..MAX_ACTIONS as u32 {
            list.schedule(action(now, 0x04, i)).unwrap();
        }
        assert!(matches!(
            list.schedule(action(now, 0x04, 99)),
            Err(NodeBusError::ActionListFull(_))
        ));

        // Draining frees every slot again.
        assert_eq!(list.take_due(now).len(), MAX_ACTIONS);
        assert!(list.schedule(action(now, 0x04, 0)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_deadline() {
        let mut list = ActionList::new();
        assert!(list.next_deadline().is_none());
        let now = Instant::now();
        list.schedule(action(now + Duration::from_secs(5), 0x04, 1)).unwrap();
        list.schedule(action(now + Duration::from_secs(2), 0x05, 1)).unwrap();
        assert_eq!(list.next_deadline(), Some(now + Duration::from_secs(2)));
    }
}
