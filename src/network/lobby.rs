//! Waiting set of the rendezvous server
//!
//! The set is only reachable through [`Lobby`], whose methods each take the
//! lock once and finish all inspection and mutation before releasing it.
//! Two concurrent registrations therefore can never both pass the duplicate
//! check or both observe a full set.

use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex};

use crate::protocol::{DisplayName, MatchAssignment, TurnOrder};

pub type RegistrationId = u64;

/// Number of players in one match
const MATCH_SIZE: usize = 2;

/// Lobby errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LobbyError {
    #[error("Nickname is already used: {0}")]
    NameInUse(DisplayName),
}

/// A client waiting for an opponent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntry {
    pub id: RegistrationId,
    pub name: DisplayName,
    /// Where the client's peer socket listens
    pub addr: SocketAddr,
}

/// Result of a completed pairing
#[derive(Debug, Clone)]
pub struct Pairing {
    /// Earlier registrant, moves first
    pub first: WaitingEntry,
    /// Later registrant, moves second
    pub second: WaitingEntry,
    /// Entries whose handler was already gone when the assignment was handed over
    pub undelivered: Vec<DisplayName>,
}

/// Handle returned to the connection handler that registered
#[derive(Debug)]
pub struct Registration {
    pub entry: WaitingEntry,
    /// Resolves once this entry is paired
    pub assignment: oneshot::Receiver<MatchAssignment>,
    /// Set when this registration completed a pair
    pub pairing: Option<Pairing>,
}

struct Waiter {
    entry: WaitingEntry,
    notify: oneshot::Sender<MatchAssignment>,
}

#[derive(Default)]
struct WaitingSet {
    waiting: Vec<Waiter>,
    next_id: RegistrationId,
}

impl WaitingSet {
    fn register(&mut self, name: DisplayName, addr: SocketAddr) -> Result<Registration, LobbyError> {
        if self.waiting.iter().any(|w| w.entry.name == name) {
            return Err(LobbyError::NameInUse(name));
        }

        self.next_id += 1;
        let entry = WaitingEntry {
            id: self.next_id,
            name,
            addr,
        };

        let (notify, assignment) = oneshot::channel();
        self.waiting.push(Waiter {
            entry: entry.clone(),
            notify,
        });

        let pairing = if self.waiting.len() == MATCH_SIZE {
            self.pair()
        } else {
            None
        };

        Ok(Registration {
            entry,
            assignment,
            pairing,
        })
    }

    /// Hand each of the two waiters the other's details and empty the set
    fn pair(&mut self) -> Option<Pairing> {
        let second = self.waiting.pop()?;
        let first = self.waiting.pop()?;
        self.waiting.clear();

        let first_assignment = MatchAssignment {
            opponent_name: second.entry.name.clone(),
            opponent_addr: second.entry.addr,
            turn_order: TurnOrder::First,
        };
        let second_assignment = MatchAssignment {
            opponent_name: first.entry.name.clone(),
            opponent_addr: first.entry.addr,
            turn_order: TurnOrder::Second,
        };

        let mut undelivered = Vec::new();
        if first.notify.send(first_assignment).is_err() {
            undelivered.push(first.entry.name.clone());
        }
        if second.notify.send(second_assignment).is_err() {
            undelivered.push(second.entry.name.clone());
        }

        Some(Pairing {
            first: first.entry,
            second: second.entry,
            undelivered,
        })
    }

    fn withdraw(&mut self, id: RegistrationId) -> Option<WaitingEntry> {
        let index = self.waiting.iter().position(|w| w.entry.id == id)?;
        Some(self.waiting.remove(index).entry)
    }
}

/// Mutex-guarded waiting set shared by all connection handlers
#[derive(Default)]
pub struct Lobby {
    inner: Mutex<WaitingSet>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicate check, insert, size check and pairing as one critical section
    pub async fn try_register_and_pair(
        &self,
        name: DisplayName,
        addr: SocketAddr,
    ) -> Result<Registration, LobbyError> {
        let mut set = self.inner.lock().await;
        set.register(name, addr)
    }

    /// Remove an entry whose client went away before being paired.
    /// Returns `None` if it was already paired (or never waiting).
    pub async fn withdraw(&self, id: RegistrationId) -> Option<WaitingEntry> {
        let mut set = self.inner.lock().await;
        set.withdraw(id)
    }

    /// Drop all waiting entries; their handlers observe a closed channel
    pub async fn clear(&self) -> usize {
        let mut set = self.inner.lock().await;
        let count = set.waiting.len();
        set.waiting.clear();
        count
    }

    pub async fn waiting_len(&self) -> usize {
        self.inner.lock().await.waiting.len()
    }

    /// Names currently waiting, in arrival order
    pub async fn waiting_names(&self) -> Vec<DisplayName> {
        let set = self.inner.lock().await;
        set.waiting.iter().map(|w| w.entry.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn name(s: &str) -> DisplayName {
        DisplayName::parse(s).unwrap()
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_pairing_assigns_complementary_orders() {
        let lobby = Lobby::new();

        let alice = lobby.try_register_and_pair(name("alice"), addr(4001)).await.unwrap();
        assert!(alice.pairing.is_none());
        assert_eq!(lobby.waiting_len().await, 1);

        let bob = lobby.try_register_and_pair(name("bob"), addr(4002)).await.unwrap();
        let pairing = bob.pairing.expect("second registration completes the pair");
        assert_eq!(pairing.first.name, name("alice"));
        assert_eq!(pairing.second.name, name("bob"));
        assert!(pairing.undelivered.is_empty());
        assert_eq!(lobby.waiting_len().await, 0);

        let for_alice = alice.assignment.await.unwrap();
        let for_bob = bob.assignment.await.unwrap();

        assert_eq!(for_alice.opponent_name, name("bob"));
        assert_eq!(for_alice.opponent_addr, addr(4002));
        assert_eq!(for_alice.turn_order, TurnOrder::First);

        assert_eq!(for_bob.opponent_name, name("alice"));
        assert_eq!(for_bob.opponent_addr, addr(4001));
        assert_eq!(for_bob.turn_order, TurnOrder::Second);
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let lobby = Lobby::new();
        let alice = lobby.try_register_and_pair(name("alice"), addr(4001)).await.unwrap();

        let err = lobby
            .try_register_and_pair(name("alice"), addr(5001))
            .await
            .unwrap_err();
        assert_eq!(err, LobbyError::NameInUse(name("alice")));

        assert_eq!(lobby.waiting_names().await, vec![name("alice")]);

        // The original entry still pairs normally
        let bob = lobby.try_register_and_pair(name("bob"), addr(4002)).await.unwrap();
        assert!(bob.pairing.is_some());
        assert_eq!(alice.assignment.await.unwrap().opponent_addr, addr(4002));
    }

    #[tokio::test]
    async fn test_name_reusable_after_pairing() {
        let lobby = Lobby::new();
        lobby.try_register_and_pair(name("alice"), addr(4001)).await.unwrap();
        lobby.try_register_and_pair(name("bob"), addr(4002)).await.unwrap();

        let again = lobby.try_register_and_pair(name("alice"), addr(4003)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn test_withdraw_frees_slot() {
        let lobby = Lobby::new();
        let alice = lobby.try_register_and_pair(name("alice"), addr(4001)).await.unwrap();

        let removed = lobby.withdraw(alice.entry.id).await;
        assert_eq!(removed.map(|e| e.name), Some(name("alice")));
        assert_eq!(lobby.waiting_len().await, 0);
        assert!(lobby.withdraw(alice.entry.id).await.is_none());

        let bob = lobby.try_register_and_pair(name("bob"), addr(4002)).await.unwrap();
        assert!(bob.pairing.is_none());
    }

    #[tokio::test]
    async fn test_gone_waiter_reported_undelivered() {
        let lobby = Lobby::new();
        let alice = lobby.try_register_and_pair(name("alice"), addr(4001)).await.unwrap();
        drop(alice.assignment);

        let bob = lobby.try_register_and_pair(name("bob"), addr(4002)).await.unwrap();
        let pairing = bob.pairing.unwrap();
        assert_eq!(pairing.undelivered, vec![name("alice")]);
        assert!(bob.assignment.await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_registrations_pair_exactly_once() {
        let lobby = Arc::new(Lobby::new());
        let names = ["ann", "ben", "cat", "dan", "eve", "fay", "gus", "hal"];

        let mut handles = Vec::new();
        for (i, n) in names.iter().enumerate() {
            let lobby = lobby.clone();
            let n = name(n);
            handles.push(tokio::spawn(async move {
                lobby
                    .try_register_and_pair(n, addr(4000 + i as u16))
                    .await
                    .unwrap()
            }));
        }

        let mut pairings = 0;
        let mut receivers = Vec::new();
        for handle in handles {
            let registration = handle.await.unwrap();
            if registration.pairing.is_some() {
                pairings += 1;
            }
            receivers.push(registration.assignment);
        }

        assert_eq!(pairings, names.len() / 2);
        assert_eq!(lobby.waiting_len().await, 0);

        let mut firsts = 0;
        for rx in receivers {
            if rx.await.unwrap().turn_order == TurnOrder::First {
                firsts += 1;
            }
        }
        assert_eq!(firsts, names.len() / 2);
    }
}
