//! The set of live sessions.
//!
//! [`Registry`] owns every [`Session`] in a [`Slab`] and hands out
//! [`SessionId`] handles.  It is plain state owned by whoever runs the event
//! loop: create it at startup, pass it around explicitly, and tear it down
//! with [`Registry::shutdown`] when the loop ends.
//!
//! A handle carries the generation of the session it was issued for.  Once a
//! session is destroyed its slab slot may be reused, but old handles keep
//! resolving to nothing instead of to the newcomer.

use std::fmt;
use std::time::Instant;

use slab::Slab;
use thiserror::Error;

use crate::conduit::{Attach, Conduit, ConduitError};
use crate::config::{Config, ConfigError};
use crate::packet::Segment;
use crate::receiver::Disposition;
use crate::session::Session;

/// Stable handle to a registered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId {
    key: usize,
    generation: u64,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.key, self.generation)
    }
}

/// Why [`Registry::create`] produced no session.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("invalid session config: {0}")]
    Config(#[from] ConfigError),
    #[error("could not open conduit: {0}")]
    Conduit(#[from] ConduitError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no live session {0}")]
    UnknownSession(SessionId),
}

#[derive(Debug)]
struct Slot<C> {
    generation: u64,
    session: Session<C>,
}

/// All live sessions of one event loop.
#[derive(Debug)]
pub struct Registry<C> {
    sessions: Slab<Slot<C>>,
    next_generation: u64,
}

impl<C: Conduit> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Conduit> Registry<C> {
    pub fn new() -> Self {
        Self {
            sessions: Slab::new(),
            next_generation: 0,
        }
    }

    /// Register a new session on `attach`'s conduit.
    ///
    /// On failure nothing is registered and no conduit is kept.
    pub fn create(&mut self, attach: Attach<C>, config: &Config) -> Result<SessionId, CreateError> {
        config.validate()?;
        let conduit = attach.establish()?;

        self.next_generation += 1;
        let generation = self.next_generation;
        let key = self.sessions.insert(Slot {
            generation,
            session: Session::new(conduit, config),
        });
        let id = SessionId { key, generation };
        log::info!(
            "[rel] session {id} created window={} timeout={:?}",
            config.window,
            config.timeout
        );
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session<C>> {
        self.sessions
            .get(id.key)
            .filter(|slot| slot.generation == id.generation)
            .map(|slot| &slot.session)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session<C>> {
        self.sessions
            .get_mut(id.key)
            .filter(|slot| slot.generation == id.generation)
            .map(|slot| &mut slot.session)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Handles of every live session.
    pub fn ids(&self) -> Vec<SessionId> {
        self.sessions
            .iter()
            .map(|(key, slot)| SessionId {
                key,
                generation: slot.generation,
            })
            .collect()
    }

    /// Application input may be available for `id`; send what fits.
    pub fn trigger_send(&mut self, id: SessionId, now: Instant) -> Result<usize, RegistryError> {
        let session = self.get_mut(id).ok_or(RegistryError::UnknownSession(id))?;
        Ok(session.trigger_send(now))
    }

    /// Process one datagram received on `id`'s conduit.
    ///
    /// Invalid datagrams are dropped without touching the session.  A valid
    /// datagram arriving once the session has finished destroys it; this is
    /// the only place a session is ever destroyed.
    pub fn on_packet(
        &mut self,
        id: SessionId,
        raw: &[u8],
        now: Instant,
    ) -> Result<Disposition, RegistryError> {
        let session = self.get_mut(id).ok_or(RegistryError::UnknownSession(id))?;

        let segment = match Segment::decode(raw) {
            Ok(segment) => segment,
            Err(e) => {
                log::trace!("[rel] {id} dropped datagram: {e}");
                return Ok(Disposition::Dropped);
            }
        };

        if session.is_finished() {
            self.destroy(id);
            return Ok(Disposition::Destroyed);
        }
        Ok(session.on_segment(segment, now))
    }

    /// Release everything `id` holds and unregister it.
    fn destroy(&mut self, id: SessionId) {
        let Some(slot) = self.sessions.try_remove(id.key) else {
            return;
        };
        debug_assert_eq!(slot.generation, id.generation);
        let mut session = slot.session;
        session.send_buffer.clear();
        session.recv_buffer.clear();
        log::info!("[rel] session {id} destroyed");
        // Dropping the session releases its conduit.
    }

    /// Resend every overdue segment of every live session.
    ///
    /// Each session and each of its buffered segments is visited exactly
    /// once.  Returns the number of segments retransmitted.
    pub fn run_periodic_sweep(&mut self, now: Instant) -> usize {
        let mut resent = 0;
        for (_, slot) in self.sessions.iter_mut() {
            resent += slot.session.retransmit_due(now);
        }
        if resent > 0 {
            log::debug!("[sweep] retransmitted {resent} segment(s)");
        }
        resent
    }

    /// Tear the registry down at loop shutdown.
    ///
    /// Returns how many sessions were still registered.  Sessions that had
    /// finished are expected here (their final teardown datagram may never
    /// arrive); anything else is logged as abandoned.
    pub fn shutdown(mut self) -> usize {
        let remaining = self.sessions.len();
        for slot in self.sessions.drain() {
            if slot.session.is_finished() {
                log::debug!("[rel] closing finished session at shutdown");
            } else {
                log::warn!(
                    "[rel] abandoning session in phase {} with {} unacked segment(s)",
                    slot.session.phase(),
                    slot.session.send_buffer.len()
                );
            }
        }
        remaining
    }
}
