//! Spheres: dynamic groups of outcomes that must be handled together.
//!
//! A sphere holds one element per actor it is waiting on. Elements start as
//! placeholders (the actor is named in someone's sync set but has not
//! reported yet) and become genuine when the actor's outcome arrives.
//!
//! ```text
//!   open ──(all acted)──► sealed ──(all handled)──► removed
//!    ▲                      │
//!    └── merges only ───────┘ (sealed spheres never merge)
//! ```

use std::fmt;

use packetworld_env::ActorId;
use tracing::warn;

use crate::envelope::{Dispatch, Envelope, InfluenceSet, MailBag, PerceptionAck};
use crate::error::KernelError;
use crate::outcome::{Outcome, OutcomeKind};

/// Identifier of a sphere, unique for the lifetime of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SphereId(pub u64);

impl fmt::Display for SphereId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sphere-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Sphere {
    id: SphereId,
    elements: Vec<Outcome>,
    acted: usize,
    handled: usize,
    sealed: bool,
}

impl Sphere {
    pub fn new(id: SphereId) -> Self {
        Self {
            id,
            elements: Vec::new(),
            acted: 0,
            handled: 0,
            sealed: false,
        }
    }

    pub fn id(&self) -> SphereId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Number of genuine elements.
    pub fn acted(&self) -> usize {
        self.acted
    }

    pub fn handled(&self) -> usize {
        self.handled
    }

    pub fn elements(&self) -> &[Outcome] {
        &self.elements
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        self.elements.iter().any(|o| o.actor == actor)
    }

    pub fn members(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.elements.iter().map(|o| o.actor)
    }

    pub fn is_full(&self) -> bool {
        !self.elements.is_empty() && self.acted == self.elements.len()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Adds an outcome, replacing the actor's placeholder if there is one,
    /// then adds placeholders for every unseen member of its sync set.
    pub fn integrate(&mut self, outcome: Outcome) -> Result<(), KernelError> {
        let actor = outcome.actor;
        let pending: Vec<ActorId> = outcome.sync_set.iter().copied().collect();

        match self.elements.iter().position(|o| o.actor == actor) {
            Some(_) if outcome.is_placeholder() => {}
            Some(i) if self.elements[i].is_placeholder() => {
                self.elements[i] = outcome;
                self.acted += 1;
            }
            Some(_) => return Err(KernelError::DuplicateOutcome(actor)),
            None => {
                if outcome.acted {
                    self.acted += 1;
                }
                self.elements.push(outcome);
            }
        }

        for id in pending {
            if !self.contains(id) {
                self.elements.push(Outcome::placeholder(id));
            }
        }
        debug_assert_eq!(self.acted, self.elements.iter().filter(|o| o.acted).count());
        Ok(())
    }

    /// Absorbs every element of `other`.
    pub fn incorporate(&mut self, other: Sphere) {
        let from = other.id;
        for outcome in other.elements {
            if let Err(e) = self.integrate(outcome) {
                warn!("{} dropped an element of {} while merging: {}", self.id, from, e);
            }
        }
    }

    /// Drops the placeholders of actors that will never report. Returns how
    /// many were dropped.
    pub fn forget(&mut self, gone: &[ActorId]) -> usize {
        let before = self.elements.len();
        self.elements
            .retain(|o| !(o.is_placeholder() && gone.contains(&o.actor)));
        before - self.elements.len()
    }

    /// AND of every element's vote.
    pub fn permission(&self) -> bool {
        self.elements.iter().all(Outcome::vote)
    }

    /// Seals the sphere and partitions its outcomes by handler.
    ///
    /// Only envelopes representing at least one outcome are produced.
    pub fn seal(&mut self) -> Dispatch {
        self.sealed = true;

        let mut perception = PerceptionAck::default();
        let mut mail = MailBag::default();
        let mut influences = InfluenceSet::default();
        let (mut n_perception, mut n_mail, mut n_influences) = (0, 0, 0);

        for outcome in &self.elements {
            match &outcome.kind {
                OutcomeKind::Perception => {
                    perception.actors.push(outcome.actor);
                    n_perception += 1;
                }
                OutcomeKind::Communication { mail: written, .. } => {
                    mail.mails.extend(written.iter().cloned());
                    n_mail += 1;
                }
                OutcomeKind::Action(influence) => {
                    influences.influences.push(influence.clone());
                    n_influences += 1;
                }
                OutcomeKind::Placeholder => {}
            }
        }

        let sphere = self.id;
        Dispatch {
            perception: (n_perception > 0).then(|| Envelope {
                sphere,
                outcomes: n_perception,
                payload: perception,
            }),
            mail: (n_mail > 0).then(|| Envelope {
                sphere,
                outcomes: n_mail,
                payload: mail,
            }),
            influences: (n_influences > 0).then(|| Envelope {
                sphere,
                outcomes: n_influences,
                payload: influences,
            }),
        }
    }

    /// Records `outcomes` as handled. Returns true once every element is.
    pub fn mark_handled(&mut self, outcomes: usize) -> bool {
        self.handled += outcomes;
        self.handled >= self.elements.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{CommToken, SyncSet};
    use packetworld_env::{Coordinate, Influence, Mail};

    fn ids(raw: &[u32]) -> SyncSet {
        raw.iter().map(|&i| ActorId(i)).collect()
    }

    #[test]
    fn test_integrate_adds_placeholders() {
        let mut s = Sphere::new(SphereId(0));
        s.integrate(Outcome::perception(ActorId(1), ids(&[2, 3]))).unwrap();

        assert_eq!(s.len(), 3);
        assert_eq!(s.acted(), 1);
        assert!(!s.is_full());
        assert!(s.contains(ActorId(3)));
    }

    #[test]
    fn test_integrate_replaces_placeholder() {
        let mut s = Sphere::new(SphereId(0));
        s.integrate(Outcome::perception(ActorId(1), ids(&[2]))).unwrap();
        s.integrate(Outcome::perception(ActorId(2), ids(&[1]))).unwrap();

        assert_eq!(s.len(), 2);
        assert_eq!(s.acted(), 2);
        assert!(s.is_full());
    }

    #[test]
    fn test_duplicate_outcome_rejected() {
        let mut s = Sphere::new(SphereId(0));
        s.integrate(Outcome::perception(ActorId(1), ids(&[2]))).unwrap();
        let err = s.integrate(Outcome::perception(ActorId(1), ids(&[2])));

        assert!(matches!(err, Err(KernelError::DuplicateOutcome(ActorId(1)))));
        assert_eq!(s.acted(), 1);
    }

    #[test]
    fn test_seal_partitions_by_handler() {
        let mut s = Sphere::new(SphereId(4));
        let a = ActorId(1);
        let b = ActorId(2);
        let c = ActorId(3);
        s.integrate(Outcome::communication(
            a,
            ids(&[2, 3]),
            CommToken::Close,
            vec![Mail::new("a", "b", "x"), Mail::new("a", "c", "y")],
        ))
        .unwrap();
        s.integrate(Outcome::communication(b, ids(&[1, 3]), CommToken::Close, vec![]))
            .unwrap();
        s.integrate(Outcome::action(c, ids(&[1, 2]), Influence::step(c, Coordinate::new(0, 1))))
            .unwrap();
        assert!(s.is_full());

        let d = s.seal();
        assert!(s.is_sealed());
        assert!(d.perception.is_none());
        let mail = d.mail.as_ref().unwrap();
        assert_eq!(mail.outcomes, 2);
        assert_eq!(mail.payload.mails.len(), 2);
        assert_eq!(d.influences.as_ref().unwrap().outcomes, 1);
        assert_eq!(d.outcomes(), s.len());
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_permission_is_and_of_votes() {
        let mut s = Sphere::new(SphereId(0));
        s.integrate(Outcome::communication(ActorId(1), ids(&[2]), CommToken::Close, vec![]))
            .unwrap();
        s.integrate(Outcome::communication(ActorId(2), ids(&[1]), CommToken::Continue, vec![]))
            .unwrap();
        assert!(!s.permission());
    }

    #[test]
    fn test_mark_handled() {
        let mut s = Sphere::new(SphereId(0));
        s.integrate(Outcome::perception(ActorId(1), ids(&[2]))).unwrap();
        s.integrate(Outcome::action(ActorId(2), ids(&[1]), Influence::skip(ActorId(2))))
            .unwrap();
        s.seal();
        assert!(!s.mark_handled(1));
        assert!(s.mark_handled(1));
    }

    #[test]
    fn test_forget_drops_only_placeholders() {
        let mut s = Sphere::new(SphereId(0));
        s.integrate(Outcome::perception(ActorId(1), ids(&[2, 3]))).unwrap();
        s.integrate(Outcome::perception(ActorId(2), ids(&[1, 3]))).unwrap();
        assert!(!s.is_full());

        // 1 acted, so it stays even when named
        assert_eq!(s.forget(&[ActorId(1), ActorId(3)]), 1);
        assert_eq!(s.len(), 2);
        assert!(!s.contains(ActorId(3)));
        assert!(s.is_full());
    }

    #[test]
    fn test_incorporate_merges_placeholders() {
        let mut left = Sphere::new(SphereId(0));
        left.integrate(Outcome::perception(ActorId(1), ids(&[3]))).unwrap();
        let mut right = Sphere::new(SphereId(1));
        right.integrate(Outcome::perception(ActorId(3), ids(&[4]))).unwrap();

        left.incorporate(right);
        assert_eq!(left.len(), 3);
        assert_eq!(left.acted(), 2);
        assert!(left.contains(ActorId(4)));
    }
}
