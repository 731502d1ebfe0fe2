//! Work handed from a full sphere to a handler.

use packetworld_env::{ActorId, Influence, Mail};

use crate::sphere::SphereId;

/// A batch of work for one handler, tagged with the sphere it came from and
/// the number of outcomes it stands for.
///
/// The handler reports `outcomes` back to the sphere when it is done; the
/// sphere completes once every envelope it dispatched has been reported.
#[derive(Debug, Clone)]
pub struct Envelope<P> {
    pub sphere: SphereId,
    pub outcomes: usize,
    pub payload: P,
}

/// Closed perceive phases. Carries nothing but who perceived.
#[derive(Debug, Clone, Default)]
pub struct PerceptionAck {
    pub actors: Vec<ActorId>,
}

/// Every mail written in the talk phases of one sphere.
///
/// `Envelope::outcomes` counts talk outcomes, not mails: an outcome with an
/// empty buffer still has to be acknowledged.
#[derive(Debug, Clone, Default)]
pub struct MailBag {
    pub mails: Vec<Mail>,
}

/// Influences of one sphere, in sphere order.
#[derive(Debug, Clone, Default)]
pub struct InfluenceSet {
    pub influences: Vec<Influence>,
}

/// The up-to-three envelopes a full sphere splits into.
#[derive(Debug, Default)]
pub struct Dispatch {
    pub perception: Option<Envelope<PerceptionAck>>,
    pub mail: Option<Envelope<MailBag>>,
    pub influences: Option<Envelope<InfluenceSet>>,
}

impl Dispatch {
    /// Number of envelopes present.
    pub fn len(&self) -> usize {
        usize::from(self.perception.is_some())
            + usize::from(self.mail.is_some())
            + usize::from(self.influences.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total outcomes represented across all envelopes.
    pub fn outcomes(&self) -> usize {
        self.perception.as_ref().map_or(0, |e| e.outcomes)
            + self.mail.as_ref().map_or(0, |e| e.outcomes)
            + self.influences.as_ref().map_or(0, |e| e.outcomes)
    }
}
