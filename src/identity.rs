//! Identity and membership collaborators.
//!
//! Meetings and ILTs are only visible to users who may view that content
//! type and who are registered participants of the specific instance.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::{Typology, UserId};

/// Membership predicates consumed by the step resolver.
pub trait Membership: Send + Sync {
    /// Whether the user may view content of this typology at all.
    fn can_view(&self, user_id: UserId, typology: Typology) -> bool;

    /// Whether the user is a registered participant of the instance.
    fn is_participant(&self, user_id: UserId, typology: Typology, entity_id: u64) -> bool;
}

/// A registered participation in a meeting or ILT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participation {
    pub user_id: UserId,
    pub typology: Typology,
    pub entity_id: u64,
}

/// A view capability granted to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewCapability {
    pub user_id: UserId,
    pub typology: Typology,
}

/// Table-backed membership, serialized with the data document.
///
/// Modules and courses are always viewable; only live sessions need an
/// explicit capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Roster {
    pub participations: HashSet<Participation>,
    pub capabilities: HashSet<ViewCapability>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant the view capability for a typology.
    pub fn grant(&mut self, user_id: UserId, typology: Typology) {
        self.capabilities.insert(ViewCapability { user_id, typology });
    }

    /// Register a participant.
    pub fn register(&mut self, user_id: UserId, typology: Typology, entity_id: u64) {
        self.participations.insert(Participation {
            user_id,
            typology,
            entity_id,
        });
    }
}

impl Membership for Roster {
    fn can_view(&self, user_id: UserId, typology: Typology) -> bool {
        if !typology.is_live_session() {
            return true;
        }
        self.capabilities
            .contains(&ViewCapability { user_id, typology })
    }

    fn is_participant(&self, user_id: UserId, typology: Typology, entity_id: u64) -> bool {
        if !typology.is_live_session() {
            return true;
        }
        self.participations.contains(&Participation {
            user_id,
            typology,
            entity_id,
        })
    }
}

/// Membership that sees and joins everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenMembership;

impl Membership for OpenMembership {
    fn can_view(&self, _user_id: UserId, _typology: Typology) -> bool {
        true
    }

    fn is_participant(&self, _user_id: UserId, _typology: Typology, _entity_id: u64) -> bool {
        true
    }
}
