//! Lifecycle transitions: realm assignment and carryover.

use crate::error::{KarmaError, KarmaResult};
use crate::ledger::TokenLedger;
use crate::role::RoleEngine;
use chrono::Utc;
use karma_storage::{KarmaStorage, StorageError};
use karma_types::{
    Balances, Carryover, DeathEvent, DeathEventId, KarmaConfig, TokenFamily, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealmAssignment {
    pub name: String,
    pub description: String,
}

pub struct TransitionEngine {
    storage: Arc<dyn KarmaStorage>,
    config: Arc<KarmaConfig>,
    ledger: TokenLedger,
    roles: Arc<RoleEngine>,
}

impl TransitionEngine {
    pub fn new(
        storage: Arc<dyn KarmaStorage>,
        config: Arc<KarmaConfig>,
        roles: Arc<RoleEngine>,
    ) -> Self {
        Self {
            ledger: TokenLedger::new(storage.clone(), config.clone()),
            storage,
            config,
            roles,
        }
    }

    /// Weighted Punya total minus weighted Paap total.
    pub fn net_karma_of(&self, balances: &Balances) -> KarmaResult<f64> {
        let punya = self
            .ledger
            .weighted_total(TokenFamily::Punya, &balances.punya_tokens)?;
        let paap = self
            .ledger
            .weighted_total(TokenFamily::Paap, &balances.paap_tokens)?;
        Ok(punya - paap)
    }

    pub async fn net_karma(&self, user_id: &UserId) -> KarmaResult<f64> {
        let user = self.ledger.load_user(user_id).await?;
        self.net_karma_of(&user.balances)
    }

    /// First band (in descending floor order) whose floor is at or below
    /// `net_karma`; the unbounded last band catches the rest.
    pub fn assign_realm(&self, net_karma: f64) -> RealmAssignment {
        let realms = &self.config.transition.realms;
        realms
            .iter()
            .find(|band| band.min_net_karma.map_or(true, |floor| net_karma >= floor))
            .or_else(|| realms.last())
            .map(|band| RealmAssignment {
                name: band.name.clone(),
                description: band.description.clone(),
            })
            .unwrap_or_else(|| RealmAssignment {
                name: String::new(),
                description: String::new(),
            })
    }

    /// Retained balances and the role their merit implies.
    pub fn carryover_for(&self, balances: &Balances) -> KarmaResult<Carryover> {
        let balances = balances.retained(
            self.config.transition.retention_rate,
            self.config.decay.expiry_epsilon,
        );
        let merit = self.roles.merit_score(&balances)?;
        Ok(Carryover {
            starting_role: self.roles.determine_role(merit),
            balances,
            merit,
        })
    }

    /// End the user's lifecycle: record the death event and reset the user
    /// to the carryover in one storage call.
    pub async fn create_carryover(&self, user_id: &UserId) -> KarmaResult<DeathEvent> {
        let user = self.ledger.load_user(user_id).await?;
        let net_karma = self.net_karma_of(&user.balances)?;
        let realm = self.assign_realm(net_karma);
        let carryover = self.carryover_for(&user.balances)?;
        debug!(
            user = %user_id,
            net_karma,
            merit = carryover.merit,
            "carryover computed"
        );

        let event = DeathEvent {
            event_id: DeathEventId::generate(),
            user_id: user_id.clone(),
            timestamp: Utc::now(),
            net_karma,
            realm: realm.name,
            realm_description: realm.description,
            carryover,
        };
        match self.storage.commit_rebirth(&event).await {
            Ok(_) => {}
            Err(StorageError::NotFound(_)) => return Err(KarmaError::UserNotFound(user_id.clone())),
            Err(err) => return Err(err.into()),
        }

        info!(
            user = %user_id,
            event = %event.event_id,
            realm = %event.realm,
            net_karma,
            starting_role = %event.carryover.starting_role,
            "lifecycle rolled over"
        );
        Ok(event)
    }

    /// Recorded death events, newest first.
    pub async fn death_events(&self, user_id: &UserId) -> KarmaResult<Vec<DeathEvent>> {
        Ok(self.storage.list_death_events(user_id).await?)
    }
}
