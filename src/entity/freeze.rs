//! Hot-upgrade freeze and restore of the resident entity set.
//!
//! Freezing serializes every resident entity plus the service directory
//! into a transferable snapshot. Restoring rebuilds the set in three
//! ordered phases so the space topology exists before anything is placed
//! into it:
//!
//! 1. the nil-space (exactly one, the root of the topology),
//! 2. every other space,
//! 3. everything else, each resolving its containing space by id.
//!
//! An entity frozen mid-way through a space entry carries that request in
//! the snapshot; the entry is replayed as a deferred task after all three
//! phases, because the target space may not exist at the moment the entity
//! itself is rebuilt.

use crate::entity::lifecycle::{panic_message, CreateCause};
use crate::entity::manager::{CreateRequest, EntityCore};
use crate::entity::{AttrMap, EntityId, GameClient, SpaceId};
use crate::error::{FreezeError, RestoreError};
use crate::space::{space_kind_of, Position, Yaw, SPACE_ENTITY_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// A space entry that was in flight when the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnterSpaceRequest {
    pub space_id: SpaceId,
    pub enter_pos: Position,
}

/// Everything needed to rebuild one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityFreezeData {
    pub type_name: String,
    pub attrs: AttrMap,
    pub pos: Position,
    pub yaw: Yaw,
    pub client: Option<GameClient>,
    pub space_id: Option<SpaceId>,
    pub timer_data: Option<Vec<u8>>,
    pub esr: Option<EnterSpaceRequest>,
}

/// A transferable snapshot of the resident set and the service directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FreezeData {
    pub entities: HashMap<EntityId, EntityFreezeData>,
    /// Service providers as sorted lists; two snapshots of equal
    /// directories serialize identically.
    pub services: BTreeMap<String, Vec<EntityId>>,
}

impl EntityCore {
    /// Build a freeze snapshot of every resident entity.
    ///
    /// Fails without touching any running state when the resident set does
    /// not contain exactly one nil-space: the three-phase restore needs an
    /// unambiguous root to plant the space topology.
    pub fn freeze(&self, game_id: u16) -> Result<FreezeData, FreezeError> {
        tracing::info!(game_id, count = self.entity_count(), "freezing entities");

        let mut entities = HashMap::new();
        let mut found_nil_space = false;
        for entity in self.entities() {
            entities.insert(entity.id().clone(), entity.freeze_data());
            if entity.is_space_entity() && entity.space_kind() == 0 {
                if found_nil_space {
                    return Err(FreezeError::DuplicateNilSpace);
                }
                found_nil_space = true;
            }
        }
        if !found_nil_space {
            return Err(FreezeError::NilSpaceMissing);
        }

        let services = self
            .services
            .borrow()
            .iter()
            .map(|(name, providers)| (name.clone(), providers.iter().cloned().collect()))
            .collect();

        Ok(FreezeData { entities, services })
    }

    /// Rebuild the resident set from a freeze snapshot.
    ///
    /// Any panic raised during the rebuild is caught and returned as an
    /// error; the partially restored state is left as-is for inspection.
    pub fn restore_freezed_entities(self: &Rc<Self>, freeze: &FreezeData) -> Result<(), RestoreError> {
        tracing::info!(count = freeze.entities.len(), "restoring frozen entities");
        match catch_unwind(AssertUnwindSafe(|| self.restore_phases(freeze))) {
            Ok(()) => Ok(()),
            Err(payload) => Err(RestoreError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    fn restore_phases(self: &Rc<Self>, freeze: &FreezeData) {
        // Phase 1: the nil-space, the root everything else hangs off.
        self.restore_matching(freeze, |type_name, space_kind| {
            type_name == SPACE_ENTITY_TYPE && space_kind == 0
        });

        // Phase 2: the remaining spaces.
        self.restore_matching(freeze, |type_name, space_kind| {
            type_name == SPACE_ENTITY_TYPE && space_kind != 0
        });

        // Phase 3: everything that lives inside a space.
        self.restore_matching(freeze, |type_name, _| type_name != SPACE_ENTITY_TYPE);

        let mut services = self.services.borrow_mut();
        for (name, provider_list) in &freeze.services {
            let providers: BTreeSet<EntityId> = provider_list.iter().cloned().collect();
            services.insert(name.clone(), providers);
        }
    }

    fn restore_matching(self: &Rc<Self>, freeze: &FreezeData, filter: impl Fn(&str, i64) -> bool) {
        for (entity_id, info) in &freeze.entities {
            let space_kind = if info.type_name == SPACE_ENTITY_TYPE {
                space_kind_of(&info.attrs)
            } else {
                0
            };
            if !filter(info.type_name.as_str(), space_kind) {
                continue;
            }

            let space = if info.type_name == SPACE_ENTITY_TYPE {
                None
            } else {
                info.space_id
                    .as_ref()
                    .and_then(|space_id| self.spaces().get_space(space_id))
            };

            self.create_entity(CreateRequest {
                type_name: info.type_name.clone(),
                space,
                pos: info.pos,
                entity_id: Some(entity_id.clone()),
                data: Some(info.attrs.clone()),
                timer_data: info.timer_data.clone(),
                client: info.client.clone(),
                cause: CreateCause::Restore,
            });
            tracing::info!(entity = %entity_id, type_name = %info.type_name, "restored entity");

            if let Some(esr) = &info.esr {
                // The entry target may only come to exist in a later phase;
                // replay strictly after the whole rebuild.
                let core = self.clone();
                let entity_id = entity_id.clone();
                let esr = esr.clone();
                self.tasks().spawn(
                    "deferred_enter_space",
                    Box::pin(async move {
                        if let Some(entity) = core.get_entity(&entity_id) {
                            entity.enter_space(&esr.space_id, esr.enter_pos);
                        }
                    }),
                );
            }
        }
    }
}
