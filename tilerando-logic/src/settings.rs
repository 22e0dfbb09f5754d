//! Logic settings: the static configuration the requirement graph is built
//! under. Every field defaults to the conservative choice, so a default
//! settings value yields vanilla-safe logic.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogicSettings {
    // Glitches and skips the logic may assume the player can perform:
    pub assume_statue_glitch: bool,
    pub assume_trigger_glitch: bool,
    pub assume_teleport_skip: bool,
    pub assume_rabbit_skip: bool,
    pub assume_rage_skip: bool,
    pub assume_wild_warp: bool,
    pub assume_ghetto_flight: bool,
    pub assume_flight_statue_skip: bool,
    pub assume_sword_charge_glitch: bool,

    // Hard-disables, overriding the assumptions above where they overlap:
    pub disable_teleport_skip: bool,

    // What the logic must guarantee before routing the player somewhere:
    pub guarantee_barrier: bool,
    pub guarantee_gas_mask: bool,
    pub guarantee_matching_sword: bool,
    pub guarantee_sword_magic: bool,
    pub guarantee_refresh: bool,

    // Gameplay variations that change what counts as a capability:
    pub orbs_optional: bool,
    pub leather_boots_give_speed: bool,
    pub gas_mask_for_pain: bool,
    pub charge_shots_only: bool,
    pub teleport_on_thunder_sword: bool,
    pub fog_lamp_not_required: bool,
    pub require_healed_dolphin: bool,
    pub preserve_unique_checks: bool,
    pub always_mimics: bool,
}
