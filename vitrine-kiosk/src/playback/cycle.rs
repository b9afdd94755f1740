//! Slot cycle model
//!
//! The static shape of the repeating playback cycle. Built once at startup
//! and never modified afterwards.

use crate::error::{Error, Result};
use vitrine_common::config::SlotCycleEntry;
use vitrine_common::models::{SlotDefinition, SlotKind};

const GLOBAL_SECS: u32 = 15;
const PARTNER_SECS: u32 = 15;
const LOCAL_AD_SECS: u32 = 10;
const LOCAL_AD_COUNT: usize = 10;
const DYNAMIC_SECS: u32 = 20;

/// Fixed table of slot definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotCycleModel {
    slots: Vec<SlotDefinition>,
}

impl SlotCycleModel {
    /// Standard 13 position cycle: 1 global, 1 partner, 10 local ads, 1 dynamic
    pub fn standard() -> Self {
        let mut kinds = Vec::with_capacity(LOCAL_AD_COUNT + 3);
        kinds.push((SlotKind::Global, GLOBAL_SECS));
        kinds.push((SlotKind::Partner, PARTNER_SECS));
        kinds.extend(std::iter::repeat((SlotKind::LocalAd, LOCAL_AD_SECS)).take(LOCAL_AD_COUNT));
        kinds.push((SlotKind::Dynamic, DYNAMIC_SECS));

        Self::from_kinds(kinds)
    }

    /// Build a cycle from the `[[slot_cycle]]` table of the bootstrap config
    pub fn from_entries(entries: &[SlotCycleEntry]) -> Result<Self> {
        if entries.is_empty() {
            return Err(Error::Config("slot_cycle must contain at least one entry".to_string()));
        }
        if let Some(entry) = entries.iter().find(|e| e.duration_seconds == 0) {
            return Err(Error::Config(format!(
                "slot_cycle entry of kind {} has a zero duration",
                entry.kind
            )));
        }

        Ok(Self::from_kinds(
            entries.iter().map(|e| (e.kind, e.duration_seconds)),
        ))
    }

    /// Configured cycle, or the standard one when none is configured
    pub fn from_config(entries: &[SlotCycleEntry]) -> Result<Self> {
        if entries.is_empty() {
            Ok(Self::standard())
        } else {
            Self::from_entries(entries)
        }
    }

    fn from_kinds(kinds: impl IntoIterator<Item = (SlotKind, u32)>) -> Self {
        let slots = kinds
            .into_iter()
            .enumerate()
            .map(|(index, (kind, nominal_duration_seconds))| SlotDefinition {
                index,
                kind,
                nominal_duration_seconds,
            })
            .collect();
        Self { slots }
    }

    /// Definition for any index; wraps around the cycle length
    pub fn definition_for(&self, index: usize) -> SlotDefinition {
        self.slots[index % self.slots.len()]
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SlotDefinition> {
        self.slots.iter()
    }
}

impl Default for SlotCycleModel {
    fn default() -> Self {
        Self::standard()
    }
}
