//! Group (patch set) overlay
//!
//! Same word-buffer discipline as [`Patch`](crate::patch::Patch), without
//! zones. The protocol has no field-level group update, so a bound
//! [`PatchSet`] re-sends the whole group after every edit.

use crate::device::Sl88Device;
use crate::fields::{FieldDef, FieldKind, FieldValue, PatchError};
use crate::messages::{GroupDumpIn, GroupDumpOut};
use std::sync::{Arc, Weak};

/// Words in a group buffer
pub const GROUP_WORDS: usize = 76;

/// Characters (including terminator) in a group name
pub const GROUP_NAME_LEN: usize = 15;

const TEMPLATE_NAME: &str = "-----------";

pub static GROUP_NAME: FieldDef = FieldDef::new("name", 0, GROUP_NAME_LEN, FieldKind::Text);

pub static GROUP_PRESETS: FieldDef = FieldDef::new("presets", 15, 60, FieldKind::Presets);

pub static GROUP_ACTIVE: FieldDef = FieldDef::word("active", 75, FieldKind::Flag { on: 2, off: 0 });

/// A named set of up to 30 program slots
///
/// Setters store locally first; a [`PatchError::Device`] from a bound set
/// means the buffer changed but the device did not.
pub struct PatchSet {
    group: u16,
    data: Box<[u16; GROUP_WORDS]>,
    live: Option<Weak<Sl88Device>>,
}

impl std::fmt::Debug for PatchSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchSet")
            .field("group", &self.group)
            .field("name", &self.name())
            .field("presets", &self.presets())
            .field("active", &self.active())
            .finish()
    }
}

impl PatchSet {
    /// An empty, inactive group
    pub fn new(group: u16) -> Self {
        let mut data = Box::new([0u16; GROUP_WORDS]);
        let templated = [
            (&GROUP_NAME, FieldValue::from(TEMPLATE_NAME)),
            (&GROUP_PRESETS, FieldValue::Presets(Vec::new())),
            (&GROUP_ACTIVE, FieldValue::Flag(false)),
        ];
        for (def, value) in templated {
            if let Ok(words) = def.encode(&value) {
                data[def.offset..def.offset + def.width].copy_from_slice(&words);
            }
        }
        Self {
            group,
            data,
            live: None,
        }
    }

    pub fn from_dump(dump: &GroupDumpIn) -> Self {
        let mut set = Self::new(dump.group);
        let fields = [
            (&GROUP_NAME, FieldValue::Text(dump.name.clone())),
            (&GROUP_PRESETS, FieldValue::Presets(dump.presets.clone())),
            (&GROUP_ACTIVE, FieldValue::Flag(dump.active == Some(true))),
        ];
        for (def, value) in fields {
            if let Err(e) = set.store(def, &value) {
                log::warn!("PatchSet: dropping {} from group dump: {}", def.name, e);
            }
        }
        set
    }

    pub fn to_dump(&self) -> GroupDumpOut {
        GroupDumpOut {
            group: self.group,
            name: self.name(),
            presets: self.presets(),
            active: Some(self.active()),
        }
    }

    pub fn group(&self) -> u16 {
        self.group
    }

    pub fn words(&self) -> &[u16] {
        &self.data[..]
    }

    pub fn attach(&mut self, device: &Arc<Sl88Device>) {
        self.live = Some(Arc::downgrade(device));
    }

    pub fn detach(&mut self) {
        self.live = None;
    }

    pub fn name(&self) -> String {
        match self.read(&GROUP_NAME) {
            FieldValue::Text(name) => name,
            _ => String::new(),
        }
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), PatchError> {
        self.write(&GROUP_NAME, &FieldValue::from(name))
    }

    /// Program slots in order (empty slots are skipped)
    pub fn presets(&self) -> Vec<u16> {
        match self.read(&GROUP_PRESETS) {
            FieldValue::Presets(presets) => presets,
            _ => Vec::new(),
        }
    }

    /// Replace the slot list; entries past the 30th are dropped
    pub fn set_presets(&mut self, presets: &[u16]) -> Result<(), PatchError> {
        self.write(&GROUP_PRESETS, &FieldValue::Presets(presets.to_vec()))
    }

    pub fn active(&self) -> bool {
        self.read(&GROUP_ACTIVE) == FieldValue::Flag(true)
    }

    pub fn set_active(&mut self, active: bool) -> Result<(), PatchError> {
        self.write(&GROUP_ACTIVE, &FieldValue::Flag(active))
    }

    fn read(&self, def: &FieldDef) -> FieldValue {
        def.decode(&self.data[def.offset..def.offset + def.width])
    }

    fn store(&mut self, def: &FieldDef, value: &FieldValue) -> Result<(), PatchError> {
        let words = def.encode(value)?;
        self.data[def.offset..def.offset + def.width].copy_from_slice(&words);
        Ok(())
    }

    fn write(&mut self, def: &FieldDef, value: &FieldValue) -> Result<(), PatchError> {
        self.store(def, value)?;
        if let Some(device) = self.live.as_ref().and_then(Weak::upgrade) {
            log::debug!("PatchSet: resending group {} after {} edit", self.group, def.name);
            device.send_message(&self.to_dump())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{EMPTY_SLOT, PRESET_SLOTS};

    #[test]
    fn test_template() {
        let set = PatchSet::new(4);
        assert_eq!(set.group(), 4);
        assert_eq!(set.name(), "-----------");
        assert!(set.presets().is_empty());
        assert!(!set.active());
        assert!(set.words()[15..75].iter().all(|&w| w == EMPTY_SLOT));
    }

    #[test]
    fn test_field_round_trips() {
        let mut set = PatchSet::new(0);
        set.set_name("Sunday gig").unwrap();
        set.set_presets(&[4, 0, 17]).unwrap();
        set.set_active(true).unwrap();

        assert_eq!(set.name(), "Sunday gig");
        assert_eq!(set.presets(), vec![4, 0, 17]);
        assert!(set.active());
        assert_eq!(set.words()[75], 2);
    }

    #[test]
    fn test_full_preset_list() {
        let mut set = PatchSet::new(0);
        let presets: Vec<u16> = (1..=PRESET_SLOTS as u16).collect();
        set.set_presets(&presets).unwrap();
        assert!(!set.words()[15..75].contains(&EMPTY_SLOT));
        assert_eq!(set.presets(), presets);

        let mut too_many = presets.clone();
        too_many.push(99);
        set.set_presets(&too_many).unwrap();
        assert_eq!(set.presets(), presets);
    }

    #[test]
    fn test_dump_conversion() {
        let dump = GroupDumpIn {
            group: 9,
            name: "Jazz".into(),
            presets: vec![2, 3],
            active: Some(true),
            checksum: 0x40,
        };
        let set = PatchSet::from_dump(&dump);
        assert_eq!(set.group(), 9);
        assert_eq!(set.presets(), vec![2, 3]);

        let out = set.to_dump();
        assert_eq!(out.name, "Jazz");
        assert_eq!(out.active, Some(true));
        assert_eq!(out.presets, vec![2, 3]);
    }

    #[test]
    fn test_unknown_active_reads_inactive() {
        let dump = GroupDumpIn {
            active: None,
            ..Default::default()
        };
        assert!(!PatchSet::from_dump(&dump).active());
    }

    #[test]
    fn test_long_name_truncates() {
        let mut set = PatchSet::new(0);
        set.set_name("A very long group name").unwrap();
        assert_eq!(set.name(), "A very long gr");
    }
}
