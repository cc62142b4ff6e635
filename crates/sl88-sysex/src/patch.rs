//! Program (patch) overlay
//!
//! A [`Patch`] owns the 256-word program buffer. Fields are read and written
//! through the [`fields`](crate::fields) table; zone fields go through the
//! borrowed [`Zone`] / [`ZoneMut`] views.
//!
//! Editing happens in two phases. A patch built offline (from the template
//! or a dump) only changes its buffer. Once [`Patch::attach`]ed to a device,
//! every successful write also sends a `ProgramParam` carrying just that
//! field's words.

use crate::device::Sl88Device;
use crate::fields::{FieldDef, FieldValue, PatchError, ZoneField, PATCH_NAME, ZONE_COUNT};
use crate::messages::{ProgramIn, ProgramOut, ProgramParam};
use std::sync::{Arc, Weak};

/// Words in a program buffer
pub const PATCH_WORDS: usize = 256;

/// The factory "SL 88 GRAND" program
pub const TEMPLATE: [u16; PATCH_WORDS] = [
    85, 83, 76, 32, 56, 56, 32, 71, 82, 65, 78, 68, 0, 32, 32, 32, //
    0, 0, 0, 0, 0, 0, 0, 0, 73, 78, 83, 84, 82, 85, 77, 69, //
    78, 84, 0, 32, 73, 78, 83, 84, 82, 85, 77, 69, 78, 84, 0, 32, //
    73, 78, 83, 84, 82, 85, 77, 69, 78, 84, 0, 32, 73, 78, 83, 84, //
    82, 85, 77, 69, 78, 84, 0, 32, 83, 79, 85, 78, 68, 0, 32, 32, //
    32, 32, 32, 83, 79, 85, 78, 68, 0, 32, 32, 32, 32, 32, 83, 79, //
    85, 78, 68, 0, 32, 32, 32, 32, 32, 83, 79, 85, 78, 68, 0, 32, //
    32, 32, 32, 32, 2, 2, 2, 2, 0, 0, 1, 2, 0, 1, 0, 1, //
    127, 127, 127, 127, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    21, 21, 21, 21, 108, 108, 108, 108, 0, 0, 0, 0, 127, 127, 127, 127, //
    1, 1, 1, 1, 3, 3, 3, 3, 12, 12, 12, 12, 1, 1, 1, 1, //
    100, 100, 100, 100, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, //
    2, 2, 2, 2, 75, 75, 75, 75, 72, 72, 72, 72, 0, 0, 0, 0, //
    65, 65, 65, 65, 68, 68, 68, 68, 12, 12, 12, 12, 12, 12, 12, 12, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
];

/// Program name stored in a raw program buffer
pub fn name_of_words(words: &[u16]) -> String {
    let end = (PATCH_NAME.offset + PATCH_NAME.width).min(words.len());
    let start = PATCH_NAME.offset.min(end);
    match PATCH_NAME.decode(&words[start..end]) {
        FieldValue::Text(name) => name,
        _ => String::new(),
    }
}

/// One device program backed by a fixed word buffer
///
/// Setters store locally first; a [`PatchError::Device`] from a bound patch
/// means the buffer changed but the device did not.
pub struct Patch {
    data: Box<[u16; PATCH_WORDS]>,
    live: Option<Weak<Sl88Device>>,
}

impl Default for Patch {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Patch {
    /// Clones are detached from any device
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            live: None,
        }
    }
}

impl std::fmt::Debug for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patch")
            .field("name", &self.name())
            .field("live", &self.is_live())
            .finish()
    }
}

impl Patch {
    /// A fresh patch from the factory template
    pub fn new() -> Self {
        Self {
            data: Box::new(TEMPLATE),
            live: None,
        }
    }

    /// Wrap a copy of `words`; short input is zero filled, extra words ignored
    pub fn from_words(words: &[u16]) -> Self {
        if words.len() != PATCH_WORDS {
            log::warn!(
                "Patch: buffer has {} words, expected {}",
                words.len(),
                PATCH_WORDS
            );
        }
        let mut data = Box::new([0u16; PATCH_WORDS]);
        for (slot, word) in data.iter_mut().zip(words) {
            *slot = *word;
        }
        Self { data, live: None }
    }

    pub fn from_dump(dump: &ProgramIn) -> Self {
        Self::from_words(&dump.data)
    }

    /// Dump this patch for writing into `program`
    pub fn to_dump(&self, program: u16) -> ProgramOut {
        ProgramOut {
            program,
            data: self.data.to_vec(),
        }
    }

    pub fn words(&self) -> &[u16] {
        &self.data[..]
    }

    /// Bind to a device; later writes are forwarded as they happen
    pub fn attach(&mut self, device: &Arc<Sl88Device>) {
        self.live = Some(Arc::downgrade(device));
    }

    pub fn detach(&mut self) {
        self.live = None;
    }

    /// Whether writes are currently forwarded (the device is still alive)
    pub fn is_live(&self) -> bool {
        self.live.as_ref().is_some_and(|w| w.strong_count() > 0)
    }

    pub fn name(&self) -> String {
        name_of_words(&self.data[..])
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), PatchError> {
        self.write(&PATCH_NAME, PATCH_NAME.offset, &FieldValue::from(name))
    }

    pub fn zone(&self, index: usize) -> Result<Zone<'_>, PatchError> {
        if index >= ZONE_COUNT {
            return Err(PatchError::NoSuchZone(index));
        }
        Ok(Zone { patch: self, index })
    }

    pub fn zone_mut(&mut self, index: usize) -> Result<ZoneMut<'_>, PatchError> {
        if index >= ZONE_COUNT {
            return Err(PatchError::NoSuchZone(index));
        }
        Ok(ZoneMut { patch: self, index })
    }

    pub fn zones(&self) -> impl Iterator<Item = Zone<'_>> {
        (0..ZONE_COUNT).map(move |index| Zone { patch: self, index })
    }

    /// Mirror a parameter update observed on the wire
    ///
    /// Writes the words without forwarding them anywhere.
    pub fn apply_param(&mut self, param: &ProgramParam) -> Result<(), PatchError> {
        let offset = param.offset as usize;
        let end = offset + param.values.len();
        if end > PATCH_WORDS {
            return Err(PatchError::OutOfBounds {
                offset,
                length: param.values.len(),
            });
        }
        self.data[offset..end].copy_from_slice(&param.values);
        Ok(())
    }

    fn read(&self, def: &FieldDef, offset: usize) -> FieldValue {
        def.decode(&self.data[offset..offset + def.width])
    }

    fn write(
        &mut self,
        def: &FieldDef,
        offset: usize,
        value: &FieldValue,
    ) -> Result<(), PatchError> {
        let words = def.encode(value)?;
        self.data[offset..offset + def.width].copy_from_slice(&words);

        let Some(device) = self.live.as_ref().and_then(Weak::upgrade) else {
            return Ok(());
        };
        log::debug!("Patch: live update {} = {}", def.name, value);
        device.send_message(&ProgramParam {
            offset: offset as u16,
            length: def.width as u8,
            values: words,
        })?;
        Ok(())
    }
}

/// Read-only view of one zone
#[derive(Clone, Copy)]
pub struct Zone<'a> {
    patch: &'a Patch,
    index: usize,
}

impl<'a> Zone<'a> {
    pub fn get(&self, field: ZoneField) -> FieldValue {
        let def = field.def();
        self.patch.read(def, def.zone_offset(self.index))
    }
}

/// Mutable view of one zone
pub struct ZoneMut<'a> {
    patch: &'a mut Patch,
    index: usize,
}

impl<'a> ZoneMut<'a> {
    pub fn get(&self, field: ZoneField) -> FieldValue {
        let def = field.def();
        self.patch.read(def, def.zone_offset(self.index))
    }

    /// Store `value`, then send it to the bound device if there is one
    ///
    /// On [`PatchError::Device`] the buffer already holds the new value.
    pub fn set(&mut self, field: ZoneField, value: impl Into<FieldValue>) -> Result<(), PatchError> {
        let def = field.def();
        self.patch
            .write(def, def.zone_offset(self.index), &value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Symbol;
    use crate::fields::ZONE_FIELDS;

    #[test]
    fn test_template_fields() {
        let patch = Patch::new();
        assert_eq!(patch.name(), "SL 88 GRAND");

        let zone = patch.zone(2).unwrap();
        assert_eq!(zone.get(ZoneField::Instrument).as_text(), Some("INSTRUMENT"));
        assert_eq!(zone.get(ZoneField::Sound).as_text(), Some("SOUND"));
        assert_eq!(zone.get(ZoneField::Enabled).as_name(), Some("On"));
        assert_eq!(zone.get(ZoneField::MidiPort).as_name(), Some("Midi1"));
        assert_eq!(zone.get(ZoneField::Volume), FieldValue::Number(127));
        assert_eq!(zone.get(ZoneField::Octave), FieldValue::Number(0));
        assert_eq!(zone.get(ZoneField::Transpose), FieldValue::Number(0));
        assert_eq!(zone.get(ZoneField::CurveType).as_name(), Some("Linear"));
        assert_eq!(zone.get(ZoneField::Stick1X).as_name(), Some("Pitchbend"));
        assert_eq!(
            patch.zone(3).unwrap().get(ZoneField::MidiPort).as_name(),
            Some("Midi2")
        );
    }

    #[test]
    fn test_octave_scenario() {
        let mut patch = Patch::new();
        patch.zone_mut(2).unwrap().set(ZoneField::Octave, 3).unwrap();
        assert_eq!(patch.words()[0xa4 + 2], 6);
        assert_eq!(
            patch.zone(2).unwrap().get(ZoneField::Octave),
            FieldValue::Number(3)
        );
    }

    #[test]
    fn test_zone_striping_isolated() {
        for def in &ZONE_FIELDS {
            let field = ZoneField::from_name(def.name).unwrap();
            for i in 0..ZONE_COUNT {
                let mut patch = Patch::new();
                let before = patch.words().to_vec();
                let value = match def.name {
                    "instrument" | "sound" => FieldValue::from("X"),
                    "enabled" => Symbol::Named("Off").into(),
                    "midi_port" => Symbol::Named("BT").into(),
                    "curve_type" => Symbol::Named("User3").into(),
                    name if name.starts_with("stick") || name.starts_with("pedal") => {
                        Symbol::Named("Aftertouch").into()
                    }
                    _ => FieldValue::Number(2),
                };
                patch.zone_mut(i).unwrap().set(field, value.clone()).unwrap();
                assert_eq!(patch.zone(i).unwrap().get(field), value);

                let owned = def.zone_offset(i)..def.zone_offset(i) + def.width;
                for (offset, (old, new)) in before.iter().zip(patch.words()).enumerate() {
                    if !owned.contains(&offset) {
                        assert_eq!(old, new, "{} zone {} touched {:#04x}", def.name, i, offset);
                    }
                }
            }
        }
    }

    #[test]
    fn test_name_round_trip() {
        let mut patch = Patch::new();
        patch.set_name("Stage Piano").unwrap();
        assert_eq!(patch.name(), "Stage Piano");
        assert_eq!(patch.words()[0], 85);
        patch.set_name("An overly long program name").unwrap();
        assert_eq!(patch.name(), "An overly lon");
    }

    #[test]
    fn test_dump_round_trip() {
        let mut patch = Patch::new();
        patch
            .zone_mut(1)
            .unwrap()
            .set(ZoneField::ProgramChange, FieldValue::Off)
            .unwrap();
        let out = patch.to_dump(12);
        assert_eq!(out.program, 12);
        assert_eq!(out.data.len(), PATCH_WORDS);

        let dump = ProgramIn {
            program: 12,
            data: out.data,
            checksum: 0,
        };
        let copy = Patch::from_dump(&dump);
        assert_eq!(copy.words(), patch.words());
        assert_eq!(
            copy.zone(1).unwrap().get(ZoneField::ProgramChange),
            FieldValue::Off
        );
    }

    #[test]
    fn test_short_buffer_is_zero_filled() {
        let patch = Patch::from_words(&[0, 65, 66]);
        assert_eq!(patch.words().len(), PATCH_WORDS);
        assert_eq!(patch.name(), "AB");
    }

    #[test]
    fn test_apply_param() {
        let mut patch = Patch::new();
        patch
            .apply_param(&ProgramParam {
                offset: 0xa6,
                length: 1,
                values: vec![5],
            })
            .unwrap();
        assert_eq!(
            patch.zone(2).unwrap().get(ZoneField::Octave),
            FieldValue::Number(2)
        );

        let overflow = ProgramParam {
            offset: 0xff,
            length: 2,
            values: vec![1, 2],
        };
        assert!(matches!(
            patch.apply_param(&overflow),
            Err(PatchError::OutOfBounds { offset: 0xff, .. })
        ));
    }

    #[test]
    fn test_invalid_zone() {
        let mut patch = Patch::new();
        assert!(matches!(patch.zone(4), Err(PatchError::NoSuchZone(4))));
        assert!(patch.zone_mut(7).is_err());
        assert_eq!(patch.zones().count(), ZONE_COUNT);
    }

    #[test]
    fn test_offline_patch_is_not_live() {
        let mut patch = Patch::new();
        assert!(!patch.is_live());
        patch
            .zone_mut(0)
            .unwrap()
            .set(ZoneField::CurveType, Symbol::Named("Fixed"))
            .unwrap();
        assert_eq!(patch.words()[0x98], 0x96);
    }

    #[test]
    fn test_failed_live_update_keeps_local_value() {
        use crate::device::{DeviceError, Framing};
        use crate::transport::{ChannelOutput, SysexTransport, Timing, TransportError};

        let (tx, rx) = flume::unbounded();
        drop(rx);
        let transport = Arc::new(SysexTransport::new("closed", ChannelOutput(tx), Timing::default()));
        let device = Sl88Device::new(transport, Framing::default());

        let mut patch = Patch::new();
        patch.attach(&device);
        let result = patch.zone_mut(0).unwrap().set(ZoneField::Volume, 42);
        assert!(matches!(
            result,
            Err(PatchError::Device(DeviceError::Transport(TransportError::Send(_))))
        ));
        assert_eq!(
            patch.zone(0).unwrap().get(ZoneField::Volume),
            FieldValue::Number(42)
        );
    }
}
