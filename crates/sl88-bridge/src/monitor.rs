//! Decodes and logs traffic crossing the bridge
//!
//! Also mirrors the program the editor is working on: a dump in either
//! direction replaces the mirror, and each `ProgramParam` is applied to it.

use sl88_sysex::hex::pretty_hex;
use sl88_sysex::{try_decode, Message, Patch};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct Monitor {
    mirror: Mutex<Option<Patch>>,
}

impl Monitor {
    fn mirror(&self) -> MutexGuard<'_, Option<Patch>> {
        self.mirror.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Log one payload seen travelling `direction`; true if it decoded
    pub fn observe(&self, direction: &str, payload: &str) -> bool {
        let Some(message) = try_decode(payload) else {
            return false;
        };
        match &message {
            // Keep-alive traffic
            Message::CheckAttached(_) | Message::ConfirmAttached(_) => {}
            other => log::info!("{}: {}", direction, other),
        }
        self.track(&message);
        true
    }

    /// Unrecognised payloads
    pub fn unrecognised(&self, direction: &str, payload: &str) {
        log::info!("{}: unrecognised {}", direction, pretty_hex(payload));
    }

    fn track(&self, message: &Message) {
        let mut mirror = self.mirror();
        match message {
            Message::ProgramIn(dump) => *mirror = Some(Patch::from_dump(dump)),
            Message::ProgramOut(dump) => *mirror = Some(Patch::from_words(&dump.data)),
            Message::ProgramParam(param) => match mirror.as_mut() {
                Some(patch) => {
                    if let Err(e) = patch.apply_param(param) {
                        log::warn!("Monitor: parameter edit not mirrored: {}", e);
                    }
                }
                None => log::debug!("Monitor: parameter edit before any program dump"),
            },
            _ => {}
        }
    }

    /// Run `f` against the mirrored program, if one has been seen
    pub fn with_mirror<R>(&self, f: impl FnOnce(&Patch) -> R) -> Option<R> {
        self.mirror().as_ref().map(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sl88_sysex::messages::{ProgramParam, RecallProgram};
    use sl88_sysex::{FieldValue, SysexMessage, ZoneField};

    #[test]
    fn test_unknown_payload_is_not_claimed() {
        let monitor = Monitor::default();
        assert!(!monitor.observe("test", "55aa"));
        assert!(monitor.with_mirror(|p| p.name()).is_none());
    }

    #[test]
    fn test_known_payload_is_claimed() {
        let monitor = Monitor::default();
        let hex = RecallProgram { program: 2 }.encode().unwrap();
        assert!(monitor.observe("test", &hex));
        assert!(monitor.observe("test", "7f"));
    }

    #[test]
    fn test_mirror_follows_dump_and_edits() {
        let monitor = Monitor::default();
        let edit = ProgramParam {
            offset: 0xa4,
            length: 1,
            values: vec![6],
        }
        .encode()
        .unwrap();

        // Edits before a dump have nothing to apply to
        assert!(monitor.observe("test", &edit));
        assert!(monitor.with_mirror(|p| p.name()).is_none());

        let dump = Patch::new().to_dump(0).encode().unwrap();
        assert!(monitor.observe("test", &dump));
        assert_eq!(
            monitor.with_mirror(|p| p.name()),
            Some("SL 88 GRAND".to_string())
        );

        assert!(monitor.observe("test", &edit));
        let octave = monitor.with_mirror(|p| p.zone(0).map(|z| z.get(ZoneField::Octave)).ok());
        assert_eq!(octave, Some(Some(FieldValue::Number(3))));
    }
}
