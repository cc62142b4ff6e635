//! High-level SL88 operations
//!
//! Each method is one editor-style exchange with the keyboard: handshake,
//! keep-alive, program recall/store, name listing and bulk loads.

use crate::device::{DeviceError, Sl88Device};
use crate::grammar::SysexMessage;
use crate::group::PatchSet;
use crate::messages::{
    CheckAttached, ConfirmAttached, ConfirmConnection, EndOfProgramNameDump, InitiateConnection,
    ProgramName, RecallProgram, RequestProgramNameDump, SetVelocityCurve, StoreProgram,
};
use crate::patch::Patch;
use crate::transport::TransportError;
use std::sync::Arc;

pub struct Sl88Api {
    device: Arc<Sl88Device>,
}

impl Sl88Api {
    pub fn new(device: Arc<Sl88Device>) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &Arc<Sl88Device> {
        &self.device
    }

    /// Open an editor session
    pub async fn connect(&self) -> Result<(), DeviceError> {
        self.device
            .request_message::<_, ConfirmConnection>(&InitiateConnection)
            .await?;
        log::info!("[SL88] Editor session confirmed");
        Ok(())
    }

    /// Keep-alive probe; a timeout means "not attached"
    pub async fn is_attached(&self) -> Result<bool, DeviceError> {
        match self
            .device
            .request_message::<_, ConfirmAttached>(&CheckAttached)
            .await
        {
            Ok(_) => Ok(true),
            Err(DeviceError::Transport(TransportError::Timeout { .. })) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn recall_program(&self, program: u16) -> Result<(), DeviceError> {
        self.device
            .send_message_async(&RecallProgram { program })
            .await
    }

    pub async fn store_program(&self, program: u16) -> Result<(), DeviceError> {
        self.device
            .send_message_async(&StoreProgram { program })
            .await
    }

    /// Every program name, in the order the device dumps them
    ///
    /// Each entry must arrive within the request timeout of the previous one.
    pub async fn program_names(&self) -> Result<Vec<ProgramName>, DeviceError> {
        let (tx, rx) = flume::unbounded();
        let id = self.device.register_listener(move |payload| {
            if let Some(name) = ProgramName::decode(payload) {
                let _ = tx.send(Some(name));
                true
            } else if EndOfProgramNameDump::decode(payload).is_some() {
                let _ = tx.send(None);
                true
            } else {
                false
            }
        });

        let _listener = self.device.guard(id);
        self.collect_names(&rx).await
    }

    async fn collect_names(
        &self,
        rx: &flume::Receiver<Option<ProgramName>>,
    ) -> Result<Vec<ProgramName>, DeviceError> {
        let request = RequestProgramNameDump.encode()?;
        let timeout = self.device.transport().timing().timeout;
        self.device.send(&request)?;

        let mut names = Vec::new();
        loop {
            match tokio::time::timeout(timeout, rx.recv_async()).await {
                Ok(Ok(Some(name))) => names.push(name),
                Ok(Ok(None)) => return Ok(names),
                Ok(Err(_)) => return Err(TransportError::Closed.into()),
                Err(_) => {
                    log::warn!(
                        "[SL88] Program name dump stalled after {} entries",
                        names.len()
                    );
                    return Err(TransportError::Timeout { request }.into());
                }
            }
        }
    }

    /// Write `patch` into `program` and bind it for live edits
    pub async fn load_patch(&self, program: u16, patch: &mut Patch) -> Result<(), DeviceError> {
        log::info!("[SL88] Loading '{}' into program {}", patch.name(), program);
        self.device
            .send_message_async(&patch.to_dump(program))
            .await?;
        patch.attach(&self.device);
        Ok(())
    }

    /// Send a whole group and bind it so later edits re-send it
    pub async fn send_group(&self, set: &mut PatchSet) -> Result<(), DeviceError> {
        log::info!("[SL88] Sending group {} '{}'", set.group(), set.name());
        self.device.send_message_async(&set.to_dump()).await?;
        set.attach(&self.device);
        Ok(())
    }

    pub async fn set_velocity_curve(&self, curve: &SetVelocityCurve) -> Result<(), DeviceError> {
        self.device.send_message_async(curve).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Framing;
    use crate::fields::{FieldValue, ZoneField};
    use crate::messages::{try_decode, Message};
    use crate::transport::{ChannelOutput, SysexTransport, Timing};

    fn api() -> (Sl88Api, flume::Receiver<String>) {
        let (tx, rx) = flume::unbounded();
        let transport = Arc::new(SysexTransport::new("sl88", ChannelOutput(tx), Timing::default()));
        (
            Sl88Api::new(Sl88Device::new(transport, Framing::default())),
            rx,
        )
    }

    fn payload(device: &Sl88Device, hex: &str) -> Message {
        let payload = device.framing().strip(hex).expect("framed");
        try_decode(payload).expect("known message")
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_attached_on_timeout() {
        let (api, _rx) = api();
        assert!(!api.is_attached().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_program_names_collects_until_end() {
        let (api, rx) = api();
        let device = Arc::clone(api.device());
        let responder = async move {
            let request = rx.recv_async().await.unwrap();
            assert_eq!(
                payload(&device, &request),
                Message::from(RequestProgramNameDump)
            );
            for (program, name) in [(0, "Grand"), (1, "Rhodes")] {
                let hex = ProgramName {
                    program,
                    name: name.into(),
                }
                .encode()
                .unwrap();
                device.transport().dispatch(&device.framing().wrap(&hex));
            }
            device.transport().dispatch(&device.framing().wrap("10"));
        };

        let (names, ()) = tokio::join!(api.program_names(), responder);
        let names = names.unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[1].name, "Rhodes");
        assert_eq!(api.device().transport().listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_program_names_times_out() {
        let (api, _rx) = api();
        assert!(matches!(
            api.program_names().await,
            Err(DeviceError::Transport(TransportError::Timeout { .. }))
        ));
        assert_eq!(api.device().transport().listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_name_dump_unregisters() {
        let (api, _rx) = api();
        let outer =
            tokio::time::timeout(std::time::Duration::from_millis(10), api.program_names()).await;
        assert!(outer.is_err());
        assert_eq!(api.device().transport().listener_count(), 0);

        let late = api.device().framing().wrap("10");
        assert!(!api.device().transport().dispatch(&late));
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_patch_then_live_edit() {
        let (api, rx) = api();
        let mut patch = Patch::new();
        patch.set_name("Offline").unwrap();
        assert!(rx.try_recv().is_err());

        api.load_patch(3, &mut patch).await.unwrap();
        match payload(api.device(), &rx.try_recv().unwrap()) {
            Message::ProgramOut(dump) => {
                assert_eq!(dump.program, 3);
                assert_eq!(dump.data, patch.words());
            }
            other => panic!("Expected ProgramOut, got {:?}", other),
        }

        patch
            .zone_mut(2)
            .unwrap()
            .set(ZoneField::Octave, 3)
            .unwrap();
        match payload(api.device(), &rx.try_recv().unwrap()) {
            Message::ProgramParam(param) => {
                assert_eq!(param.offset, 0xa6);
                assert_eq!(param.values, vec![6]);
            }
            other => panic!("Expected ProgramParam, got {:?}", other),
        }
        assert_eq!(
            patch.zone(2).unwrap().get(ZoneField::Octave),
            FieldValue::Number(3)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bound_group_resends_on_edit() {
        let (api, rx) = api();
        let mut set = PatchSet::new(1);
        api.send_group(&mut set).await.unwrap();
        assert!(matches!(
            payload(api.device(), &rx.try_recv().unwrap()),
            Message::GroupDumpOut(_)
        ));

        set.set_presets(&[7, 8]).unwrap();
        match payload(api.device(), &rx.try_recv().unwrap()) {
            Message::GroupDumpOut(dump) => assert_eq!(dump.presets, vec![7, 8]),
            other => panic!("Expected GroupDumpOut, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recall_and_store() {
        let (api, rx) = api();
        api.recall_program(5).await.unwrap();
        api.store_program(9).await.unwrap();
        assert_eq!(rx.try_recv().unwrap(), "f000204b060500f7");
        assert_eq!(rx.try_recv().unwrap(), "f000204b090900f7");
    }
}
