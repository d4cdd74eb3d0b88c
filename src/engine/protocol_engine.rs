// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Operation sequencing on top of the transport session.

use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::operation::{Operation, OperationKind, Outcome, ReadResult, Transition, WriteStep};
use crate::allocator::{Allocator, Registry};
use crate::bluetooth::{
    Command, ConnectionState, DeviceMessage, LinkEvent, SessionEvent, TransportSession,
};
use crate::error::EngineError;
use crate::tag::{self, Serial, TagColor, TagRecord};
use crate::update::UpdateCheck;

/// Default time a wipe may take before it is given up.
pub const DEFAULT_WIPE_TIMEOUT: Duration = Duration::from_secs(15);

/// Everything the user chooses for a dual-tag write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRequest {
    pub vendor_id: String,
    pub batch: String,
    pub film_id: u32,
    pub color: TagColor,
    pub length_m: u16,
    /// Six-digit serial chosen by the user instead of a generated one.
    pub custom_serial: Option<String>,
    pub date: NaiveDate,
}

/// Things the front-end should know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    ConnectionChanged(ConnectionState),
    FirmwareVersion(String),
    ReadCompleted(ReadResult),
    WriteProgress(WriteStep),
    WriteCompleted { serial: Serial, record: TagRecord },
    WriteFailed(String),
    WipeCompleted,
    WipeTimedOut,
    WifiConfigured,
    WifiConfigFailed(String),
    UpdateInstalled,
    UpdateFailed(String),
    /// The device dropped the link after an OTA update was started.
    UpdateRebooting,
    Aborted {
        operation: OperationKind,
        reason: String,
    },
    Cancelled(OperationKind),
    /// The device itself announced a newer firmware.
    DeviceUpdateAvailable { version: String, url: String },
    DeviceUpToDate,
    UpdateCheck(UpdateCheck),
    Diagnostic(String),
}

impl From<Outcome> for EngineEvent {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::ReadCompleted(result) => Self::ReadCompleted(result),
            Outcome::WriteCompleted { serial, record } => Self::WriteCompleted { serial, record },
            Outcome::WriteFailed(reason) => Self::WriteFailed(reason),
            Outcome::WipeCompleted => Self::WipeCompleted,
            Outcome::WifiConfigured => Self::WifiConfigured,
            Outcome::WifiConfigFailed(reason) => Self::WifiConfigFailed(reason),
            Outcome::UpdateInstalled => Self::UpdateInstalled,
            Outcome::UpdateFailed(reason) => Self::UpdateFailed(reason),
        }
    }
}

/// Update the user can install with [`ProtocolEngine::install_update`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub version: String,
    pub url: String,
}

/// Owns the session and at most one active operation.
pub struct ProtocolEngine {
    session: TransportSession,
    active: Option<Operation>,
    last_write_completed: bool,
    firmware_version: Option<String>,
    pending_update: Option<PendingUpdate>,
    wipe_timeout: Duration,
}

impl ProtocolEngine {
    pub fn new(session: TransportSession) -> Self {
        Self {
            session,
            active: None,
            last_write_completed: false,
            firmware_version: None,
            pending_update: None,
            wipe_timeout: DEFAULT_WIPE_TIMEOUT,
        }
    }

    pub fn with_wipe_timeout(mut self, timeout: Duration) -> Self {
        self.wipe_timeout = timeout;
        self
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn generation(&self) -> u64 {
        self.session.generation()
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.firmware_version.as_deref()
    }

    pub fn pending_update(&self) -> Option<&PendingUpdate> {
        self.pending_update.as_ref()
    }

    pub fn active_operation(&self) -> Option<OperationKind> {
        self.active.as_ref().map(Operation::kind)
    }

    /// 0 when idle, 1-2 while writing, 3 after the last write completed.
    pub fn write_step(&self) -> WriteStep {
        match self.active.as_ref().and_then(Operation::write_step) {
            Some(step) => step,
            None if self.last_write_completed => WriteStep::Complete,
            None => WriteStep::Idle,
        }
    }

    /// Start looking for the programmer.
    pub fn start(&mut self) -> Vec<EngineEvent> {
        self.session
            .start()
            .into_iter()
            .flat_map(|event| self.on_session_event(event))
            .collect()
    }

    pub fn disconnect(&mut self) -> Vec<EngineEvent> {
        self.session
            .disconnect()
            .into_iter()
            .flat_map(|event| self.on_session_event(event))
            .collect()
    }

    /// Feed one driver event through the session and the active operation.
    pub fn handle_link_event(&mut self, event: LinkEvent) -> Vec<EngineEvent> {
        self.session
            .handle(event)
            .into_iter()
            .flat_map(|event| self.on_session_event(event))
            .collect()
    }

    pub fn read(&mut self) -> Result<(), EngineError> {
        self.begin(Command::Read, Operation::Read)
    }

    /// Encode and send a record for both tags. Returns the serial used.
    pub fn write_dual_tag<R: Registry>(
        &mut self,
        request: WriteRequest,
        allocator: &Allocator<R>,
    ) -> Result<Serial, EngineError> {
        self.ensure_idle()?;
        if !self.session.is_ready() {
            return Err(crate::error::TransportError::NotConnected.into());
        }

        let serial = match request.custom_serial.as_deref().map(str::trim) {
            Some(custom) => {
                let serial: Serial = custom
                    .parse()
                    .map_err(|_| EngineError::InvalidSerial(custom.to_string()))?;
                if !allocator.reserve_serial(serial)? {
                    warn!("Writing duplicate serial {}", serial);
                }
                serial
            }
            None => allocator.allocate_serial()?,
        };

        let record = TagRecord::new(
            request.date,
            request.vendor_id,
            request.batch,
            request.film_id,
            request.color,
            request.length_m,
            serial,
        );
        let encoded = tag::encode(&record)?;

        self.begin(
            Command::Write(encoded),
            Operation::WriteDualTag {
                step: WriteStep::AwaitingTag1,
                serial,
                record,
            },
        )?;
        info!("Writing serial {}: waiting for tag 1", serial);
        Ok(serial)
    }

    pub fn wipe(&mut self) -> Result<(), EngineError> {
        let deadline = Instant::now() + self.wipe_timeout;
        self.begin(Command::Wipe, Operation::Wipe { deadline })
    }

    pub fn wifi_config(&mut self, ssid: &str, password: &str) -> Result<(), EngineError> {
        if ssid.is_empty() || password.is_empty() {
            return Err(EngineError::InvalidArgument(
                "SSID and password are required".to_string(),
            ));
        }
        if ssid.contains(',') {
            return Err(EngineError::InvalidArgument(
                "SSID must not contain ','".to_string(),
            ));
        }

        self.begin(
            Command::WifiConfig {
                ssid: ssid.to_string(),
                password: password.to_string(),
            },
            Operation::WifiConfig,
        )
    }

    pub fn ota_update(&mut self, url: &str) -> Result<(), EngineError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(EngineError::InvalidArgument(
                "firmware URL is required".to_string(),
            ));
        }

        self.begin(
            Command::OtaUpdate {
                url: url.to_string(),
            },
            Operation::OtaUpdate {
                url: url.to_string(),
            },
        )
    }

    /// Start an OTA update with the last accepted update URL.
    pub fn install_update(&mut self) -> Result<(), EngineError> {
        let url = self
            .pending_update
            .as_ref()
            .map(|update| update.url.clone())
            .ok_or(EngineError::NoPendingUpdate)?;
        self.ota_update(&url)
    }

    /// Drop the active operation. The device is told on a best-effort basis.
    pub fn cancel(&mut self) -> Result<OperationKind, EngineError> {
        let operation = self.active.take().ok_or(EngineError::NothingToCancel)?;
        let kind = operation.kind();

        if let Err(e) = self.session.send(&Command::Cancel) {
            warn!("Could not tell the device to cancel: {}", e);
        }
        info!("Cancelled {}", kind);
        Ok(kind)
    }

    /// Accept an update check result if it belongs to the current connection.
    pub fn apply_update_check(
        &mut self,
        generation: u64,
        outcome: UpdateCheck,
    ) -> Option<EngineEvent> {
        if generation != self.session.generation() || !self.session.is_ready() {
            debug!(
                "Discarding update check from connection #{} (current #{})",
                generation,
                self.session.generation()
            );
            return None;
        }

        if let UpdateCheck::UpdateAvailable { version, url } = &outcome {
            self.pending_update = Some(PendingUpdate {
                version: version.clone(),
                url: url.clone(),
            });
        }
        Some(EngineEvent::UpdateCheck(outcome))
    }

    /// Expire operations that only end on a deadline.
    pub fn check_timeouts(&mut self, now: Instant) -> Vec<EngineEvent> {
        match &self.active {
            Some(Operation::Wipe { deadline }) if now >= *deadline => {
                warn!("Wipe timed out after {:?}", self.wipe_timeout);
                self.active = None;
                vec![EngineEvent::WipeTimedOut]
            }
            _ => Vec::new(),
        }
    }

    fn ensure_idle(&self) -> Result<(), EngineError> {
        match &self.active {
            Some(operation) => Err(EngineError::Busy(operation.kind())),
            None => Ok(()),
        }
    }

    fn begin(&mut self, command: Command, operation: Operation) -> Result<(), EngineError> {
        self.ensure_idle()?;
        self.session.send(&command)?;
        debug!("Started {}", operation.kind());
        self.last_write_completed = false;
        self.active = Some(operation);
        Ok(())
    }

    fn on_session_event(&mut self, event: SessionEvent) -> Vec<EngineEvent> {
        match event {
            SessionEvent::StateChanged(state) => {
                if state == ConnectionState::Idle {
                    self.firmware_version = None;
                    self.pending_update = None;
                }
                vec![EngineEvent::ConnectionChanged(state)]
            }
            SessionEvent::LinkLost(reason) => self.abort_active(&reason),
            SessionEvent::Message(message) => self.on_message(message),
        }
    }

    fn on_message(&mut self, message: DeviceMessage) -> Vec<EngineEvent> {
        match message {
            DeviceMessage::Version(version) => {
                info!("Firmware version: {}", version);
                self.firmware_version = Some(version.clone());
                return vec![EngineEvent::FirmwareVersion(version)];
            }
            DeviceMessage::Disconnected => return self.abort_active("device disconnected"),
            DeviceMessage::UpdateAvailable { version, url } => {
                self.pending_update = Some(PendingUpdate {
                    version: version.clone(),
                    url: url.clone(),
                });
                return vec![EngineEvent::DeviceUpdateAvailable { version, url }];
            }
            DeviceMessage::UpToDate => return vec![EngineEvent::DeviceUpToDate],
            DeviceMessage::Diagnostic(text) => {
                debug!("Device diagnostic: {}", text);
                return vec![EngineEvent::Diagnostic(text)];
            }
            _ => {}
        }

        let Some(operation) = self.active.take() else {
            debug!("Unsolicited message: {:?}", message);
            return Vec::new();
        };

        match operation.on_message(&message) {
            Transition::Ignore => {
                debug!("{} ignoring {:?}", operation.kind(), message);
                self.active = Some(operation);
                Vec::new()
            }
            Transition::Advance(next) => {
                let step = next.write_step().unwrap_or(WriteStep::Idle);
                info!("{} advanced to step {}", next.kind(), step.number());
                self.active = Some(next);
                vec![EngineEvent::WriteProgress(step)]
            }
            Transition::Finish(outcome) => {
                if matches!(outcome, Outcome::WriteCompleted { .. }) {
                    self.last_write_completed = true;
                }
                info!("{} finished: {:?}", operation.kind(), outcome);
                vec![outcome.into()]
            }
        }
    }

    /// End the active operation because the link went away.
    fn abort_active(&mut self, reason: &str) -> Vec<EngineEvent> {
        match self.active.take() {
            Some(Operation::OtaUpdate { .. }) => {
                info!("Device rebooting after firmware update");
                vec![EngineEvent::UpdateRebooting]
            }
            Some(operation) => {
                warn!("{} aborted: {}", operation.kind(), reason);
                vec![EngineEvent::Aborted {
                    operation: operation.kind(),
                    reason: reason.to_string(),
                }]
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::tests::MemoryRegistry;
    use crate::bluetooth::LinkCommand;
    use crate::error::TransportError;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn ready_engine() -> (ProtocolEngine, UnboundedReceiver<LinkCommand>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = ProtocolEngine::new(TransportSession::new(tx, "CFS-Programmer"));
        engine.start();
        engine.handle_link_event(LinkEvent::Discovered {
            address: "AA:BB:CC:DD:EE:FF".into(),
            name: Some("CFS-Programmer".into()),
        });
        engine.handle_link_event(LinkEvent::Connected);
        engine.handle_link_event(LinkEvent::EndpointsResolved);
        while rx.try_recv().is_ok() {}
        (engine, rx)
    }

    fn writes(rx: &mut UnboundedReceiver<LinkCommand>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            if let LinkCommand::Write(bytes) = cmd {
                out.push(String::from_utf8(bytes).unwrap());
            }
        }
        out
    }

    fn notify(engine: &mut ProtocolEngine, text: &str) -> Vec<EngineEvent> {
        engine.handle_link_event(LinkEvent::Notification(text.as_bytes().to_vec()))
    }

    fn allocator() -> Allocator<MemoryRegistry> {
        Allocator::with_seed(Arc::new(Mutex::new(MemoryRegistry::default())), 1)
    }

    fn request(custom_serial: Option<&str>) -> WriteRequest {
        WriteRequest {
            vendor_id: "0276".into(),
            batch: "A2".into(),
            film_id: 101001,
            color: TagColor::from_rgb(0xFF0000),
            length_m: 330,
            custom_serial: custom_serial.map(str::to_string),
            date: NaiveDate::from_ymd_opt(2025, 12, 26).unwrap(),
        }
    }

    #[test]
    fn test_version_is_stored() {
        let (mut engine, _rx) = ready_engine();
        assert_eq!(
            notify(&mut engine, "VERSION:1.3.0\0"),
            vec![EngineEvent::FirmwareVersion("1.3.0".into())]
        );
        assert_eq!(engine.firmware_version(), Some("1.3.0"));
    }

    #[test]
    fn test_read_blank() {
        let (mut engine, mut rx) = ready_engine();
        engine.read().unwrap();
        assert_eq!(writes(&mut rx), vec!["READ"]);
        assert_eq!(
            notify(&mut engine, "BLANK_TAG"),
            vec![EngineEvent::ReadCompleted(ReadResult::Blank)]
        );
        assert_eq!(engine.active_operation(), None);
    }

    #[test]
    fn test_busy_rejects_second_operation() {
        let (mut engine, mut rx) = ready_engine();
        engine.read().unwrap();
        assert_eq!(engine.wipe(), Err(EngineError::Busy(OperationKind::Read)));
        assert_eq!(writes(&mut rx), vec!["READ"]);
    }

    #[test]
    fn test_not_connected() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut engine = ProtocolEngine::new(TransportSession::new(tx, "CFS-Programmer"));
        assert_eq!(
            engine.read(),
            Err(EngineError::Transport(TransportError::NotConnected))
        );
        assert_eq!(engine.active_operation(), None);

        let alloc = allocator();
        assert!(engine.write_dual_tag(request(None), &alloc).is_err());
        assert!(alloc.registry().lock().used_serials.is_empty());
    }

    #[test]
    fn test_dual_tag_write() {
        let (mut engine, mut rx) = ready_engine();
        let alloc = allocator();

        let serial = engine.write_dual_tag(request(None), &alloc).unwrap();
        assert_eq!(engine.write_step(), WriteStep::AwaitingTag1);

        let sent = writes(&mut rx);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("WRITE:C26250276A2101001"));
        assert_eq!(sent[0].len(), "WRITE:".len() + 48);
        assert!(sent[0].contains(&serial.to_string()));

        assert_eq!(
            notify(&mut engine, "TAG1_WRITTEN"),
            vec![EngineEvent::WriteProgress(WriteStep::AwaitingTag2)]
        );
        let events = notify(&mut engine, "TAG2_WRITTEN");
        assert!(matches!(
            &events[..],
            [EngineEvent::WriteCompleted { serial: s, .. }] if *s == serial
        ));
        assert_eq!(engine.write_step(), WriteStep::Complete);
    }

    #[test]
    fn test_write_custom_serial() {
        let (mut engine, mut rx) = ready_engine();
        let alloc = allocator();

        let serial = engine
            .write_dual_tag(request(Some("000042")), &alloc)
            .unwrap();
        assert_eq!(serial.to_string(), "000042");
        assert!(writes(&mut rx)[0].contains("000042"));
        assert!(alloc.registry().lock().used_serials.contains(&42));
    }

    #[test]
    fn test_write_rejects_bad_serial() {
        let (mut engine, mut rx) = ready_engine();
        assert_eq!(
            engine.write_dual_tag(request(Some("12a456")), &allocator()),
            Err(EngineError::InvalidSerial("12a456".into()))
        );
        assert!(writes(&mut rx).is_empty());
        assert_eq!(engine.write_step(), WriteStep::Idle);
    }

    #[test]
    fn test_write_error_resets() {
        let (mut engine, _rx) = ready_engine();
        engine.write_dual_tag(request(None), &allocator()).unwrap();
        notify(&mut engine, "TAG1_WRITTEN");
        assert_eq!(
            notify(&mut engine, "ERROR:Tag 2 write failed"),
            vec![EngineEvent::WriteFailed("Tag 2 write failed".into())]
        );
        assert_eq!(engine.write_step(), WriteStep::Idle);
    }

    #[test]
    fn test_cancel_write() {
        let (mut engine, mut rx) = ready_engine();
        engine.write_dual_tag(request(None), &allocator()).unwrap();
        notify(&mut engine, "TAG1_WRITTEN");
        writes(&mut rx);

        assert_eq!(engine.cancel(), Ok(OperationKind::Write));
        assert_eq!(writes(&mut rx), vec!["CANCEL"]);
        assert_eq!(engine.write_step(), WriteStep::Idle);
        assert_eq!(engine.cancel(), Err(EngineError::NothingToCancel));

        // A late ack is ignored.
        assert!(notify(&mut engine, "TAG2_WRITTEN").is_empty());
    }

    #[test]
    fn test_wipe_timeout() {
        let (mut engine, _rx) = ready_engine();
        engine.wipe().unwrap();
        assert!(engine.check_timeouts(Instant::now()).is_empty());
        assert_eq!(
            engine.check_timeouts(Instant::now() + Duration::from_secs(16)),
            vec![EngineEvent::WipeTimedOut]
        );
        assert_eq!(engine.active_operation(), None);
    }

    #[test]
    fn test_wifi_validation() {
        let (mut engine, mut rx) = ready_engine();
        assert!(matches!(
            engine.wifi_config("my,net", "pw"),
            Err(EngineError::InvalidArgument(_))
        ));
        assert!(matches!(
            engine.wifi_config("net", ""),
            Err(EngineError::InvalidArgument(_))
        ));
        engine.wifi_config("home", "secret").unwrap();
        assert_eq!(writes(&mut rx), vec!["WIFI_CONFIG:home,secret"]);
        assert_eq!(
            notify(&mut engine, "ERROR:Bad password"),
            vec![EngineEvent::WifiConfigFailed("Bad password".into())]
        );
    }

    #[test]
    fn test_disconnect_aborts_operation() {
        let (mut engine, _rx) = ready_engine();
        engine.read().unwrap();
        let events = engine.handle_link_event(LinkEvent::Disconnected("gone".into()));
        assert!(events.contains(&EngineEvent::Aborted {
            operation: OperationKind::Read,
            reason: "gone".into()
        }));
        assert_eq!(engine.connection_state(), ConnectionState::Scanning);
        assert_eq!(engine.active_operation(), None);
    }

    #[test]
    fn test_device_disconnect_message_during_ota() {
        let (mut engine, _rx) = ready_engine();
        engine.ota_update("https://x/fw.bin").unwrap();
        assert_eq!(
            notify(&mut engine, "DISCONNECTED"),
            vec![EngineEvent::UpdateRebooting]
        );
    }

    #[test]
    fn test_version_does_not_disturb_operation() {
        let (mut engine, _rx) = ready_engine();
        engine.wipe().unwrap();
        notify(&mut engine, "VERSION:1.3.0");
        assert_eq!(engine.active_operation(), Some(OperationKind::Wipe));
    }

    #[test]
    fn test_stale_update_check_discarded() {
        let (mut engine, _rx) = ready_engine();
        let generation = engine.generation();
        engine.handle_link_event(LinkEvent::Disconnected("gone".into()));

        let outcome = UpdateCheck::UpdateAvailable {
            version: "1.4.0".into(),
            url: "https://x/fw.bin".into(),
        };
        assert_eq!(engine.apply_update_check(generation, outcome.clone()), None);
        assert_eq!(engine.pending_update(), None);
        assert_eq!(engine.install_update(), Err(EngineError::NoPendingUpdate));
    }

    #[test]
    fn test_install_update_uses_checked_url() {
        let (mut engine, mut rx) = ready_engine();
        let outcome = UpdateCheck::UpdateAvailable {
            version: "1.4.0".into(),
            url: "https://x/fw.bin".into(),
        };
        assert!(engine
            .apply_update_check(engine.generation(), outcome)
            .is_some());
        engine.install_update().unwrap();
        assert_eq!(writes(&mut rx), vec!["OTA_UPDATE:https://x/fw.bin"]);
        assert_eq!(
            notify(&mut engine, "UPDATE_SUCCESS"),
            vec![EngineEvent::UpdateInstalled]
        );
    }

    #[test]
    fn test_read_valid_tag() {
        let (mut engine, mut rx) = ready_engine();
        engine.read().unwrap();
        assert_eq!(writes(&mut rx), vec!["READ"]);
        assert_eq!(
            notify(&mut engine, "TAG_DATA:PLA|165m|#FFFFFF|S/N:000123"),
            vec![EngineEvent::ReadCompleted(ReadResult::Valid(
                crate::bluetooth::TagInfo {
                    material: "PLA".into(),
                    length: "165m".into(),
                    color: "FFFFFF".into(),
                    serial: "000123".into(),
                }
            ))]
        );
        assert_eq!(engine.active_operation(), None);
    }

    #[test]
    fn test_dual_tag_write_with_text_acks() {
        let (mut engine, mut rx) = ready_engine();
        let alloc = allocator();

        let serial = engine.write_dual_tag(request(None), &alloc).unwrap();
        assert!((100_000..=999_999).contains(&serial.value()));
        assert!(alloc.registry().lock().used_serials.contains(&serial.value()));
        writes(&mut rx);

        assert_eq!(
            notify(&mut engine, "Tag 1 written, place Tag 2"),
            vec![EngineEvent::WriteProgress(WriteStep::AwaitingTag2)]
        );
        let events = notify(&mut engine, "WRITE_COMPLETE");
        assert!(matches!(
            &events[..],
            [EngineEvent::WriteCompleted { serial: s, .. }] if *s == serial
        ));
        assert_eq!(engine.active_operation(), None);
        assert_eq!(engine.write_step(), WriteStep::Complete);
    }

    #[test]
    fn test_next_operation_resets_write_step() {
        let (mut engine, _rx) = ready_engine();
        engine.write_dual_tag(request(None), &allocator()).unwrap();
        notify(&mut engine, "TAG1_WRITTEN");
        notify(&mut engine, "TAG2_WRITTEN");
        assert_eq!(engine.write_step(), WriteStep::Complete);

        engine.wipe().unwrap();
        assert_eq!(engine.write_step(), WriteStep::Idle);
        notify(&mut engine, "WIPE_OK");
        assert_eq!(engine.write_step(), WriteStep::Idle);
    }

    #[test]
    fn test_disconnect_while_scanning() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut engine = ProtocolEngine::new(TransportSession::new(tx, "CFS-Programmer"));
        engine.start();
        assert_eq!(
            engine.disconnect(),
            vec![EngineEvent::ConnectionChanged(ConnectionState::Idle)]
        );
        while rx.try_recv().is_ok() {}

        assert_eq!(
            engine.start(),
            vec![EngineEvent::ConnectionChanged(ConnectionState::Scanning)]
        );
        assert_eq!(rx.try_recv(), Ok(LinkCommand::StartScan));
    }
}
