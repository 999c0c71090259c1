use log::{debug, info, trace};
use std::time::Duration;

use crate::bus::{Dcpu, Device, Register};
use crate::medium::{Medium, SECTORS_PER_DISK, SECTORS_PER_TRACK};

// Drive timing: the head seeks at 2.4ms per track traversed and transfers
// 512-word sectors at 30700 words per second.
const SEEK_MICROS_PER_TRACK: u64 = 2_400;
const SECTOR_TRANSFER_MICROS: u64 = 16_678;

/// Externally visible drive states, as reported to the CPU by PollDevice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DriveState {
    NoMedia = 0x0000,
    Ready = 0x0001,
    ReadyWp = 0x0002,
    Busy = 0x0003,
}

/// Drive fault codes, as reported to the CPU by PollDevice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum DriveError {
    None = 0x0000,
    Busy = 0x0001,
    NoMedia = 0x0002,
    Protected = 0x0003,
    Eject = 0x0004,
    BadSector = 0x0005,
    /// Reserved for hardware faults; never raised by this implementation.
    Broken = 0xffff,
}

/// Interrupt operations, dispatched on register A. Unknown selectors must
/// stay silent no-ops so that programs written for later hardware revisions
/// degrade gracefully.
enum DriveOperation {
    PollDevice,
    SetInterrupt,
    ReadSector,
    WriteSector,
    Unknown,
}

impl From<u16> for DriveOperation {
    fn from(selector: u16) -> Self {
        match selector {
            0x0000 => DriveOperation::PollDevice,
            0x0001 => DriveOperation::SetInterrupt,
            0x0002 => DriveOperation::ReadSector,
            0x0003 => DriveOperation::WriteSector,
            _ => DriveOperation::Unknown,
        }
    }
}

/// Direction of an in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    Read,
    Write,
}

/// Progress of an in-flight transfer. The phase boundaries are the two
/// re-validation checkpoints: an eject or a bad sector is only ever observed
/// when a phase deadline expires, never mid-phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferPhase {
    /// Head moving to the target track.
    Seeking { target_track: u16 },
    /// Sector passing under the head.
    Transferring,
}

/// An accepted sector transfer making its way through the delay sequence.
#[derive(Debug, Clone, Copy)]
struct Transfer {
    kind: TransferKind,
    sector: u16,
    address: u16,
    phase: TransferPhase,
    due: Duration,
}

/// A Mackapar M35FD floppy drive.
///
/// Bus operations arrive through [`Device::handle_interrupt`]; accepted
/// transfers then make progress whenever the host pump hands the drive the
/// current time via [`M35fd::tick`]. Exactly one transfer can be in flight,
/// enforced purely through the state field.
pub struct M35fd {
    medium: Option<Medium>,
    state: DriveState,
    last_error: DriveError,
    interrupt_message: u16,
    current_track: u16,
    transfer: Option<Transfer>,
    now: Duration,
}

impl M35fd {
    pub fn new() -> Self {
        M35fd {
            medium: None,
            state: DriveState::NoMedia,
            last_error: DriveError::None,
            interrupt_message: 0,
            current_track: 0,
            transfer: None,
            now: Duration::ZERO,
        }
    }

    /// Current state code.
    pub fn state(&self) -> DriveState {
        self.state
    }

    /// Last fault code (cleared by PollDevice).
    pub fn last_error(&self) -> DriveError {
        self.last_error
    }

    /// The inserted medium, if any.
    pub fn medium(&self) -> Option<&Medium> {
        self.medium.as_ref()
    }

    /// Mutable access to the inserted medium, e.g. to flip its
    /// write-protect tab in place.
    pub fn medium_mut(&mut self) -> Option<&mut Medium> {
        self.medium.as_mut()
    }

    /// Insert a medium. Fails, handing the medium back, while a transfer is
    /// in flight; otherwise returns the previously inserted medium, if any.
    pub fn insert(
        &mut self,
        medium: Medium,
        cpu: &mut dyn Dcpu,
    ) -> Result<Option<Medium>, Medium> {
        if self.state == DriveState::Busy {
            return Err(medium);
        }
        info!("Inserted disk '{}'.", medium.label());
        let state = if medium.is_write_protected() {
            DriveState::ReadyWp
        } else {
            DriveState::Ready
        };
        let previous = self.medium.replace(medium);
        self.set_error_or_state(None, Some(state), cpu);
        Ok(previous)
    }

    /// Eject the medium, if any. Never refused: ejecting mid-transfer
    /// invalidates the in-flight operation's target, which then aborts with
    /// `Eject` at its next checkpoint.
    pub fn eject(&mut self, cpu: &mut dyn Dcpu) -> Option<Medium> {
        let medium = self.medium.take();
        if let Some(medium) = &medium {
            info!("Ejected disk '{}'.", medium.label());
        }
        self.set_error_or_state(None, Some(DriveState::NoMedia), cpu);
        medium
    }

    /// Hand the drive the current time and let any in-flight transfer make
    /// progress. A single late call clears expired phases in order; the
    /// checkpoint sequence is never skipped.
    pub fn tick(&mut self, now: Duration, cpu: &mut dyn Dcpu) {
        self.now = now;
        while self.step(cpu) {}
    }

    /// Advance the in-flight transfer through at most one expired phase.
    /// Returns whether progress was made.
    fn step(&mut self, cpu: &mut dyn Dcpu) -> bool {
        let transfer = match self.transfer {
            Some(transfer) if self.now >= transfer.due => transfer,
            _ => return false,
        };

        match transfer.phase {
            TransferPhase::Seeking { target_track } => {
                if self.transfer_ok_to_continue(transfer.sector, cpu) {
                    self.current_track = target_track;
                    self.transfer = Some(Transfer {
                        phase: TransferPhase::Transferring,
                        due: transfer.due + Duration::from_micros(SECTOR_TRANSFER_MICROS),
                        ..transfer
                    });
                } else {
                    self.finish_transfer(cpu);
                }
            }
            TransferPhase::Transferring => {
                if self.transfer_ok_to_continue(transfer.sector, cpu) {
                    self.copy_sector(&transfer, cpu);
                }
                self.finish_transfer(cpu);
            }
        }
        true
    }

    /// Accept a transfer and start its delay sequence.
    fn begin_transfer(
        &mut self,
        kind: TransferKind,
        sector: u16,
        address: u16,
        cpu: &mut dyn Dcpu,
    ) {
        self.set_error_or_state(None, Some(DriveState::Busy), cpu);
        let target_track = sector / SECTORS_PER_TRACK;
        let distance = (i32::from(target_track) - i32::from(self.current_track)).unsigned_abs();
        let seek = Duration::from_micros(u64::from(distance) * SEEK_MICROS_PER_TRACK);
        debug!(
            "Accepted {:?} of sector {} at 0x{:04x}; seeking {} tracks.",
            kind, sector, address, distance
        );
        self.transfer = Some(Transfer {
            kind,
            sector,
            address,
            phase: TransferPhase::Seeking { target_track },
            due: self.now + seek,
        });
    }

    /// Checkpoint re-validation. On failure, records the fault and reports
    /// the transfer dead.
    fn transfer_ok_to_continue(&mut self, sector: u16, cpu: &mut dyn Dcpu) -> bool {
        if self.state == DriveState::NoMedia {
            self.set_error_or_state(Some(DriveError::Eject), None, cpu);
            return false;
        }
        if sector >= SECTORS_PER_DISK {
            self.set_error_or_state(Some(DriveError::BadSector), None, cpu);
            return false;
        }
        let medium = self.medium.as_ref().expect("busy drive with no medium");
        let bad = medium
            .is_bad_sector(sector)
            .expect("sector index already range-checked");
        if bad {
            self.set_error_or_state(Some(DriveError::BadSector), None, cpu);
            return false;
        }
        true
    }

    /// The word-for-word copy at the heart of a transfer. Runs only after
    /// both checkpoints have passed.
    fn copy_sector(&mut self, transfer: &Transfer, cpu: &mut dyn Dcpu) {
        let medium = self.medium.as_mut().expect("busy drive with no medium");
        let buffer = medium
            .sector_mut(transfer.sector)
            .expect("sector index already range-checked");
        match transfer.kind {
            TransferKind::Read => {
                for (offset, &word) in buffer.iter().enumerate() {
                    cpu.store(transfer.address.wrapping_add(offset as u16), word);
                }
            }
            TransferKind::Write => {
                for (offset, word) in buffer.iter_mut().enumerate() {
                    *word = cpu.load(transfer.address.wrapping_add(offset as u16));
                }
            }
        }
        debug!(
            "{:?} of sector {} at 0x{:04x} complete.",
            transfer.kind, transfer.sector, transfer.address
        );
    }

    /// Tear down the delay sequence and restore a ready state, unless
    /// something (an eject) already moved the drive out of Busy.
    fn finish_transfer(&mut self, cpu: &mut dyn Dcpu) {
        self.transfer = None;
        if self.state == DriveState::Busy {
            let medium = self.medium.as_ref().expect("busy drive with no medium");
            let state = if medium.is_write_protected() {
                DriveState::ReadyWp
            } else {
                DriveState::Ready
            };
            self.set_error_or_state(None, Some(state), cpu);
        }
    }

    /// The single choke point for state and error updates. Compares the new
    /// values against the current registers, fires at most one completion
    /// interrupt when an armed value actually changed, and records the new
    /// values in the same call.
    fn set_error_or_state(
        &mut self,
        error: Option<DriveError>,
        state: Option<DriveState>,
        cpu: &mut dyn Dcpu,
    ) {
        let changed = error.map_or(false, |error| error != self.last_error)
            || state.map_or(false, |state| state != self.state);
        let fire = self.interrupt_message != 0 && changed;

        if let Some(error) = error {
            self.last_error = error;
        }
        if let Some(state) = state {
            self.state = state;
        }

        if fire {
            trace!(
                "Signalling state {:?} / error {:?} with message 0x{:04x}.",
                self.state,
                self.last_error,
                self.interrupt_message
            );
            cpu.interrupt(self.interrupt_message);
        }
    }

    fn handle_poll_device(&mut self, cpu: &mut dyn Dcpu) {
        cpu.set_register(Register::B, self.state as u16);
        cpu.set_register(Register::C, self.last_error as u16);
        // The poll itself clears the fault; the clear is reportable like
        // any other error change.
        self.set_error_or_state(Some(DriveError::None), None, cpu);
    }

    fn handle_set_interrupt(&mut self, message: u16) {
        debug!("Completion interrupt message set to 0x{:04x}.", message);
        self.interrupt_message = message;
    }

    fn handle_read_sector(&mut self, sector: u16, address: u16, cpu: &mut dyn Dcpu) {
        match self.state {
            DriveState::Ready | DriveState::ReadyWp => {
                cpu.set_register(Register::B, 1);
                self.begin_transfer(TransferKind::Read, sector, address, cpu);
            }
            DriveState::NoMedia => {
                cpu.set_register(Register::B, 0);
                self.set_error_or_state(Some(DriveError::NoMedia), None, cpu);
            }
            DriveState::Busy => {
                cpu.set_register(Register::B, 0);
                self.set_error_or_state(Some(DriveError::Busy), None, cpu);
            }
        }
    }

    fn handle_write_sector(&mut self, sector: u16, address: u16, cpu: &mut dyn Dcpu) {
        match self.state {
            DriveState::Ready => {
                cpu.set_register(Register::B, 1);
                self.begin_transfer(TransferKind::Write, sector, address, cpu);
            }
            DriveState::ReadyWp => {
                cpu.set_register(Register::B, 0);
                self.set_error_or_state(Some(DriveError::Protected), None, cpu);
            }
            DriveState::NoMedia => {
                cpu.set_register(Register::B, 0);
                self.set_error_or_state(Some(DriveError::NoMedia), None, cpu);
            }
            DriveState::Busy => {
                cpu.set_register(Register::B, 0);
                self.set_error_or_state(Some(DriveError::Busy), None, cpu);
            }
        }
    }
}

impl Default for M35fd {
    fn default() -> Self {
        M35fd::new()
    }
}

impl Device for M35fd {
    fn friendly_name(&self) -> &'static str {
        "Mackapar 3.5\" Floppy Drive (M35FD)"
    }

    fn manufacturer_id(&self) -> u32 {
        0x1eb37e91 // Mackapar Media
    }

    fn device_id(&self) -> u32 {
        0x4fd524c5
    }

    fn version(&self) -> u16 {
        0x000b
    }

    fn handle_interrupt(&mut self, cpu: &mut dyn Dcpu) -> u32 {
        match DriveOperation::from(cpu.register(Register::A)) {
            DriveOperation::PollDevice => self.handle_poll_device(cpu),
            DriveOperation::SetInterrupt => {
                self.handle_set_interrupt(cpu.register(Register::X));
            }
            DriveOperation::ReadSector => {
                let sector = cpu.register(Register::X);
                let address = cpu.register(Register::Y);
                self.handle_read_sector(sector, address, cpu);
            }
            DriveOperation::WriteSector => {
                let sector = cpu.register(Register::X);
                let address = cpu.register(Register::Y);
                self.handle_write_sector(sector, address, cpu);
            }
            DriveOperation::Unknown => {}
        }
        0
    }
}
