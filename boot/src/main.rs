#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

//! Top-level wiring: the one `unsafe fn` handoff, the pure entry-decision
//! policy, and the super-loop that feeds received bytes to
//! [`lib_proto::Engine`]. Everything that can be unit-tested on the host
//! lives in `lib/proto`, `lib/ed25519`, `lib/crc32`, and `drv/flash`; this
//! crate is deliberately thin, and what little logic it does own (`pump`,
//! `policy::should_stay_resident`) is exercised here against a host-side
//! `UsbCollaborator` double rather than real silicon.

#[cfg(not(test))]
extern crate panic_halt;

#[cfg(not(test))]
mod handoff;
mod policy;

use abi::BoardConfig;
use drv_flash::NvmController;
use lib_proto::{Engine, Event, ReplySink};

#[cfg(not(test))]
use abi::DefaultBoard;
#[cfg(not(test))]
use cortex_m_rt::entry;

/// The external USB collaborator this crate wires against. Device
/// enumeration, CDC endpoint servicing, and clock/pin setup are all out of
/// scope for the core; this trait is the seam where a concrete USB driver
/// plugs in.
pub trait UsbCollaborator {
    /// Services the USB peripheral's pending work (handling SETUP packets,
    /// refilling endpoints). Called once per super-loop iteration.
    fn service_tick(&mut self);
    /// Dequeues one received byte if the host has sent one.
    fn rx_getchar(&mut self) -> Option<u8>;
    /// The most recent baud rate the host requested via `SET_LINE_CODING`.
    fn host_baud(&self) -> u32;
    /// Sends bytes to the host. Blocks only if the underlying TX buffer is
    /// momentarily full.
    fn tx_write(&mut self, bytes: &[u8]);
}

struct UsbReplySink<'a, U: UsbCollaborator>(&'a mut U);

impl<U: UsbCollaborator> ReplySink for UsbReplySink<'_, U> {
    fn send(&mut self, bytes: &[u8]) {
        self.0.tx_write(bytes);
    }
}

/// Drives one pass of the cooperative super-loop: service USB, try to
/// dequeue a byte, hand it to the engine if one arrived. Returns
/// [`Event::ReadyToJump`] exactly when the caller should hand off.
fn pump<U, B, C>(usb: &mut U, engine: &mut Engine<B, C>) -> Event
where
    U: UsbCollaborator,
    B: BoardConfig,
    C: NvmController,
{
    usb.service_tick();
    match usb.rx_getchar() {
        Some(byte) => {
            let mut sink = UsbReplySink(usb);
            engine.process_byte(byte, &mut sink)
        }
        None => Event::Continue,
    }
}

/// The reset-time sequencing shared by every board: read the valid marker,
/// decide whether to stay resident, and otherwise run the pump loop until a
/// `DONE` hands off. Generic over `UsbCollaborator`/`NvmController` so the
/// real entry point and the host-side tests below run the identical path;
/// only the concrete types differ.
#[cfg(not(test))]
fn run<U, B, C>(mut usb: U, ctrl: C) -> !
where
    U: UsbCollaborator,
    B: BoardConfig,
    C: NvmController,
{
    let mut engine: Engine<B, C> = Engine::new(ctrl);

    if !policy::should_stay_resident(usb.host_baud(), engine.valid_marker()) {
        // SAFETY: should_stay_resident returned false, so the valid marker
        // matched APP_VALID_MAGIC, which is only ever written by a
        // completed, signature-verified DONE.
        unsafe { handoff::jump_to_application::<B>() };
    }

    loop {
        if pump(&mut usb, &mut engine) == Event::ReadyToJump {
            // SAFETY: ReadyToJump is only returned immediately after the
            // same DONE-completion check above.
            unsafe { handoff::jump_to_application::<B>() };
        }
    }
}

/// Stand-in `UsbCollaborator` for boards without a wired-up USB driver crate
/// yet: never receives a byte, so the pump loop below just idles at `wfi`.
/// A concrete board-support crate supplies the real one.
#[cfg(not(test))]
struct NullUsb;

#[cfg(not(test))]
impl UsbCollaborator for NullUsb {
    fn service_tick(&mut self) {
        cortex_m::asm::wfi();
    }

    fn rx_getchar(&mut self) -> Option<u8> {
        None
    }

    fn host_baud(&self) -> u32 {
        0
    }

    fn tx_write(&mut self, _bytes: &[u8]) {}
}

/// Stand-in `NvmController` for boards without a wired-up flash driver crate
/// yet. Reads back as erased (`0xFF`), so the valid-marker check never
/// reports an application as present that isn't really there.
#[cfg(not(test))]
struct NullNvm;

#[cfg(not(test))]
impl NvmController for NullNvm {
    fn erase_row(&mut self, _addr: u32) {}

    fn program_page(&mut self, _addr: u32, _data: &[u8]) {}

    fn read(&mut self, _addr: u32, out: &mut [u8]) {
        out.fill(0xFF);
    }
}

#[cfg(not(test))]
#[entry]
fn main() -> ! {
    // Real hardware init (clocks, pins, the USB peripheral itself) is out of
    // scope for this core and lives in whatever board-support crate
    // supplies a concrete `UsbCollaborator` and `NvmController`; `NullUsb`/
    // `NullNvm` stand in until that crate is wired in, so the reset→policy→
    // pump-loop→handoff sequencing below runs for real rather than sitting
    // only in unit tests.
    run::<NullUsb, DefaultBoard, NullNvm>(NullUsb, NullNvm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use drv_flash::MockNvm;
    use std::collections::VecDeque;

    struct TestBoard;
    impl BoardConfig for TestBoard {
        const APP_START: u32 = 0x2000;
        const FLASH_SIZE: u32 = 0x3000;
        const TRUSTED_PUBKEY: [u8; 32] = [0u8; 32];
    }

    struct TestUsb {
        rx: VecDeque<u8>,
        tx: std::vec::Vec<u8>,
        baud: u32,
    }

    impl UsbCollaborator for TestUsb {
        fn service_tick(&mut self) {}

        fn rx_getchar(&mut self) -> Option<u8> {
            self.rx.pop_front()
        }

        fn host_baud(&self) -> u32 {
            self.baud
        }

        fn tx_write(&mut self, bytes: &[u8]) {
            self.tx.extend_from_slice(bytes);
        }
    }

    #[test]
    fn pump_with_no_pending_byte_is_a_no_op() {
        let mut usb = TestUsb { rx: VecDeque::new(), tx: std::vec::Vec::new(), baud: 115_200 };
        let mut engine: Engine<TestBoard, MockNvm> =
            Engine::new(MockNvm::new(TestBoard::FLASH_SIZE as usize));
        assert_eq!(pump(&mut usb, &mut engine), Event::Continue);
        assert!(usb.tx.is_empty());
    }

    #[test]
    fn pump_drains_one_byte_per_call_and_replies_on_newline() {
        let mut usb = TestUsb {
            rx: b"HELLO\n".iter().copied().collect(),
            tx: std::vec::Vec::new(),
            baud: 115_200,
        };
        let mut engine: Engine<TestBoard, MockNvm> =
            Engine::new(MockNvm::new(TestBoard::FLASH_SIZE as usize));

        for _ in 0.."HELLO\n".len() {
            pump(&mut usb, &mut engine);
        }

        assert_eq!(usb.tx, b"OK BOOT v1.0\n");
    }

    #[test]
    fn pump_reports_ready_to_jump_only_after_successful_done() {
        let mut usb = TestUsb {
            rx: b"DONE ".iter().copied().chain(core::iter::repeat(b'0').take(128)).chain([b'\n']).collect(),
            tx: std::vec::Vec::new(),
            baud: 115_200,
        };
        let mut engine: Engine<TestBoard, MockNvm> =
            Engine::new(MockNvm::new(TestBoard::FLASH_SIZE as usize));

        let mut last = Event::Continue;
        while !usb.rx.is_empty() {
            last = pump(&mut usb, &mut engine);
        }

        // An all-zero signature never verifies against any public key, so
        // this never reaches the jump.
        assert_eq!(last, Event::Continue);
        assert_eq!(usb.tx, b"ERR SIGNATURE\n");
    }
}
