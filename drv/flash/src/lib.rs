#![cfg_attr(not(test), no_std)]

//! Row/page-granular flash programming, built over an [`NvmController`]
//! that owns the actual register interface. Splitting the register-level
//! driver out from the command logic in `lib-proto` keeps the latter
//! testable on the host against [`MockNvm`] instead of real silicon.

use abi::{BoardConfig, APP_VALID_MAGIC, PAGE_SIZE, ROW_SIZE};

/// The target's NVM controller, reduced to the handful of blocking
/// operations the bootloader needs. A real implementation drives the
/// hardware's command register and polls its ready flag; [`MockNvm`] below
/// is a same-shaped in-memory stand-in for host tests.
pub trait NvmController {
    /// Erases the row starting at `addr`. `addr` is row-aligned.
    fn erase_row(&mut self, addr: u32);
    /// Programs one page's worth of data starting at `addr`. `addr` is
    /// page-aligned and `data.len() == PAGE_SIZE`.
    fn program_page(&mut self, addr: u32, data: &[u8]);
    /// Reads `len` bytes starting at `addr`, for verification and for the
    /// valid-marker check.
    fn read(&mut self, addr: u32, out: &mut [u8]);
}

#[derive(Debug, Eq, PartialEq)]
pub enum FlashError {
    /// The requested address/length wasn't aligned to the operation's
    /// granularity.
    Misaligned,
    /// The requested range falls outside the application region.
    OutOfRange,
}

/// Flash driver parameterized over a board's memory layout and a concrete
/// [`NvmController`].
pub struct Flash<B: BoardConfig, C: NvmController> {
    ctrl: C,
    _board: core::marker::PhantomData<B>,
}

impl<B: BoardConfig, C: NvmController> Flash<B, C> {
    pub fn new(ctrl: C) -> Self {
        Flash { ctrl, _board: core::marker::PhantomData }
    }

    /// Erases every row of the application region, `[APP_START,
    /// FLASH_SIZE)`. Called once per update session, before any WRITE.
    pub fn erase_application(&mut self) {
        let mut addr = B::APP_START;
        while addr < B::FLASH_SIZE {
            self.ctrl.erase_row(addr);
            addr += ROW_SIZE as u32;
        }
    }

    /// Programs one page. `addr` must be page-aligned and fall within the
    /// application region; `data` must be exactly `PAGE_SIZE` bytes.
    pub fn write_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        if data.len() != PAGE_SIZE {
            return Err(FlashError::Misaligned);
        }
        if addr % PAGE_SIZE as u32 != 0 {
            return Err(FlashError::Misaligned);
        }
        if addr < B::APP_START || addr.saturating_add(PAGE_SIZE as u32) > B::FLASH_SIZE {
            return Err(FlashError::OutOfRange);
        }
        self.ctrl.program_page(addr, data);
        Ok(())
    }

    /// Reads back `out.len()` bytes of the application region for CRC
    /// verification.
    pub fn read_application(&mut self, offset: u32, out: &mut [u8]) -> Result<(), FlashError> {
        let addr = B::APP_START.saturating_add(offset);
        if addr.saturating_add(out.len() as u32) > B::FLASH_SIZE {
            return Err(FlashError::OutOfRange);
        }
        self.ctrl.read(addr, out);
        Ok(())
    }

    /// Writes [`APP_VALID_MAGIC`] into the word immediately below
    /// `APP_START`. The bootloader's own jump-to-application check reads
    /// this word back; everything above it is the signed image.
    pub fn mark_application_valid(&mut self) {
        let addr = B::APP_START - 4;
        let magic = APP_VALID_MAGIC.to_le_bytes();
        // The marker lives at the tail of the last bootloader-region row,
        // which must already have been erased as part of that region's own
        // provisioning; this driver only ever erases the application
        // region, so it reads the current page, patches in the magic word,
        // and programs it back rather than assuming a fresh erase.
        let page_addr = addr - (addr % PAGE_SIZE as u32);
        let mut page = [0xFFu8; PAGE_SIZE];
        self.ctrl.read(page_addr, &mut page);
        let offset = (addr - page_addr) as usize;
        page[offset..offset + 4].copy_from_slice(&magic);
        self.ctrl.program_page(page_addr, &page);
    }

    /// Reads the valid-marker word back, for the boot-time decision of
    /// whether to jump to the application.
    pub fn read_valid_marker(&mut self) -> u32 {
        let addr = B::APP_START - 4;
        let mut bytes = [0u8; 4];
        self.ctrl.read(addr, &mut bytes);
        u32::from_le_bytes(bytes)
    }
}

/// An in-memory [`NvmController`] for host-side tests: erase sets bytes to
/// `0xFF` (matching real NOR/NVM erased state), program ANDs the written
/// bytes into place (a page can only clear bits until the next erase,
/// exactly like real flash).
#[cfg(test)]
pub struct MockNvm {
    pub memory: std::vec::Vec<u8>,
}

#[cfg(test)]
impl MockNvm {
    pub fn new(size: usize) -> Self {
        MockNvm { memory: std::vec![0xFFu8; size] }
    }
}

#[cfg(test)]
impl NvmController for MockNvm {
    fn erase_row(&mut self, addr: u32) {
        let start = addr as usize;
        for b in &mut self.memory[start..start + ROW_SIZE] {
            *b = 0xFF;
        }
    }

    fn program_page(&mut self, addr: u32, data: &[u8]) {
        let start = addr as usize;
        for (slot, &byte) in self.memory[start..start + data.len()].iter_mut().zip(data) {
            *slot &= byte;
        }
    }

    fn read(&mut self, addr: u32, out: &mut [u8]) {
        let start = addr as usize;
        out.copy_from_slice(&self.memory[start..start + out.len()]);
    }
}
