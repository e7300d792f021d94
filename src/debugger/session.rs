//! The emulator side of a debug session.
//!
//! Hosts wrap their CPU/memory emulator in [`Emulator`] and forward its
//! breakpoint and close callbacks to
//! [`DebugContext::breakpoint_hit`](super::DebugContext::breakpoint_hit) and
//! [`DebugContext::emulator_closed`](super::DebugContext::emulator_closed).

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageKind {
    Flash,
    Ram,
}

/// A 16KB page of Flash or RAM as mapped into one of the four banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalPage {
    pub index: u8,
    pub kind: PageKind,
}

impl PhysicalPage {
    pub fn flash(index: u8) -> Self {
        Self {
            index,
            kind: PageKind::Flash,
        }
    }

    pub fn ram(index: u8) -> Self {
        Self {
            index,
            kind: PageKind::Ram,
        }
    }

    pub fn is_flash(&self) -> bool {
        self.kind == PageKind::Flash
    }
}

/// Register file snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers {
    pub af: u16,
    pub bc: u16,
    pub de: u16,
    pub hl: u16,
    pub ix: u16,
    pub iy: u16,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    pub fn a(&self) -> u8 {
        (self.af >> 8) as u8
    }

    pub fn f(&self) -> u8 {
        self.af as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BreakpointHandle(pub u32);

/// A breakpoint as installed in the emulator. The emulator owns it; the
/// engine keeps a copy to clear it and to classify hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeBreakpoint {
    pub handle: BreakpointHandle,
    pub address: u16,
    pub page: PhysicalPage,
}

impl NativeBreakpoint {
    /// Same address on the same physical page.
    pub fn same_location(&self, other: &NativeBreakpoint) -> bool {
        self.address == other.address && self.page == other.page
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CalcModel {
    Ti73,
    Ti81,
    Ti82,
    Ti83,
    Ti83Plus,
    Ti83PlusSe,
    Ti84Plus,
    Ti84PlusSe,
    Ti85,
    Ti86,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalcKey {
    On,
}

/// A Flash application installed on the calculator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    pub name: String,
    pub page: u8,
}

pub trait Emulator {
    fn load_file(&mut self, path: &Path) -> io::Result<()>;
    /// Execute a single instruction.
    fn step(&mut self);
    fn is_running(&self) -> bool;
    fn set_running(&mut self, running: bool);

    fn registers(&self) -> Registers;
    fn set_pc(&mut self, pc: u16);
    fn set_halted(&mut self, halted: bool);

    fn read_byte(&self, address: u16) -> u8;

    fn read_word(&self, address: u16) -> u16 {
        let lo = self.read_byte(address) as u16;
        let hi = self.read_byte(address.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// The page currently mapped into `bank` (0..4).
    fn bank(&self, bank: usize) -> PhysicalPage;
    fn set_bank(&mut self, bank: usize, page: PhysicalPage);

    /// Read from a Flash page regardless of the bank mapping. `address` is
    /// interpreted within the page.
    fn read_flash_byte(&self, page: u8, address: u16) -> u8;

    fn read_flash_word(&self, page: u8, address: u16) -> u16 {
        let lo = self.read_flash_byte(page, address) as u16;
        let hi = self.read_flash_byte(page, address.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write(&mut self, is_ram: bool, page: u8, address: u16, data: &[u8]);

    fn set_breakpoint(&mut self, is_ram: bool, page: u8, address: u16) -> NativeBreakpoint;
    fn clear_breakpoint(&mut self, breakpoint: &NativeBreakpoint);

    fn model(&self) -> CalcModel;
    fn apps(&self) -> Vec<Application>;

    fn press_key(&mut self, key: CalcKey);
    fn release_key(&mut self, key: CalcKey);

    /// Tear down the emulator side of the session.
    fn cancel_debug(&mut self);
}
