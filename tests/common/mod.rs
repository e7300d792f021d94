// Shared fixtures: a scripted emulator and an in-memory listing.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use calc_debugger::debugger::{
    Application, BreakpointHandle, CalcKey, CalcModel, DebugContext, Emulator, NativeBreakpoint,
    PhysicalPage, Registers, BCALL_DEL_MEM, BCALL_INSERT_MEM, BCALL_JFORCE_CMD_NO_CHAR,
};
use calc_debugger::symbols::{CalcLocation, DocumentLocation, LineReader, SymbolService};
use calc_debugger::DebuggerConfig;

pub const PROGRAM_START: u16 = 0x9D95;
pub const JFORCE_ADDR: u16 = 0x5A10;
pub const INSERT_MEM_ADDR: u16 = 0x6B20;
pub const DEL_MEM_ADDR: u16 = 0x6C30;
pub const OS_PAGE: u8 = 0x1C;

pub struct MockEmulator {
    pub memory: Vec<u8>,
    pub flash: HashMap<u8, Vec<u8>>,
    pub banks: [PhysicalPage; 4],
    pub regs: Registers,
    pub running: bool,
    pub halted: bool,
    pub breakpoints: Vec<NativeBreakpoint>,
    pub model: CalcModel,
    pub apps: Vec<Application>,
    pub writes: Vec<(bool, u8, u16, Vec<u8>)>,
    pub keys: Vec<(CalcKey, bool)>,
    /// PCs the next steps land on; an empty script advances PC by one.
    pub script: VecDeque<u16>,
    pub steps: usize,
    pub loaded: Option<PathBuf>,
    next_handle: u32,
}

impl MockEmulator {
    /// A TI-83+ with the OS vectors for the hooked bcalls filled in.
    pub fn new() -> Self {
        let mut emu = Self {
            memory: vec![0; 0x10000],
            flash: HashMap::new(),
            banks: [
                PhysicalPage::flash(0),
                PhysicalPage::flash(0x1F),
                PhysicalPage::ram(1),
                PhysicalPage::ram(0),
            ],
            regs: Registers {
                sp: 0xFFFF,
                pc: PROGRAM_START,
                ..Registers::default()
            },
            running: false,
            halted: false,
            breakpoints: Vec::new(),
            model: CalcModel::Ti83Plus,
            apps: Vec::new(),
            writes: Vec::new(),
            keys: Vec::new(),
            script: VecDeque::new(),
            steps: 0,
            loaded: None,
            next_handle: 1,
        };
        emu.install_vector(BCALL_JFORCE_CMD_NO_CHAR, JFORCE_ADDR, OS_PAGE);
        emu.install_vector(BCALL_INSERT_MEM, INSERT_MEM_ADDR, OS_PAGE);
        emu.install_vector(BCALL_DEL_MEM, DEL_MEM_ADDR, OS_PAGE);
        emu
    }

    /// Write a low-page bcall vector entry.
    pub fn install_vector(&mut self, bcall: u16, address: u16, page: u8) {
        let entry = ((bcall & 0x3FFF) as usize) & 0x3FFF;
        let table = self.flash.entry(0x1B).or_insert_with(|| vec![0; 0x4000]);
        table[entry] = address as u8;
        table[entry + 1] = (address >> 8) as u8;
        table[entry + 2] = page;
    }

    pub fn with_stack(mut self, sp: u16, words: &[u16]) -> Self {
        self.regs.sp = sp;
        for (i, word) in words.iter().enumerate() {
            let address = sp as usize + i * 2;
            self.memory[address] = *word as u8;
            self.memory[address + 1] = (*word >> 8) as u8;
        }
        self
    }

    pub fn at(mut self, pc: u16) -> Self {
        self.regs.pc = pc;
        self
    }

    pub fn native_at(&self, address: u16) -> Option<NativeBreakpoint> {
        self.breakpoints.iter().copied().find(|bp| bp.address == address)
    }
}

impl Emulator for MockEmulator {
    fn load_file(&mut self, path: &Path) -> io::Result<()> {
        self.loaded = Some(path.to_path_buf());
        Ok(())
    }

    fn step(&mut self) {
        self.steps += 1;
        self.regs.pc = match self.script.pop_front() {
            Some(pc) => pc,
            None => self.regs.pc.wrapping_add(1),
        };
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    fn registers(&self) -> Registers {
        self.regs
    }

    fn set_pc(&mut self, pc: u16) {
        self.regs.pc = pc;
    }

    fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    fn read_byte(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn bank(&self, bank: usize) -> PhysicalPage {
        self.banks[bank]
    }

    fn set_bank(&mut self, bank: usize, page: PhysicalPage) {
        self.banks[bank] = page;
    }

    fn read_flash_byte(&self, page: u8, address: u16) -> u8 {
        self.flash
            .get(&page)
            .map_or(0, |data| data[(address & 0x3FFF) as usize])
    }

    fn write(&mut self, is_ram: bool, page: u8, address: u16, data: &[u8]) {
        self.writes.push((is_ram, page, address, data.to_vec()));
        let start = address as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    fn set_breakpoint(&mut self, is_ram: bool, page: u8, address: u16) -> NativeBreakpoint {
        let bp = NativeBreakpoint {
            handle: BreakpointHandle(self.next_handle),
            address,
            page: if is_ram {
                PhysicalPage::ram(page)
            } else {
                PhysicalPage::flash(page)
            },
        };
        self.next_handle += 1;
        self.breakpoints.push(bp);
        bp
    }

    fn clear_breakpoint(&mut self, breakpoint: &NativeBreakpoint) {
        self.breakpoints.retain(|bp| bp.handle != breakpoint.handle);
    }

    fn model(&self) -> CalcModel {
        self.model
    }

    fn apps(&self) -> Vec<Application> {
        self.apps.clone()
    }

    fn press_key(&mut self, key: CalcKey) {
        self.keys.push((key, true));
    }

    fn release_key(&mut self, key: CalcKey) {
        self.keys.push((key, false));
    }

    fn cancel_debug(&mut self) {
        self.running = false;
    }
}

/// Assembled source: which lines produced code and where.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    by_address: HashMap<(u8, u16, bool), DocumentLocation>,
    by_line: HashMap<(PathBuf, usize), CalcLocation>,
    text: HashMap<(PathBuf, usize), String>,
}

impl Listing {
    /// Lay out `lines` from `origin`, one entry per source line with the
    /// number of bytes it assembles to.
    pub fn file(mut self, file: &str, page: u8, is_ram: bool, origin: u16, lines: &[(&str, u16)]) -> Self {
        let mut address = origin;
        for (i, (text, size)) in lines.iter().enumerate() {
            let key = (PathBuf::from(file), i + 1);
            self.text.insert(key.clone(), text.to_string());
            if *size > 0 {
                let location = CalcLocation::new(address, page, is_ram);
                self.by_address
                    .insert((page, address, is_ram), DocumentLocation::new(file, i + 1));
                self.by_line.insert(key, location);
                address += size;
            }
        }
        self
    }

    /// Map an address to a line that has no code of its own.
    pub fn alias(mut self, file: &str, line: usize, page: u8, address: u16, is_ram: bool) -> Self {
        self.by_address
            .insert((page, address, is_ram), DocumentLocation::new(file, line));
        self
    }
}

impl SymbolService for Listing {
    fn file_location(&self, page: u8, address: u16, is_ram: bool) -> Option<DocumentLocation> {
        self.by_address.get(&(page, address, is_ram)).cloned()
    }

    fn calc_location(&self, file: &Path, line: usize) -> Option<CalcLocation> {
        self.by_line.get(&(file.to_path_buf(), line)).copied()
    }

    fn next_nearest_calc_location(&self, file: &Path, line: usize) -> Option<CalcLocation> {
        self.by_line
            .iter()
            .filter(|((f, l), _)| f == file && *l >= line)
            .min_by_key(|((_, l), _)| *l)
            .map(|(_, location)| *location)
    }
}

impl LineReader for Listing {
    fn line(&self, file: &Path, line: usize) -> Option<String> {
        self.text.get(&(file.to_path_buf(), line)).cloned()
    }
}

/// A RAM program:
///
/// ```text
///  1  ; demo          -
///  2  start:          -
///  3    ld a,5        9D95
///  4    call sub      9D97
///  5    jp nz,start   9D9A
///  6    ret           9D9D
///  7  sub:            -
///  8    inc a         9D9E
///  9    ret           9D9F
/// ```
pub fn program_listing() -> Listing {
    Listing::default().file(
        "main.z80",
        1,
        true,
        PROGRAM_START,
        &[
            ("; demo", 0),
            ("start:", 0),
            ("    ld a,5", 2),
            ("    call sub", 3),
            ("    jp nz,start", 3),
            ("    ret", 1),
            ("sub:", 0),
            ("    inc a", 1),
            ("    ret", 1),
        ],
    )
}

pub type TestContext = DebugContext<MockEmulator, Listing, Listing>;

pub fn test_config() -> DebuggerConfig {
    DebuggerConfig {
        pause_step_limit: 16,
        reset_power_delay_ms: 0,
        reset_key_hold_ms: 0,
        event_wait_ms: 10,
        breakpoints_file: None,
    }
}

pub fn new_context(listing: Listing) -> TestContext {
    DebugContext::new(listing.clone(), listing, test_config())
}

/// A context debugging `main.8xp` on a fresh mock.
pub fn program_session(emu: MockEmulator) -> TestContext {
    let mut ctx = new_context(program_listing());
    ctx.init_debugger(emu, Path::new("main.8xp"))
        .expect("init should succeed");
    ctx
}

pub fn main_file() -> PathBuf {
    PathBuf::from("main.z80")
}
