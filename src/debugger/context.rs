use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread;

use super::breakpoints::{Breakpoint, Breakpoints};
use super::events::{DebuggerEvent, EventBus};
use super::hooks::{HookKind, InternalBreakpoints, MemoryAllocations};
use super::paging::{is_ram_address, PageTranslator};
use super::session::{Application, CalcKey, Emulator, NativeBreakpoint, PhysicalPage};
use super::stack::{
    CallStack, CodeView, MachineStack, SourceStackWalker, StackSnapshot, StackWalker,
    APP_STACK_TOP, PROGRAM_STACK_TOP,
};
use super::stepping::TransientBreakpoint;
use crate::config::DebuggerConfig;
use crate::error::{DebuggerError, Result};
use crate::parser::read_app_name;
use crate::symbols::{CalcLocation, DocumentLocation, LineReader, SymbolService};

/// progToEdit: where `_ExecuteApp` looks for the app name.
const PROG_TO_EDIT: u16 = 0x84BF;
/// Scratch RAM the launch stub is written to.
const RAM_CODE: u16 = 0x8100;
/// bcall(_CloseEditBuf) \ bcall(_ExecuteApp)
const LAUNCH_APP_CODE: [u8; 6] = [0xEF, 0xD3, 0x48, 0xEF, 0x51, 0x4C];

/// A debug context shared between a front end and an emulator thread.
pub type SharedContext<E, S, R> = Arc<Mutex<DebugContext<E, S, R>>>;

/// Outcome of placing a breakpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Installed(CalcLocation),
    /// The line has no code. The breakpoint now lives at this location and
    /// has to be set again there.
    Relocated(DocumentLocation),
    /// No session; it will be installed when one starts.
    Deferred,
}

impl Placement {
    pub fn is_relocated(&self) -> bool {
        matches!(self, Placement::Relocated(_))
    }
}

/// The debugging engine for one emulator at a time.
pub struct DebugContext<E, S, R> {
    pub(super) emulator: Option<E>,
    pub(super) symbols: S,
    pub(super) reader: R,
    pub(super) config: DebuggerConfig,
    pub(super) paging: PageTranslator,
    pub(super) breakpoints: Breakpoints,
    pub(super) hooks: Option<InternalBreakpoints>,
    pub(super) allocations: MemoryAllocations,
    pub(super) transient: Option<TransientBreakpoint>,
    pub(super) stack: Arc<StackSnapshot>,
    pub(super) walker: Box<dyn StackWalker + Send>,
    pub(super) events: EventBus,
    pub(super) location: Option<DocumentLocation>,
}

/// The live session as seen by a stack walker.
struct SessionView<'a, E, S, R> {
    emulator: &'a E,
    paging: PageTranslator,
    symbols: &'a S,
    reader: &'a R,
}

impl<'a, E: Emulator, S: SymbolService, R: LineReader> CodeView for SessionView<'a, E, S, R> {
    fn is_app(&self) -> bool {
        self.paging.is_app()
    }

    fn relative_page(&self, address: u16) -> u8 {
        self.paging.relative_page(self.emulator, address)
    }

    fn file_location(&self, page: u8, address: u16, is_ram: bool) -> Option<DocumentLocation> {
        self.symbols.file_location(page, address, is_ram)
    }

    fn source_line(&self, location: &DocumentLocation) -> Option<String> {
        self.reader.line(&location.file, location.line)
    }
}

impl<E: Emulator, S: SymbolService, R: LineReader> DebugContext<E, S, R> {
    pub fn new(symbols: S, reader: R, config: DebuggerConfig) -> Self {
        Self {
            emulator: None,
            symbols,
            reader,
            config,
            paging: PageTranslator::default(),
            breakpoints: Breakpoints::new(),
            hooks: None,
            allocations: MemoryAllocations::default(),
            transient: None,
            stack: Arc::default(),
            walker: Box::new(SourceStackWalker),
            events: EventBus::default(),
            location: None,
        }
    }

    /// Replace the call stack heuristic.
    pub fn with_walker<W: StackWalker + Send + 'static>(mut self, walker: W) -> Self {
        self.walker = Box::new(walker);
        self
    }

    pub fn into_shared(self) -> SharedContext<E, S, R> {
        Arc::new(Mutex::new(self))
    }

    pub fn subscribe(&mut self) -> Receiver<DebuggerEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: DebuggerConfig) {
        self.config = config;
    }

    pub fn symbols(&self) -> &S {
        &self.symbols
    }

    pub fn emulator(&self) -> Option<&E> {
        self.emulator.as_ref()
    }

    pub fn emulator_mut(&mut self) -> Option<&mut E> {
        self.emulator.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.emulator.is_some()
    }

    pub fn is_app(&self) -> bool {
        self.paging.is_app()
    }

    pub fn app_page(&self) -> u8 {
        self.paging.app_page()
    }

    pub fn is_running(&self) -> bool {
        self.emulator.as_ref().map_or(false, |e| e.is_running())
    }

    pub fn breakpoints(&self) -> &Breakpoints {
        &self.breakpoints
    }

    pub fn breakpoint_mut(&mut self, file: &Path, line: usize) -> Option<&mut Breakpoint> {
        self.breakpoints.get_mut(file, line)
    }

    pub fn allocations(&self) -> &MemoryAllocations {
        &self.allocations
    }

    /// The stacks as of the last stop.
    pub fn stack(&self) -> Arc<StackSnapshot> {
        Arc::clone(&self.stack)
    }

    pub fn machine_stack(&self) -> &MachineStack {
        &self.stack.machine
    }

    pub fn call_stack(&self) -> &CallStack {
        &self.stack.calls
    }

    /// Where execution last stopped, if it is stopped on a source line.
    pub fn current_location(&self) -> Option<&DocumentLocation> {
        self.location.as_ref()
    }

    pub fn relative_page(&self, address: u16) -> Option<u8> {
        self.emulator
            .as_ref()
            .map(|e| self.paging.relative_page(e, address))
    }

    pub fn absolute_page(&self, address: u16) -> Option<u8> {
        self.emulator
            .as_ref()
            .map(|e| self.paging.absolute_page(e, address))
    }

    pub fn init_debugger(&mut self, mut emulator: E, output_file: &Path) -> Result<()> {
        if self.emulator.is_some() {
            self.cancel_debug();
        }

        emulator.load_file(output_file)?;
        let is_app = output_file
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("8xk"));

        self.paging = PageTranslator::new(is_app, 0);
        self.allocations.clear();
        self.stack = Arc::default();
        self.transient = None;
        self.location = None;
        for bp in self.breakpoints.iter_mut() {
            bp.native = None;
            bp.hits = 0;
        }

        match InternalBreakpoints::install(&mut emulator) {
            Ok(hooks) => self.hooks = Some(hooks),
            Err(err) => {
                log::error!("unable to set up internal breakpoints: {}", err);
                emulator.cancel_debug();
                return Err(err);
            }
        }

        log::info!(
            "debugging {} ({})",
            output_file.display(),
            if is_app { "app" } else { "program" }
        );
        self.emulator = Some(emulator);
        Ok(())
    }

    /// End the session. Transient breakpoints go away with the emulator.
    pub fn cancel_debug(&mut self) {
        self.paging = PageTranslator::default();
        self.transient = None;
        self.hooks = None;
        for bp in self.breakpoints.iter_mut() {
            bp.native = None;
        }

        if let Some(mut emulator) = self.emulator.take() {
            log::info!("debug session cancelled");
            emulator.cancel_debug();
        }
    }

    /// Emulator close callback.
    pub fn emulator_closed(&mut self) {
        log::info!("emulator closed");
        self.events.emit(DebuggerEvent::Closed);
    }

    /// Resolve `(file, line)` and install it. The breakpoint is added to the
    /// registry if it isn't there yet.
    pub fn set_breakpoint(&mut self, file: &Path, line: usize) -> Result<Placement> {
        self.breakpoints.add(file, line);
        let emulator = match self.emulator.as_mut() {
            Some(emulator) => emulator,
            None => return Ok(Placement::Deferred),
        };

        let location = match self.symbols.calc_location(file, line) {
            Some(location) => location,
            None => {
                let next = self
                    .symbols
                    .next_nearest_calc_location(file, line)
                    .ok_or_else(|| DebuggerError::NoCode {
                        file: file.to_path_buf(),
                        line,
                    })?;
                let moved = self
                    .symbols
                    .file_location(next.page, next.address, next.is_ram)
                    .ok_or(DebuggerError::Unresolved {
                        page: next.page,
                        address: next.address,
                        is_ram: next.is_ram,
                    })?;
                log::debug!(
                    "no code at {}:{}, breakpoint moved to {}",
                    file.display(),
                    line,
                    moved
                );
                if let Some(old) = self.breakpoints.get_mut(file, line).and_then(|bp| bp.native.take()) {
                    emulator.clear_breakpoint(&old);
                }
                self.breakpoints.relocate(file, line, &moved);
                return Ok(Placement::Relocated(moved));
            }
        };

        let page = self.paging.absolute(location.page, location.is_ram);
        if let Some(bp) = self.breakpoints.get_mut(file, line) {
            if let Some(old) = bp.native.take() {
                emulator.clear_breakpoint(&old);
            }
            bp.resolved_to(location);
            bp.native = Some(emulator.set_breakpoint(location.is_ram, page, location.address));
            log::debug!(
                "breakpoint {}:{} installed at {:04x} page {:02x}",
                file.display(),
                line,
                location.address,
                page
            );
        }
        Ok(Placement::Installed(location))
    }

    /// Uninstall without forgetting the breakpoint.
    pub fn clear_breakpoint(&mut self, file: &Path, line: usize) {
        let native = match self.breakpoints.get_mut(file, line) {
            Some(bp) => bp.native.take(),
            None => None,
        };
        if let (Some(native), Some(emulator)) = (native, self.emulator.as_mut()) {
            emulator.clear_breakpoint(&native);
        }
    }

    pub fn remove_breakpoint(&mut self, file: &Path, line: usize) -> Option<Breakpoint> {
        self.clear_breakpoint(file, line);
        self.breakpoints.remove(file, line)
    }

    /// Turn a breakpoint on or off. Disabled breakpoints stay installed so
    /// their hits keep counting.
    pub fn set_breakpoint_enabled(&mut self, file: &Path, line: usize, enabled: bool) -> Result<Placement> {
        match self.breakpoints.get_mut(file, line) {
            Some(bp) => bp.enabled = enabled,
            None => {
                return Err(DebuggerError::NoCode {
                    file: file.to_path_buf(),
                    line,
                })
            }
        }
        self.set_breakpoint(file, line)
    }

    /// Install every breakpoint, following relocations once.
    /// Returns the (original, new) locations of moved breakpoints.
    pub fn install_breakpoints(&mut self) -> Result<Vec<(DocumentLocation, DocumentLocation)>> {
        let mut moved = Vec::new();
        if self.emulator.is_none() {
            return Ok(moved);
        }

        let locations: Vec<DocumentLocation> = self
            .breakpoints
            .iter()
            .map(|bp| bp.location())
            .collect();
        for location in locations {
            match self.set_breakpoint(&location.file, location.line) {
                Ok(Placement::Relocated(to)) => {
                    if let Err(err) = self.set_breakpoint(&to.file, to.line) {
                        log::warn!("breakpoint {} not installed: {}", to, err);
                    }
                    moved.push((location, to));
                }
                Ok(_) => {}
                Err(err) => log::warn!("breakpoint {} not installed: {}", location, err),
            }
        }
        Ok(moved)
    }

    pub fn save_breakpoints(&self, path: &Path) -> Result<()> {
        self.breakpoints.save(path)
    }

    /// Replace the registry with breakpoints loaded from disk, installing
    /// them if a session is active.
    pub fn load_breakpoints(&mut self, path: &Path) -> Result<Vec<(DocumentLocation, DocumentLocation)>> {
        let loaded = Breakpoints::load(path)?;
        let existing: Vec<DocumentLocation> = self.breakpoints.iter().map(|bp| bp.location()).collect();
        for location in existing {
            self.clear_breakpoint(&location.file, location.line);
        }
        self.breakpoints = loaded;
        self.install_breakpoints()
    }

    /// Emulator breakpoint callback.
    pub fn breakpoint_hit(&mut self, hit: NativeBreakpoint) -> Result<()> {
        let emulator = match self.emulator.as_mut() {
            Some(emulator) => emulator,
            None => return Ok(()),
        };

        if let Some(kind) = self.hooks.as_ref().and_then(|hooks| hooks.classify(&hit)) {
            match kind {
                HookKind::ForcedRestart | HookKind::CrashLanding => {
                    log::info!("calculator left the program ({:?})", kind);
                    self.events.emit(DebuggerEvent::Closed);
                }
                HookKind::HeapInsert => {
                    let regs = emulator.registers();
                    self.allocations.insert(regs.de, regs.hl);
                    emulator.step();
                    emulator.set_running(true);
                }
                HookKind::HeapDelete => {
                    let regs = emulator.registers();
                    self.allocations.remove(regs.hl, regs.de);
                    emulator.step();
                    emulator.set_running(true);
                }
            }
            return Ok(());
        }

        if let Some(transient) = self.transient {
            if transient.native.handle == hit.handle {
                self.transient = None;
                return self.finish_transient(transient);
            }
        }

        let address = hit.address;
        let page = self.paging.relative_page(emulator, address);
        let regs = emulator.registers();
        let stop = match self.breakpoints.find_hit(address, page, is_ram_address(address)) {
            Some(bp) => bp.register_hit(&regs),
            None => {
                log::warn!("stale breakpoint hit at {:04x} page {:02x}", address, page);
                emulator.set_running(true);
                return Ok(());
            }
        };
        if !stop {
            emulator.set_running(true);
            return Ok(());
        }

        emulator.set_running(false);
        let is_ram = !hit.page.is_flash();
        let location = self
            .symbols
            .file_location(page, address, is_ram)
            .ok_or(DebuggerError::Unresolved {
                page,
                address,
                is_ram,
            })?;
        self.cancel_transient();
        self.stopped(location.clone());
        self.events.emit(DebuggerEvent::RunningChanged {
            location: Some(location),
            running: false,
        });
        Ok(())
    }

    /// Move PC to the code for `(file, line)`.
    pub fn set_pc_to_select(&mut self, file: &Path, line: usize) -> Result<()> {
        let emulator = match self.emulator.as_mut() {
            Some(emulator) => emulator,
            None => return Ok(()),
        };
        let location = self
            .symbols
            .calc_location(file, line)
            .ok_or_else(|| DebuggerError::NoCode {
                file: file.to_path_buf(),
                line,
            })?;

        emulator.set_pc(location.address);
        if self.paging.is_app() {
            let page = self.paging.app_page().wrapping_sub(location.page);
            emulator.set_bank(1, PhysicalPage::flash(page));
        } else {
            emulator.set_bank(2, PhysicalPage::ram(1));
        }
        self.location = Some(DocumentLocation::new(file, line));
        Ok(())
    }

    /// Source location for an address under the live mapping.
    pub fn goto_address(&self, address: u16) -> Option<DocumentLocation> {
        let page = self.relative_page(address)?;
        self.symbols
            .file_location(page, address, is_ram_address(address))
    }

    /// Find the app built into `app_file` on the calculator and remember its page.
    pub fn verify_app(&mut self, app_file: &Path) -> Result<Application> {
        let apps = self.emulator.as_ref().map(|e| e.apps()).unwrap_or_default();
        if apps.is_empty() {
            return Err(DebuggerError::AppNotFound(app_file.display().to_string()));
        }

        let name = read_app_name(app_file)?;
        let app = apps
            .into_iter()
            .find(|app| app.name.trim_end_matches(|c: char| c == '\0' || c == ' ') == name)
            .ok_or(DebuggerError::AppNotFound(name))?;

        log::info!("app {} found on page {:02x}", app.name, app.page);
        self.paging.set_app_page(app.page);
        Ok(app)
    }

    /// Start an installed app by running a small stub from RAM.
    pub fn launch_app(&mut self, name: &str) {
        let emulator = match self.emulator.as_mut() {
            Some(emulator) => emulator,
            None => return,
        };

        log::info!("launching {}", name);
        emulator.set_running(false);
        emulator.write(true, 1, PROG_TO_EDIT, name.as_bytes());
        emulator.write(true, 1, RAM_CODE, &LAUNCH_APP_CODE);
        emulator.set_halted(false);
        emulator.set_pc(RAM_CODE);
        emulator.set_running(true);
    }

    /// Restart the OS. Blocks for the power-on key sequence.
    pub fn reset_rom(&mut self) -> Result<()> {
        let emulator = match self.emulator.as_mut() {
            Some(emulator) => emulator,
            None => return Ok(()),
        };

        log::info!("resetting rom");
        if let Some(hooks) = self.hooks.take() {
            hooks.remove(emulator);
        }
        emulator.set_pc(0x0000);
        thread::sleep(self.config.reset_power_delay());
        emulator.press_key(CalcKey::On);
        thread::sleep(self.config.reset_key_hold());
        emulator.release_key(CalcKey::On);
        self.hooks = Some(InternalBreakpoints::install(emulator)?);
        Ok(())
    }

    /// Source location of PC, if it has one.
    pub(super) fn resolve_pc(&self) -> Option<DocumentLocation> {
        let emulator = self.emulator.as_ref()?;
        let pc = emulator.registers().pc;
        let page = self.paging.relative_page(emulator, pc);
        self.symbols.file_location(page, pc, is_ram_address(pc))
    }

    /// Record a stop: rebuild the stacks and remember the location.
    pub(super) fn stopped(&mut self, location: DocumentLocation) {
        self.refresh_stack();
        self.location = Some(location);
    }

    pub fn refresh_stack(&mut self) {
        let emulator = match self.emulator.as_ref() {
            Some(emulator) => emulator,
            None => return,
        };

        let sp = emulator.registers().sp;
        let top = if self.paging.is_app() {
            APP_STACK_TOP
        } else {
            PROGRAM_STACK_TOP
        };
        let machine = MachineStack::capture(emulator, sp, top);
        let view = SessionView {
            emulator,
            paging: self.paging,
            symbols: &self.symbols,
            reader: &self.reader,
        };
        let calls = self.walker.call_stack(&machine, &view);
        log::debug!(
            "stack refreshed: {} words, {} calls",
            machine.len(),
            calls.len()
        );
        self.stack = Arc::new(StackSnapshot { machine, calls });
    }
}
