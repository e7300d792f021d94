use super::context::DebugContext;
use super::events::DebuggerEvent;
use super::paging::is_ram_address;
use super::session::{Emulator, NativeBreakpoint};
use crate::error::{DebuggerError, Result};
use crate::parser::is_control_transfer;
use crate::symbols::{DocumentLocation, LineReader, SymbolService};

/// What a transient breakpoint is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    StepOver,
    StepOut,
}

/// A one-shot breakpoint placed by step-over or step-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransientBreakpoint {
    pub mode: StepMode,
    pub native: NativeBreakpoint,
}

impl<E: Emulator, S: SymbolService, R: LineReader> DebugContext<E, S, R> {
    pub fn transient_breakpoint(&self) -> Option<&TransientBreakpoint> {
        self.transient.as_ref()
    }

    /// Resume execution.
    pub fn run(&mut self) {
        let emulator = match self.emulator.as_mut() {
            Some(emulator) => emulator,
            None => return,
        };

        // get off the current breakpoint before letting it run
        emulator.step();
        emulator.set_running(true);
        self.location = None;
        self.events.emit(DebuggerEvent::RunningChanged {
            location: None,
            running: true,
        });
    }

    /// Stop, then single-step until PC lands on a source line.
    pub fn pause(&mut self) -> Result<()> {
        match self.emulator.as_mut() {
            Some(emulator) => emulator.set_running(false),
            None => return Ok(()),
        }

        let limit = self.config.pause_step_limit;
        let mut steps = 0;
        let location = loop {
            if let Some(location) = self.resolve_pc() {
                break location;
            }
            if steps >= limit {
                log::warn!("no source line within {} instructions", steps);
                return Err(DebuggerError::PauseExhausted { steps });
            }
            self.single_step();
            steps += 1;
        };

        self.cancel_transient();
        self.stopped(location.clone());
        self.events.emit(DebuggerEvent::RunningChanged {
            location: Some(location),
            running: false,
        });
        Ok(())
    }

    /// Step until PC is on a source line with a different line number.
    pub fn step(&mut self) -> Result<()> {
        if self.emulator.is_none() {
            return Ok(());
        }

        let start = self.resolve_pc().map(|location| location.line);
        let location = loop {
            self.single_step();
            match self.resolve_pc() {
                Some(location) if Some(location.line) != start => break location,
                _ => continue,
            }
        };

        self.stopped(location.clone());
        self.events.emit(DebuggerEvent::Step { location });
        Ok(())
    }

    /// Run to the next source line, treating calls as single steps.
    /// Lines that can jump fall back to a plain step.
    pub fn step_over(&mut self) -> Result<()> {
        let pc = match self.emulator.as_ref() {
            Some(emulator) => emulator.registers().pc,
            None => return Ok(()),
        };

        let location = self.resolve_pc().ok_or_else(|| self.unresolved(pc))?;
        let text = self
            .reader
            .line(&location.file, location.line)
            .ok_or_else(|| DebuggerError::SourceUnavailable {
                file: location.file.clone(),
                line: location.line,
            })?;
        if is_control_transfer(&text) {
            return self.step();
        }

        let mut address = pc;
        let target = loop {
            if address == u16::MAX {
                return Err(self.unresolved(pc));
            }
            address += 1;
            let page = self.relative_page(address).unwrap_or_default();
            if self
                .symbols
                .file_location(page, address, is_ram_address(address))
                .is_some()
            {
                break address;
            }
        };

        self.start_transient(StepMode::StepOver, target, is_ram_address(target));
        Ok(())
    }

    /// Run until the innermost caller's call instruction returns.
    pub fn step_out(&mut self) -> Result<()> {
        if self.emulator.is_none() {
            return Ok(());
        }

        let frame = self
            .stack
            .calls
            .innermost()
            .cloned()
            .ok_or(DebuggerError::EmptyCallStack)?;
        let call = self
            .symbols
            .calc_location(&frame.location.file, frame.location.line)
            .ok_or_else(|| DebuggerError::NoCode {
                file: frame.location.file.clone(),
                line: frame.location.line,
            })?;

        let mut address = call.address;
        let target = loop {
            if address == u16::MAX {
                return Err(DebuggerError::Unresolved {
                    page: call.page,
                    address: call.address,
                    is_ram: call.is_ram,
                });
            }
            address += 1;
            if self
                .symbols
                .file_location(call.page, address, call.is_ram)
                .is_some()
            {
                break address;
            }
        };

        log::debug!("stepping out of {} to {:04x}", frame.callee, target);
        self.start_transient(StepMode::StepOut, target, call.is_ram);
        Ok(())
    }

    /// The transient breakpoint fired.
    pub(super) fn finish_transient(&mut self, transient: TransientBreakpoint) -> Result<()> {
        if let Some(emulator) = self.emulator.as_mut() {
            emulator.clear_breakpoint(&transient.native);
            emulator.set_running(false);
        }

        let page = self.paging.relative(transient.native.page);
        let is_ram = !transient.native.page.is_flash();
        let address = transient.native.address;
        let location = self
            .symbols
            .file_location(page, address, is_ram)
            .ok_or(DebuggerError::Unresolved {
                page,
                address,
                is_ram,
            })?;

        log::debug!("{:?} finished at {}", transient.mode, location);
        self.stopped(location.clone());
        self.events.emit(DebuggerEvent::Step { location });
        Ok(())
    }

    /// Drop a pending step-over or step-out.
    pub(super) fn cancel_transient(&mut self) {
        if let Some(transient) = self.transient.take() {
            if let Some(emulator) = self.emulator.as_mut() {
                emulator.clear_breakpoint(&transient.native);
            }
        }
    }

    fn start_transient(&mut self, mode: StepMode, address: u16, is_ram: bool) {
        self.cancel_transient();
        let emulator = match self.emulator.as_mut() {
            Some(emulator) => emulator,
            None => return,
        };

        let page = self.paging.absolute_page(emulator, address);
        let native = emulator.set_breakpoint(is_ram, page, address);
        self.transient = Some(TransientBreakpoint { mode, native });
        emulator.step();
        emulator.set_running(true);
        self.location = None;
    }

    fn single_step(&mut self) {
        if let Some(emulator) = self.emulator.as_mut() {
            emulator.step();
        }
    }

    fn unresolved(&self, address: u16) -> DebuggerError {
        DebuggerError::Unresolved {
            page: self.relative_page(address).unwrap_or_default(),
            address,
            is_ram: is_ram_address(address),
        }
    }
}

/// Where a step would stop, if anywhere.
pub fn describe_stop(location: Option<&DocumentLocation>) -> String {
    match location {
        Some(location) => location.to_string(),
        None => "<no source>".to_string(),
    }
}
