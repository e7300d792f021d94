//! Machine stack snapshots and best-effort call stack reconstruction.
//!
//! There is no frame metadata on this platform. A stack slot counts as a
//! return address when the source line just before the address it points to
//! is a call instruction. Data that happens to look like a return address is
//! reported; return addresses whose call line doesn't parse are skipped.

use super::paging::is_ram_address;
use super::session::Emulator;
use crate::parser::{match_call, CallSite};
use crate::symbols::DocumentLocation;

/// Highest stack address for programs.
pub const PROGRAM_STACK_TOP: u16 = 0xFFFF;
/// Apps leave the top 32 bytes to the OS.
pub const APP_STACK_TOP: u16 = 0xFFDF;

pub const APP_CODE_START: u16 = 0x4000;
pub const APP_CODE_END: u16 = 0x8000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEntry {
    pub address: u16,
    pub value: u16,
}

/// Words on the stack from SP (first) up to the top of the stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineStack {
    entries: Vec<StackEntry>,
}

impl MachineStack {
    /// Read every whole word between `sp` and `top` inclusive.
    pub fn capture<E: Emulator + ?Sized>(emulator: &E, sp: u16, top: u16) -> Self {
        let mut entries = Vec::new();
        let mut address = sp as u32;
        while address < top as u32 {
            entries.push(StackEntry {
                address: address as u16,
                value: emulator.read_word(address as u16),
            });
            address += 2;
        }
        Self { entries }
    }

    pub fn from_entries(entries: Vec<StackEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    /// Where on the stack the return address sits.
    pub stack_address: u16,
    /// "command condition", e.g. `call nz`.
    pub call_type: String,
    pub callee: String,
    /// The line holding the call instruction.
    pub location: DocumentLocation,
}

/// Callers, innermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallStack {
    frames: Vec<CallFrame>,
}

impl CallStack {
    pub fn frames(&self) -> &[CallFrame] {
        &self.frames
    }

    pub fn innermost(&self) -> Option<&CallFrame> {
        self.frames.first()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<CallFrame> for CallStack {
    fn from_iter<I: IntoIterator<Item = CallFrame>>(iter: I) -> Self {
        Self {
            frames: iter.into_iter().collect(),
        }
    }
}

/// Both stacks as of one stop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackSnapshot {
    pub machine: MachineStack,
    pub calls: CallStack,
}

/// What a stack walker may ask about the code under the live mapping.
pub trait CodeView {
    fn is_app(&self) -> bool;
    fn relative_page(&self, address: u16) -> u8;
    fn file_location(&self, page: u8, address: u16, is_ram: bool) -> Option<DocumentLocation>;
    fn source_line(&self, location: &DocumentLocation) -> Option<String>;
}

pub trait StackWalker {
    fn call_stack(&self, stack: &MachineStack, code: &dyn CodeView) -> CallStack;
}

/// Finds return addresses by reading the source line before each candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SourceStackWalker;

impl SourceStackWalker {
    fn return_site(&self, candidate: u16, code: &dyn CodeView) -> Option<(CallSite, DocumentLocation)> {
        if code.is_app() && !(APP_CODE_START..APP_CODE_END).contains(&candidate) {
            return None;
        }

        // the return address points past the call, so back up to the line holding it
        let page = code.relative_page(candidate);
        let mut address = candidate;
        let location = loop {
            if address == 0 {
                return None;
            }
            address -= 1;
            if let Some(location) = code.file_location(page, address, is_ram_address(address)) {
                break location;
            }
        };

        let line = code.source_line(&location)?;
        let site = match_call(&line)?;
        Some((site, location))
    }
}

impl StackWalker for SourceStackWalker {
    fn call_stack(&self, stack: &MachineStack, code: &dyn CodeView) -> CallStack {
        stack
            .entries()
            .iter()
            .filter_map(|entry| {
                let (site, location) = self.return_site(entry.value, code)?;
                Some(CallFrame {
                    stack_address: entry.address,
                    call_type: site.call_type(),
                    callee: site.target,
                    location,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Listing {
        is_app: bool,
        lines: HashMap<u16, (usize, &'static str)>,
    }

    impl CodeView for Listing {
        fn is_app(&self) -> bool {
            self.is_app
        }

        fn relative_page(&self, _address: u16) -> u8 {
            0
        }

        fn file_location(&self, _page: u8, address: u16, _is_ram: bool) -> Option<DocumentLocation> {
            self.lines
                .get(&address)
                .map(|(line, _)| DocumentLocation::new("main.asm", *line))
        }

        fn source_line(&self, location: &DocumentLocation) -> Option<String> {
            self.lines
                .values()
                .find(|(line, _)| *line == location.line)
                .map(|(_, text)| text.to_string())
        }
    }

    fn listing(is_app: bool) -> Listing {
        let mut lines = HashMap::new();
        lines.insert(0x4000, (2, " call setup"));
        lines.insert(0x4003, (3, " ld a,5 ; after setup"));
        lines.insert(0x3000, (10, " call nz, low_routine"));
        lines.insert(0x9D95, (20, " bcall(_PutS)"));
        Listing { is_app, lines }
    }

    #[test]
    fn finds_the_call_before_a_return_address() {
        let stack = MachineStack::from_entries(vec![
            StackEntry { address: 0xFFF0, value: 0x1234 },
            StackEntry { address: 0xFFF2, value: 0x4003 },
        ]);
        let calls = SourceStackWalker.call_stack(&stack, &listing(true));
        assert_eq!(calls.len(), 1);
        let frame = calls.innermost().unwrap();
        assert_eq!(frame.stack_address, 0xFFF2);
        assert_eq!(frame.call_type, "call");
        assert_eq!(frame.callee, "setup");
        assert_eq!(frame.location.line, 2);
    }

    #[test]
    fn apps_only_return_into_their_code_window() {
        let stack = MachineStack::from_entries(vec![StackEntry { address: 0xFFF0, value: 0x3003 }]);
        assert!(SourceStackWalker.call_stack(&stack, &listing(true)).is_empty());

        let calls = SourceStackWalker.call_stack(&stack, &listing(false));
        assert_eq!(calls.frames()[0].call_type, "call nz");
        assert_eq!(calls.frames()[0].callee, "low_routine");
    }

    #[test]
    fn walking_back_stops_at_zero() {
        let stack = MachineStack::from_entries(vec![StackEntry { address: 0xFFF0, value: 0x0002 }]);
        assert!(SourceStackWalker.call_stack(&stack, &listing(false)).is_empty());
    }
}
