//! OS-level breakpoints the engine installs for its own bookkeeping.

use super::session::{CalcModel, Emulator, NativeBreakpoint};
use crate::error::{DebuggerError, Result};
use crate::symbols::CalcLocation;

/// `_JForceCmdNoChar`: the OS forcing its way back to the home screen.
pub const BCALL_JFORCE_CMD_NO_CHAR: u16 = 0x4027;
pub const BCALL_INSERT_MEM: u16 = 0x42F7;
pub const BCALL_DEL_MEM: u16 = 0x4357;

const HIGH_VECTOR_BIT: u16 = 1 << 15;
const LOW_VECTOR_BIT: u16 = 1 << 14;
const VECTOR_BASE: u16 = 0x4000;

/// Flash pages holding the bcall vector tables for one model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorPages {
    pub high: u8,
    pub low: u8,
}

const VECTOR_PAGES: &[(CalcModel, VectorPages)] = &[
    (CalcModel::Ti73, VectorPages { high: 0x1F, low: 0x1B }),
    (CalcModel::Ti83Plus, VectorPages { high: 0x1F, low: 0x1B }),
    (CalcModel::Ti83PlusSe, VectorPages { high: 0x7F, low: 0x7B }),
    (CalcModel::Ti84PlusSe, VectorPages { high: 0x7F, low: 0x7B }),
    (CalcModel::Ti84Plus, VectorPages { high: 0x3F, low: 0x3B }),
];

pub fn vector_pages(model: CalcModel) -> Result<VectorPages> {
    VECTOR_PAGES
        .iter()
        .find(|(m, _)| *m == model)
        .map(|(_, pages)| *pages)
        .ok_or(DebuggerError::UnsupportedModel(model))
}

/// Follow the OS's bcall vector to the routine's real location, the same
/// way the OS dispatches a bcall.
pub fn lookup_bcall<E: Emulator + ?Sized>(emulator: &E, bcall: u16) -> Result<CalcLocation> {
    let pages = vector_pages(emulator.model())?;
    let (page, offset) = if bcall & HIGH_VECTOR_BIT != 0 {
        (pages.high, bcall & !HIGH_VECTOR_BIT)
    } else if bcall & LOW_VECTOR_BIT != 0 {
        (pages.low, bcall & !LOW_VECTOR_BIT)
    } else {
        return Err(DebuggerError::LocalBcall(bcall));
    };

    let entry = offset.wrapping_add(VECTOR_BASE);
    let address = emulator.read_flash_word(page, entry);
    let real_page = emulator.read_flash_byte(page, entry.wrapping_add(2));
    Ok(CalcLocation::new(address, real_page, false))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    ForcedRestart,
    CrashLanding,
    HeapInsert,
    HeapDelete,
}

#[derive(Debug, Clone, Copy)]
pub struct InternalBreakpoints {
    forced_restart: NativeBreakpoint,
    crash_landing: NativeBreakpoint,
    heap_insert: NativeBreakpoint,
    heap_delete: NativeBreakpoint,
}

impl InternalBreakpoints {
    pub fn install<E: Emulator + ?Sized>(emulator: &mut E) -> Result<Self> {
        let jforce = lookup_bcall(emulator, BCALL_JFORCE_CMD_NO_CHAR)?;
        let insert = lookup_bcall(emulator, BCALL_INSERT_MEM)?;
        let delete = lookup_bcall(emulator, BCALL_DEL_MEM)?;

        let hooks = Self {
            forced_restart: emulator.set_breakpoint(jforce.is_ram, jforce.page, jforce.address),
            // where a crash most likely ends up
            crash_landing: emulator.set_breakpoint(false, 0, 0x0000),
            heap_insert: emulator.set_breakpoint(insert.is_ram, insert.page, insert.address),
            heap_delete: emulator.set_breakpoint(delete.is_ram, delete.page, delete.address),
        };
        log::debug!(
            "internal hooks: jforce {:04x}@{:02x} insertmem {:04x}@{:02x} delmem {:04x}@{:02x}",
            jforce.address,
            jforce.page,
            insert.address,
            insert.page,
            delete.address,
            delete.page
        );
        Ok(hooks)
    }

    pub fn remove<E: Emulator + ?Sized>(&self, emulator: &mut E) {
        for bp in self.all() {
            emulator.clear_breakpoint(&bp);
        }
    }

    pub fn classify(&self, hit: &NativeBreakpoint) -> Option<HookKind> {
        [
            (HookKind::ForcedRestart, &self.forced_restart),
            (HookKind::CrashLanding, &self.crash_landing),
            (HookKind::HeapInsert, &self.heap_insert),
            (HookKind::HeapDelete, &self.heap_delete),
        ]
        .into_iter()
        .find(|(_, bp)| bp.same_location(hit))
        .map(|(kind, _)| kind)
    }

    fn all(&self) -> [NativeBreakpoint; 4] {
        [
            self.forced_restart,
            self.crash_landing,
            self.heap_insert,
            self.heap_delete,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub handle: u16,
    pub size: u16,
}

/// Heap blocks seen going through `_InsertMem` and `_DelMem`.
#[derive(Debug, Clone, Default)]
pub struct MemoryAllocations {
    entries: Vec<Allocation>,
}

impl MemoryAllocations {
    pub fn insert(&mut self, handle: u16, size: u16) {
        self.entries.push(Allocation { handle, size });
    }

    pub fn remove(&mut self, handle: u16, size: u16) {
        self.entries
            .retain(|a| !(a.handle == handle && a.size == size));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Allocation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_families_share_vector_pages() {
        assert_eq!(vector_pages(CalcModel::Ti73).unwrap(), vector_pages(CalcModel::Ti83Plus).unwrap());
        assert_eq!(vector_pages(CalcModel::Ti84PlusSe).unwrap().high, 0x7F);
        assert_eq!(vector_pages(CalcModel::Ti84Plus).unwrap().low, 0x3B);
        assert!(matches!(
            vector_pages(CalcModel::Ti86),
            Err(DebuggerError::UnsupportedModel(CalcModel::Ti86))
        ));
    }

    #[test]
    fn allocations_match_on_handle_and_size() {
        let mut heap = MemoryAllocations::default();
        heap.insert(0x9D95, 10);
        heap.insert(0xA000, 4);
        heap.remove(0x9D95, 9);
        assert_eq!(heap.len(), 2);
        heap.remove(0x9D95, 10);
        assert_eq!(heap.iter().next(), Some(&Allocation { handle: 0xA000, size: 4 }));
    }
}
