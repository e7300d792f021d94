mod breakpoints;
mod conditions;
mod context;
mod events;
mod hooks;
mod paging;
mod session;
mod stack;
mod stepping;

pub use breakpoints::{Breakpoint, Breakpoints, HitCountCondition};
pub use conditions::{BreakCondition, Register};
pub use context::{DebugContext, Placement, SharedContext};
pub use events::{DebuggerEvent, EventBus};
pub use hooks::{
    lookup_bcall, vector_pages, Allocation, HookKind, InternalBreakpoints, MemoryAllocations,
    VectorPages, BCALL_DEL_MEM, BCALL_INSERT_MEM, BCALL_JFORCE_CMD_NO_CHAR,
};
pub use paging::{bank_of, is_ram_address, PageTranslator, BANK_SIZE, RAM_START};
pub use session::{
    Application, BreakpointHandle, CalcKey, CalcModel, Emulator, NativeBreakpoint, PageKind,
    PhysicalPage, Registers,
};
pub use stack::{
    CallFrame, CallStack, CodeView, MachineStack, SourceStackWalker, StackEntry, StackSnapshot,
    StackWalker, APP_CODE_END, APP_CODE_START, APP_STACK_TOP, PROGRAM_STACK_TOP,
};
pub use stepping::{describe_stop, StepMode, TransientBreakpoint};
