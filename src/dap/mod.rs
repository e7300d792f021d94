mod protocol;
mod server;

use std::io;

pub use protocol::{
    DapMessage, DapMessageContent, LaunchArguments, SetBreakpointsArguments, Source,
    SourceBreakpoint, VariablesArguments,
};
pub use server::{DapServer, Launcher};

use crate::debugger::{Emulator, SharedContext};
use crate::error::Result;
use crate::symbols::{LineReader, SymbolService};

/// Serve the Debug Adapter Protocol over stdin and stdout.
pub fn run_dap_mode<E, S, R>(context: SharedContext<E, S, R>, launcher: Launcher<E>) -> Result<()>
where
    E: Emulator,
    S: SymbolService,
    R: LineReader,
{
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut server = DapServer::new(context, launcher, stdin.lock(), stdout.lock());
    server.run()
}
