use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;

use crate::debugger::{
    describe_stop, BreakCondition, DebugContext, DebuggerEvent, Emulator, HitCountCondition,
    Placement,
};
use crate::error::{DebuggerError, Result};
use crate::parser::{is_comment, parse_word};
use crate::symbols::{LineReader, SymbolService};

const HELP: &str = "Commands: (c)ontinue, (s)tep, (n)ext, (o)ut, (p)ause, (b)reak <file> <line> [if <cond>] [hit <count>], \
(d)elete <file> <line>, bt, ms, mem, (g)oto <addr>, pc <file> <line>, reset, verify <file>, launch <name>, \
save [file], load [file], (q)uit";

/// Whether the console should keep reading commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented command console over a debug context.
pub struct Console<W> {
    out: W,
    events: Receiver<DebuggerEvent>,
}

impl<W: Write> Console<W> {
    pub fn new<E, S, R>(ctx: &mut DebugContext<E, S, R>, out: W) -> Self
    where
        E: Emulator,
        S: SymbolService,
        R: LineReader,
    {
        Self {
            out,
            events: ctx.subscribe(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Read commands until `quit` or end of input.
    pub fn run<E, S, R, B>(&mut self, ctx: &mut DebugContext<E, S, R>, input: B) -> io::Result<()>
    where
        E: Emulator,
        S: SymbolService,
        R: LineReader,
        B: BufRead,
    {
        writeln!(self.out, "{}", HELP)?;
        for line in input.lines() {
            let line = line?;
            // command scripts may carry `;` comments
            if is_comment(&line) {
                continue;
            }
            if self.execute(ctx, &line)? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    /// Run one command line and report whatever events it produced.
    pub fn execute<E, S, R>(&mut self, ctx: &mut DebugContext<E, S, R>, line: &str) -> io::Result<Flow>
    where
        E: Emulator,
        S: SymbolService,
        R: LineReader,
    {
        let words: Vec<String> = match shlex::split(line) {
            Some(words) => words,
            None => {
                writeln!(self.out, "❌ Unbalanced quotes")?;
                return Ok(Flow::Continue);
            }
        };
        let (cmd, args) = match words.split_first() {
            Some((cmd, args)) => (cmd.as_str(), args),
            None => return Ok(Flow::Continue),
        };

        let result = match cmd {
            "c" | "continue" | "run" => {
                ctx.run();
                Ok(())
            }
            "s" | "step" => ctx.step(),
            "n" | "next" | "over" => ctx.step_over(),
            "o" | "out" => ctx.step_out(),
            "p" | "pause" => ctx.pause(),
            "b" | "break" => self.add_breakpoint(ctx, args),
            "d" | "delete" => match file_and_line(args) {
                Some((file, line)) => {
                    if ctx.remove_breakpoint(&file, line).is_none() {
                        writeln!(self.out, "❌ No breakpoint at {}:{}", file.display(), line)?;
                    }
                    Ok(())
                }
                None => self.usage("delete <file> <line>"),
            },
            "bt" | "stack" => self.print_call_stack(ctx),
            "ms" | "machine" => self.print_machine_stack(ctx),
            "mem" => self.print_allocations(ctx),
            "g" | "goto" => match args.first().and_then(|arg| parse_word(arg)) {
                Some(address) => {
                    let location = ctx.goto_address(address);
                    writeln!(self.out, "{:04x} -> {}", address, describe_stop(location.as_ref()))?;
                    Ok(())
                }
                None => self.usage("goto <addr>"),
            },
            "pc" => match file_and_line(args) {
                Some((file, line)) => ctx.set_pc_to_select(&file, line),
                None => self.usage("pc <file> <line>"),
            },
            "reset" => ctx.reset_rom(),
            "verify" => match args.first() {
                Some(file) => ctx.verify_app(Path::new(file)).and_then(|app| {
                    writeln!(self.out, "✅ {} on page {:02x}", app.name, app.page)?;
                    Ok(())
                }),
                None => self.usage("verify <file>"),
            },
            "launch" => match args.first() {
                Some(name) => {
                    ctx.launch_app(name);
                    Ok(())
                }
                None => self.usage("launch <name>"),
            },
            "save" => match breakpoints_path(ctx, args) {
                Some(path) => ctx.save_breakpoints(&path),
                None => self.usage("save <file>"),
            },
            "load" => match breakpoints_path(ctx, args) {
                Some(path) => ctx.load_breakpoints(&path).and_then(|moved| {
                    for (from, to) in moved {
                        writeln!(self.out, "↪️  {} moved to {}", from, to)?;
                    }
                    Ok(())
                }),
                None => self.usage("load <file>"),
            },
            "h" | "help" => {
                writeln!(self.out, "{}", HELP)?;
                Ok(())
            }
            "q" | "quit" => return Ok(Flow::Quit),
            _ => {
                log::warn!("unknown console command {:?}", cmd);
                writeln!(self.out, "❓ Unknown command: {}", cmd)?;
                Ok(())
            }
        };

        if let Err(err) = result {
            log::error!("{} failed: {}", cmd, err);
            writeln!(self.out, "❌ {}", err)?;
        }
        self.drain_events()?;
        Ok(Flow::Continue)
    }

    /// `break <file> <line> [if <cond>]... [hit <count>]`
    fn add_breakpoint<E, S, R>(&mut self, ctx: &mut DebugContext<E, S, R>, args: &[String]) -> Result<()>
    where
        E: Emulator,
        S: SymbolService,
        R: LineReader,
    {
        let (file, line) = match file_and_line(args) {
            Some(location) => location,
            None => return self.usage("break <file> <line> [if <cond>] [hit <count>]"),
        };

        let mut conditions = Vec::new();
        let mut hit = None;
        let mut rest = args[2..].iter().peekable();
        while let Some(word) = rest.next() {
            let mut text = Vec::new();
            while let Some(next) = rest.peek() {
                if next.as_str() == "if" || next.as_str() == "hit" {
                    break;
                }
                text.push(next.as_str());
                rest.next();
            }
            let text = text.join(" ");
            match word.as_str() {
                "if" => conditions.push(text.parse::<BreakCondition>()?),
                "hit" => hit = Some(HitCountCondition::parse(&text)?),
                other => return Err(DebuggerError::invalid_condition(other, "expected `if` or `hit`")),
            }
        }

        self.configure_and_install(ctx, &file, line, conditions, hit)
    }

    fn configure_and_install<E, S, R>(
        &mut self,
        ctx: &mut DebugContext<E, S, R>,
        file: &Path,
        line: usize,
        conditions: Vec<BreakCondition>,
        hit: Option<(HitCountCondition, u32)>,
    ) -> Result<()>
    where
        E: Emulator,
        S: SymbolService,
        R: LineReader,
    {
        // a relocated breakpoint lives under its new line
        let (file, line) = match ctx.set_breakpoint(file, line)? {
            Placement::Relocated(to) => {
                writeln!(self.out, "↪️  No code there, moved to {}", to)?;
                ctx.set_breakpoint(&to.file, to.line)?;
                (to.file, to.line)
            }
            placement => {
                self.report_placement(placement)?;
                (file.to_path_buf(), line)
            }
        };

        if let Some(bp) = ctx.breakpoint_mut(&file, line) {
            bp.conditions = conditions;
            if let Some((condition, threshold)) = hit {
                bp.hit_condition = condition;
                bp.hit_threshold = threshold;
            }
        }
        Ok(())
    }

    fn report_placement(&mut self, placement: Placement) -> Result<()> {
        match placement {
            Placement::Installed(location) => writeln!(
                self.out,
                "🔴 Breakpoint at {:04x} page {:02x}",
                location.address, location.page
            )?,
            Placement::Relocated(to) => writeln!(self.out, "↪️  No code there, moved to {}", to)?,
            Placement::Deferred => writeln!(self.out, "⏳ Breakpoint will be set when debugging starts")?,
        }
        Ok(())
    }

    fn print_call_stack<E, S, R>(&mut self, ctx: &DebugContext<E, S, R>) -> Result<()>
    where
        E: Emulator,
        S: SymbolService,
        R: LineReader,
    {
        let calls = ctx.call_stack();
        if calls.is_empty() {
            writeln!(self.out, "\n=== Call Stack: <empty> ===")?;
            return Ok(());
        }

        writeln!(self.out, "\n=== Call Stack ({} frames) ===", calls.len())?;
        for (i, frame) in calls.frames().iter().enumerate() {
            writeln!(
                self.out,
                "  #{}: {} {} at {} (sp {:04x})",
                i, frame.call_type, frame.callee, frame.location, frame.stack_address
            )?;
        }
        Ok(())
    }

    fn print_machine_stack<E, S, R>(&mut self, ctx: &DebugContext<E, S, R>) -> Result<()>
    where
        E: Emulator,
        S: SymbolService,
        R: LineReader,
    {
        writeln!(self.out, "\n=== Machine Stack ({} words) ===", ctx.machine_stack().len())?;
        for entry in ctx.machine_stack().entries() {
            writeln!(self.out, "  {:04x}: {:04x}", entry.address, entry.value)?;
        }
        Ok(())
    }

    fn print_allocations<E, S, R>(&mut self, ctx: &DebugContext<E, S, R>) -> Result<()>
    where
        E: Emulator,
        S: SymbolService,
        R: LineReader,
    {
        writeln!(self.out, "\n=== Allocations ({}) ===", ctx.allocations().len())?;
        for allocation in ctx.allocations().iter() {
            writeln!(self.out, "  {:04x}: {} bytes", allocation.handle, allocation.size)?;
        }
        Ok(())
    }

    fn usage(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "Usage: {}", text)?;
        Ok(())
    }

    fn drain_events(&mut self) -> io::Result<()> {
        while let Ok(event) = self.events.try_recv() {
            match event {
                DebuggerEvent::Step { location } => writeln!(self.out, "🔍 Stopped at {}", location)?,
                DebuggerEvent::RunningChanged {
                    location,
                    running: false,
                } => writeln!(self.out, "⏸  Paused at {}", describe_stop(location.as_ref()))?,
                DebuggerEvent::RunningChanged { running: true, .. } => {
                    writeln!(self.out, "▶️  Running...")?
                }
                DebuggerEvent::Closed => writeln!(self.out, "⏹  Debugging ended")?,
            }
        }
        Ok(())
    }
}

fn file_and_line(args: &[String]) -> Option<(PathBuf, usize)> {
    match args {
        [file, line, ..] => Some((PathBuf::from(file), line.parse().ok()?)),
        _ => None,
    }
}

fn breakpoints_path<E, S, R>(ctx: &DebugContext<E, S, R>, args: &[String]) -> Option<PathBuf>
where
    E: Emulator,
    S: SymbolService,
    R: LineReader,
{
    args.first()
        .map(PathBuf::from)
        .or_else(|| ctx.config().breakpoints_file.clone())
}
