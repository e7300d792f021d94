use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::protocol::{
    DapMessage, DapMessageContent, LaunchArguments, SetBreakpointsArguments, SourceBreakpoint,
    VariablesArguments,
};
use crate::debugger::{
    BreakCondition, DebugContext, DebuggerEvent, Emulator, HitCountCondition, Placement,
    SharedContext,
};
use crate::error::{DebuggerError, Result};
use crate::symbols::{DocumentLocation, LineReader, SymbolService};

const THREAD_ID: u64 = 1;
const REGISTERS_REF: u64 = 1;
const ALLOCATIONS_REF: u64 = 2;

/// Builds the emulator a `launch` request debugs.
pub type Launcher<E> = Box<dyn FnMut(&LaunchArguments) -> Result<E> + Send>;

/// Debug Adapter Protocol server over a shared debug context.
pub struct DapServer<E, S, R, I, O> {
    seq: u64,
    input: I,
    output: O,
    context: SharedContext<E, S, R>,
    launcher: Launcher<E>,
    events: Receiver<DebuggerEvent>,
    stop_reason: &'static str,
}

impl<E, S, R, I, O> DapServer<E, S, R, I, O>
where
    E: Emulator,
    S: SymbolService,
    R: LineReader,
    I: BufRead,
    O: Write,
{
    pub fn new(context: SharedContext<E, S, R>, launcher: Launcher<E>, input: I, output: O) -> Self {
        let events = lock(&context).subscribe();
        Self {
            seq: 0,
            input,
            output,
            context,
            launcher,
            events,
            stop_reason: "breakpoint",
        }
    }

    pub fn into_output(self) -> O {
        self.output
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    /// Serve requests until `disconnect` or end of input.
    pub fn run(&mut self) -> Result<()> {
        log::info!("DAP server starting");
        loop {
            self.forward_events(None)?;
            let msg = match self.read_message() {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(DebuggerError::Json(err)) => {
                    log::warn!("dropping malformed message: {}", err);
                    continue;
                }
                Err(err) => return Err(err),
            };

            match msg.content {
                DapMessageContent::Request { command, arguments } => {
                    log::debug!("request #{}: {}", msg.seq, command);
                    if !self.dispatch(msg.seq, command, arguments)? {
                        break;
                    }
                }
                _ => log::debug!("ignoring non-request message #{}", msg.seq),
            }
        }
        log::info!("DAP server exiting");
        Ok(())
    }

    /// Handle one request. Returns false once the client disconnects.
    pub fn dispatch(&mut self, seq: u64, command: String, arguments: Option<Value>) -> Result<bool> {
        let result = match command.as_str() {
            "initialize" => self.handle_initialize(seq, &command),
            "launch" => self.handle_launch(seq, &command, arguments),
            "setBreakpoints" => self.handle_set_breakpoints(seq, &command, arguments),
            "configurationDone" => self.send_response(seq, &command, None),
            "threads" => self.handle_threads(seq, &command),
            "stackTrace" => self.handle_stack_trace(seq, &command),
            "scopes" => self.handle_scopes(seq, &command),
            "variables" => self.handle_variables(seq, &command, arguments),
            "continue" => self.handle_resume(seq, &command, |ctx| {
                ctx.run();
                Ok(())
            }),
            "next" => self.handle_resume(seq, &command, |ctx| ctx.step_over()),
            "stepIn" => self.handle_resume(seq, &command, |ctx| ctx.step()),
            "stepOut" => self.handle_resume(seq, &command, |ctx| ctx.step_out()),
            "pause" => self.handle_pause(seq, &command),
            "disconnect" => {
                self.with_context(|ctx| ctx.cancel_debug());
                self.send_response(seq, &command, None)?;
                return Ok(false);
            }
            _ => {
                log::warn!("unhandled DAP command: {}", command);
                self.send_error_response(seq, &command, "unsupported request")
            }
        };

        match result {
            Ok(()) => Ok(true),
            // only transport failures end the session
            Err(DebuggerError::Io(err)) => Err(DebuggerError::Io(err)),
            Err(err) => {
                log::error!("{} failed: {}", command, err);
                self.send_error_response(seq, &command, &err.to_string())?;
                Ok(true)
            }
        }
    }

    pub fn send_response(&mut self, request_seq: u64, command: &str, body: Option<Value>) -> Result<()> {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "response".to_string(),
            content: DapMessageContent::Response {
                request_seq,
                success: true,
                command: command.to_string(),
                message: None,
                body,
            },
        };
        self.send_message(&msg)
    }

    fn send_error_response(&mut self, request_seq: u64, command: &str, message: &str) -> Result<()> {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "response".to_string(),
            content: DapMessageContent::Response {
                request_seq,
                success: false,
                command: command.to_string(),
                message: Some(message.to_string()),
                body: None,
            },
        };
        self.send_message(&msg)
    }

    pub fn send_event(&mut self, event: &str, body: Option<Value>) -> Result<()> {
        let msg = DapMessage {
            seq: self.next_seq(),
            msg_type: "event".to_string(),
            content: DapMessageContent::Event {
                event: event.to_string(),
                body,
            },
        };
        self.send_message(&msg)
    }

    fn send_message(&mut self, msg: &DapMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        write!(self.output, "Content-Length: {}\r\n\r\n{}", json.len(), json)?;
        self.output.flush()?;
        log::trace!("sent {} bytes", json.len());
        Ok(())
    }

    /// Read one Content-Length framed message. `None` at end of input.
    pub fn read_message(&mut self) -> Result<Option<DapMessage>> {
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some(len) = line.strip_prefix("Content-Length:") {
                content_length = len.trim().parse().unwrap_or(0);
            }
        }

        let mut buffer = vec![0u8; content_length];
        self.input.read_exact(&mut buffer)?;
        Ok(Some(serde_json::from_slice(&buffer)?))
    }

    fn handle_initialize(&mut self, seq: u64, command: &str) -> Result<()> {
        let body = json!({
            "supportsConfigurationDoneRequest": true,
            "supportsStepBack": false,
            "supportsFunctionBreakpoints": false,
            "supportsConditionalBreakpoints": true,
            "supportsHitConditionalBreakpoints": true,
            "supportsSetVariable": false,
        });
        self.send_response(seq, command, Some(body))?;
        self.send_event("initialized", None)
    }

    fn handle_launch(&mut self, seq: u64, command: &str, arguments: Option<Value>) -> Result<()> {
        let args: LaunchArguments = parse_arguments(arguments)?;
        log::info!(
            "launching {} (stop on entry: {})",
            args.program.display(),
            args.stop_on_entry
        );

        let emulator = (self.launcher)(&args)?;
        let moved = {
            let mut ctx = lock(&self.context);
            if let Some(config) = args.config.clone() {
                ctx.set_config(config);
            }
            ctx.init_debugger(emulator, &args.program)?;
            ctx.install_breakpoints()?
        };
        self.send_response(seq, command, None)?;
        for (from, to) in moved {
            self.send_breakpoint_moved(&from, &to)?;
        }

        if args.stop_on_entry {
            self.stop_reason = "entry";
            self.with_context(|ctx| ctx.pause())?;
        } else {
            self.with_context(|ctx| ctx.run());
        }
        self.forward_events(None)
    }

    fn handle_set_breakpoints(&mut self, seq: u64, command: &str, arguments: Option<Value>) -> Result<()> {
        let args: SetBreakpointsArguments = parse_arguments(arguments)?;
        let file = args.source.path;
        log::debug!("setting {} breakpoints in {}", args.breakpoints.len(), file.display());

        let mut verified = Vec::with_capacity(args.breakpoints.len());
        let mut ctx = lock(&self.context);
        let stale: Vec<usize> = ctx
            .breakpoints()
            .iter()
            .filter(|bp| bp.file == file)
            .map(|bp| bp.line)
            .filter(|line| !args.breakpoints.iter().any(|sbp| sbp.line == *line))
            .collect();
        for line in stale {
            ctx.remove_breakpoint(&file, line);
        }

        for requested in &args.breakpoints {
            verified.push(match place_breakpoint(&mut *ctx, &file, requested) {
                Ok((line, placement)) => json!({
                    "verified": !matches!(placement, Placement::Deferred),
                    "line": line,
                }),
                Err(err) => json!({
                    "verified": false,
                    "line": requested.line,
                    "message": err.to_string(),
                }),
            });
        }
        drop(ctx);

        self.send_response(seq, command, Some(json!({ "breakpoints": verified })))
    }

    fn handle_threads(&mut self, seq: u64, command: &str) -> Result<()> {
        self.send_response(
            seq,
            command,
            Some(json!({
                "threads": [
                    {
                        "id": THREAD_ID,
                        "name": "Calculator"
                    }
                ]
            })),
        )
    }

    fn handle_stack_trace(&mut self, seq: u64, command: &str) -> Result<()> {
        let frames: Vec<Value> = {
            let ctx = lock(&self.context);
            let current = ctx
                .current_location()
                .map(|location| stack_frame(0, "current", location));
            let callers = ctx.call_stack().frames().iter().enumerate().map(|(i, frame)| {
                let name = format!("{} {}", frame.call_type, frame.callee);
                stack_frame(i + 1, &name, &frame.location)
            });
            current.into_iter().chain(callers).collect()
        };

        self.send_response(
            seq,
            command,
            Some(json!({
                "stackFrames": frames,
                "totalFrames": frames.len()
            })),
        )
    }

    fn handle_scopes(&mut self, seq: u64, command: &str) -> Result<()> {
        self.send_response(
            seq,
            command,
            Some(json!({
                "scopes": [
                    {
                        "name": "Registers",
                        "variablesReference": REGISTERS_REF,
                        "expensive": false
                    },
                    {
                        "name": "Allocations",
                        "variablesReference": ALLOCATIONS_REF,
                        "expensive": false
                    }
                ]
            })),
        )
    }

    fn handle_variables(&mut self, seq: u64, command: &str, arguments: Option<Value>) -> Result<()> {
        let args: VariablesArguments = parse_arguments(arguments)?;
        let variables: Vec<Value> = {
            let ctx = lock(&self.context);
            match args.variables_reference {
                REGISTERS_REF => match ctx.emulator() {
                    Some(emulator) => {
                        let regs = emulator.registers();
                        [
                            ("af", regs.af),
                            ("bc", regs.bc),
                            ("de", regs.de),
                            ("hl", regs.hl),
                            ("ix", regs.ix),
                            ("iy", regs.iy),
                            ("sp", regs.sp),
                            ("pc", regs.pc),
                        ]
                        .iter()
                        .map(|(name, value)| variable(name, format!("${:04X}", value)))
                        .collect()
                    }
                    None => Vec::new(),
                },
                ALLOCATIONS_REF => ctx
                    .allocations()
                    .iter()
                    .map(|a| variable(&format!("${:04X}", a.handle), format!("{} bytes", a.size)))
                    .collect(),
                _ => Vec::new(),
            }
        };

        self.send_response(seq, command, Some(json!({ "variables": variables })))
    }

    fn handle_resume<F>(&mut self, seq: u64, command: &str, action: F) -> Result<()>
    where
        F: FnOnce(&mut DebugContext<E, S, R>) -> Result<()>,
    {
        self.stop_reason = "breakpoint";
        self.with_context(action)?;
        let body = (command == "continue").then(|| json!({ "allThreadsContinued": true }));
        self.send_response(seq, command, body)?;
        let wait = self.with_context(|ctx| ctx.config().event_wait());
        self.forward_events(Some(wait))
    }

    fn handle_pause(&mut self, seq: u64, command: &str) -> Result<()> {
        self.stop_reason = "pause";
        self.with_context(|ctx| ctx.pause())?;
        self.send_response(seq, command, None)?;
        self.forward_events(None)
    }

    fn send_breakpoint_moved(&mut self, from: &DocumentLocation, to: &DocumentLocation) -> Result<()> {
        log::debug!("breakpoint {} moved to {}", from, to);
        self.send_event(
            "breakpoint",
            Some(json!({
                "reason": "changed",
                "breakpoint": {
                    "verified": true,
                    "line": to.line,
                    "source": { "path": to.file }
                }
            })),
        )
    }

    /// Translate engine events into DAP events. With `wait`, block up to
    /// that long for the first one.
    fn forward_events(&mut self, wait: Option<Duration>) -> Result<()> {
        if let Some(wait) = wait {
            match self.events.recv_timeout(wait) {
                Ok(event) => self.forward_event(event)?,
                Err(RecvTimeoutError::Timeout) => log::trace!("no stop within {:?}", wait),
                Err(RecvTimeoutError::Disconnected) => return Ok(()),
            }
        }
        while let Ok(event) = self.events.try_recv() {
            self.forward_event(event)?;
        }
        Ok(())
    }

    fn forward_event(&mut self, event: DebuggerEvent) -> Result<()> {
        match event {
            DebuggerEvent::Step { .. } => self.send_stopped("step"),
            DebuggerEvent::RunningChanged { running: false, .. } => {
                let reason = self.stop_reason;
                self.stop_reason = "breakpoint";
                self.send_stopped(reason)
            }
            DebuggerEvent::RunningChanged { running: true, .. } => self.send_event(
                "continued",
                Some(json!({
                    "threadId": THREAD_ID,
                    "allThreadsContinued": true
                })),
            ),
            DebuggerEvent::Closed => self.send_event("terminated", None),
        }
    }

    fn send_stopped(&mut self, reason: &str) -> Result<()> {
        self.send_event(
            "stopped",
            Some(json!({
                "reason": reason,
                "threadId": THREAD_ID,
                "allThreadsStopped": true
            })),
        )
    }

    fn with_context<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&mut DebugContext<E, S, R>) -> T,
    {
        f(&mut *lock(&self.context))
    }
}

fn lock<E, S, R>(context: &SharedContext<E, S, R>) -> MutexGuard<'_, DebugContext<E, S, R>> {
    context.lock().unwrap_or_else(PoisonError::into_inner)
}

fn parse_arguments<T: DeserializeOwned>(arguments: Option<Value>) -> Result<T> {
    Ok(serde_json::from_value(arguments.unwrap_or(Value::Null))?)
}

/// Install one requested breakpoint with its conditions. Returns the line it
/// ended up on.
fn place_breakpoint<E, S, R>(
    ctx: &mut DebugContext<E, S, R>,
    file: &Path,
    requested: &SourceBreakpoint,
) -> Result<(usize, Placement)>
where
    E: Emulator,
    S: SymbolService,
    R: LineReader,
{
    let conditions = match &requested.condition {
        Some(text) => text
            .split("&&")
            .map(|part| part.parse::<BreakCondition>())
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    let hit = match &requested.hit_condition {
        Some(text) => Some(HitCountCondition::parse(text)?),
        None => None,
    };

    let (file, line, placement) = match ctx.set_breakpoint(file, requested.line)? {
        Placement::Relocated(to) => {
            let placement = ctx.set_breakpoint(&to.file, to.line)?;
            (to.file, to.line, placement)
        }
        placement => (file.to_path_buf(), requested.line, placement),
    };

    if let Some(bp) = ctx.breakpoint_mut(&file, line) {
        bp.conditions = conditions;
        if let Some((condition, threshold)) = hit {
            bp.hit_condition = condition;
            bp.hit_threshold = threshold;
        }
    }
    Ok((line, placement))
}

fn stack_frame(id: usize, name: &str, location: &DocumentLocation) -> Value {
    json!({
        "id": id,
        "name": name,
        "line": location.line,
        "column": 1,
        "source": {
            "name": location.file.file_name().map(|n| n.to_string_lossy().into_owned()),
            "path": location.file
        }
    })
}

fn variable(name: &str, value: String) -> Value {
    json!({
        "name": name,
        "value": value,
        "variablesReference": 0
    })
}
