/// A call instruction recognised in a source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// The call mnemonic as written, e.g. `call` or `bcall`.
    pub command: String,
    /// Condition code (`z`, `nz`, `c`, `nc`), if any.
    pub condition: Option<String>,
    /// The call target; may be empty for forms like `bcall()`.
    pub target: String,
}

impl CallSite {
    /// "command condition", as shown in a call stack listing.
    pub fn call_type(&self) -> String {
        match &self.condition {
            Some(condition) => format!("{} {}", self.command, condition),
            None => self.command.clone(),
        }
    }
}
