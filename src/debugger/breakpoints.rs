use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::conditions::BreakCondition;
use super::session::{NativeBreakpoint, Registers};
use crate::error::{DebuggerError, Result};
use crate::parser::parse_number;
use crate::symbols::{CalcLocation, DocumentLocation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitCountCondition {
    EqualTo,
    #[default]
    GreaterOrEqualTo,
    MultipleOf,
}

impl HitCountCondition {
    pub fn is_met(&self, hits: u32, threshold: u32) -> bool {
        match self {
            HitCountCondition::EqualTo => hits == threshold,
            HitCountCondition::GreaterOrEqualTo => hits >= threshold,
            HitCountCondition::MultipleOf => hits.checked_rem(threshold) == Some(0),
        }
    }

    /// Parse `5`, `=5`, `==5`, `>=5` or `%5`.
    pub fn parse(text: &str) -> Result<(HitCountCondition, u32)> {
        let trimmed = text.trim();
        let (condition, number) = if let Some(rest) = trimmed.strip_prefix(">=") {
            (HitCountCondition::GreaterOrEqualTo, rest)
        } else if let Some(rest) = trimmed.strip_prefix('%') {
            (HitCountCondition::MultipleOf, rest)
        } else if let Some(rest) = trimmed.strip_prefix("==") {
            (HitCountCondition::EqualTo, rest)
        } else if let Some(rest) = trimmed.strip_prefix('=') {
            (HitCountCondition::EqualTo, rest)
        } else {
            (HitCountCondition::EqualTo, trimmed)
        };

        let threshold = parse_number(number)
            .ok_or_else(|| DebuggerError::invalid_condition(text, "expected a hit count"))?;
        Ok((condition, threshold))
    }
}

fn enabled_by_default() -> bool {
    true
}

/// A user breakpoint. Its identity is the (file, line) it was set on; the
/// calculator location is filled in when it gets installed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub file: PathBuf,
    pub line: usize,
    #[serde(skip)]
    pub address: u16,
    #[serde(skip)]
    pub page: u8,
    #[serde(skip)]
    pub is_ram: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(skip)]
    pub hits: u32,
    #[serde(default)]
    pub hit_condition: HitCountCondition,
    #[serde(default)]
    pub hit_threshold: u32,
    #[serde(default)]
    pub conditions: Vec<BreakCondition>,
    #[serde(skip)]
    pub(crate) native: Option<NativeBreakpoint>,
}

impl Breakpoint {
    pub fn new<P: Into<PathBuf>>(file: P, line: usize) -> Self {
        Self {
            file: file.into(),
            line,
            address: 0,
            page: 0,
            is_ram: false,
            enabled: true,
            hits: 0,
            hit_condition: HitCountCondition::default(),
            hit_threshold: 0,
            conditions: Vec::new(),
            native: None,
        }
    }

    pub fn is_at(&self, file: &Path, line: usize) -> bool {
        self.line == line && self.file == file
    }

    pub fn is_installed(&self) -> bool {
        self.native.is_some()
    }

    pub fn native(&self) -> Option<&NativeBreakpoint> {
        self.native.as_ref()
    }

    pub fn location(&self) -> DocumentLocation {
        DocumentLocation::new(self.file.clone(), self.line)
    }

    pub(crate) fn resolved_to(&mut self, location: CalcLocation) {
        self.address = location.address;
        self.page = location.page;
        self.is_ram = location.is_ram;
    }

    /// Exact match against an installed calculator location.
    pub fn matches(&self, address: u16, page: u8, is_ram: bool) -> bool {
        self.is_installed() && self.address == address && self.page == page && self.is_ram == is_ram
    }

    /// Count a hit and decide whether execution should stop.
    pub fn register_hit(&mut self, regs: &Registers) -> bool {
        self.hits = self.hits.saturating_add(1);
        self.enabled
            && self.hit_condition.is_met(self.hits, self.hit_threshold)
            && self.conditions.iter().all(|c| c.evaluate(regs))
    }
}

#[derive(Debug, Default)]
pub struct Breakpoints {
    points: Vec<Breakpoint>,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    /// Add a breakpoint at (file, line), or return the one already there.
    pub fn add<P: Into<PathBuf>>(&mut self, file: P, line: usize) -> &mut Breakpoint {
        let file = file.into();
        let index = match self.position(&file, line) {
            Some(index) => index,
            None => {
                log::debug!("breakpoint added at {}:{}", file.display(), line);
                self.points.push(Breakpoint::new(file, line));
                self.points.len() - 1
            }
        };
        &mut self.points[index]
    }

    pub fn remove(&mut self, file: &Path, line: usize) -> Option<Breakpoint> {
        let index = self.position(file, line)?;
        log::debug!("breakpoint removed from {}:{}", file.display(), line);
        Some(self.points.remove(index))
    }

    pub fn get(&self, file: &Path, line: usize) -> Option<&Breakpoint> {
        self.points.iter().find(|bp| bp.is_at(file, line))
    }

    pub fn get_mut(&mut self, file: &Path, line: usize) -> Option<&mut Breakpoint> {
        self.points.iter_mut().find(|bp| bp.is_at(file, line))
    }

    pub fn contains(&self, file: &Path, line: usize) -> bool {
        self.position(file, line).is_some()
    }

    pub fn find_hit(&mut self, address: u16, page: u8, is_ram: bool) -> Option<&mut Breakpoint> {
        self.points
            .iter_mut()
            .find(|bp| bp.matches(address, page, is_ram))
    }

    /// Move a breakpoint's identity to another line, merging with any
    /// breakpoint already there.
    pub fn relocate(&mut self, file: &Path, line: usize, to: &DocumentLocation) {
        if let Some(mut moved) = self.remove(file, line) {
            if self.contains(&to.file, to.line) {
                return;
            }
            moved.file = to.file.clone();
            moved.line = to.line;
            self.points.push(moved);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.points.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Breakpoint> {
        self.points.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.points)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let points: Vec<Breakpoint> = serde_json::from_str(&contents)?;
        Ok(Self { points })
    }

    fn position(&self, file: &Path, line: usize) -> Option<usize> {
        self.points.iter().position(|bp| bp.is_at(file, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_to_fires_once() {
        let fired: Vec<u32> = (0..20)
            .filter(|&n| HitCountCondition::EqualTo.is_met(n, 7))
            .collect();
        assert_eq!(fired, vec![7]);
    }

    #[test]
    fn greater_or_equal_stays_on() {
        assert!(!HitCountCondition::GreaterOrEqualTo.is_met(2, 3));
        assert!((3..100).all(|n| HitCountCondition::GreaterOrEqualTo.is_met(n, 3)));
    }

    #[test]
    fn multiple_of() {
        let fired: Vec<u32> = (1..13)
            .filter(|&n| HitCountCondition::MultipleOf.is_met(n, 4))
            .collect();
        assert_eq!(fired, vec![4, 8, 12]);
        assert!(!HitCountCondition::MultipleOf.is_met(4, 0));
    }

    #[test]
    fn hit_condition_text() {
        assert_eq!(HitCountCondition::parse("5").unwrap(), (HitCountCondition::EqualTo, 5));
        assert_eq!(HitCountCondition::parse("== 5").unwrap(), (HitCountCondition::EqualTo, 5));
        assert_eq!(
            HitCountCondition::parse(">=3").unwrap(),
            (HitCountCondition::GreaterOrEqualTo, 3)
        );
        assert_eq!(HitCountCondition::parse("%$10").unwrap(), (HitCountCondition::MultipleOf, 16));
        assert!(HitCountCondition::parse("often").is_err());
    }

    #[test]
    fn disabled_breakpoints_count_but_never_stop() {
        let mut bp = Breakpoint::new("main.asm", 3);
        bp.enabled = false;
        assert!(!bp.register_hit(&Registers::default()));
        assert_eq!(bp.hits, 1);
    }

    #[test]
    fn conditions_are_anded() {
        let mut bp = Breakpoint::new("main.asm", 3);
        bp.conditions.push("a == 1".parse().unwrap());
        bp.conditions.push("hl == $8000".parse().unwrap());
        let mut regs = Registers {
            af: 0x0100,
            hl: 0x8000,
            ..Registers::default()
        };
        assert!(bp.register_hit(&regs));
        regs.hl = 0x8001;
        assert!(!bp.register_hit(&regs));
    }

    #[test]
    fn relocation_moves_identity() {
        let mut points = Breakpoints::new();
        points.add("main.asm", 4).hit_threshold = 2;
        points.relocate(Path::new("main.asm"), 4, &DocumentLocation::new("main.asm", 6));
        assert!(!points.contains(Path::new("main.asm"), 4));
        assert_eq!(points.get(Path::new("main.asm"), 6).unwrap().hit_threshold, 2);
        assert_eq!(points.len(), 1);
    }
}
