//! Break conditions: boolean tests over the CPU registers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::session::Registers;
use crate::error::DebuggerError;
use crate::parser::parse_number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    A,
    F,
    B,
    C,
    D,
    E,
    H,
    L,
    AF,
    BC,
    DE,
    HL,
    IX,
    IY,
    SP,
    PC,
}

impl Register {
    pub fn from_name(name: &str) -> Option<Register> {
        let register = match name.to_ascii_lowercase().as_str() {
            "a" => Register::A,
            "f" => Register::F,
            "b" => Register::B,
            "c" => Register::C,
            "d" => Register::D,
            "e" => Register::E,
            "h" => Register::H,
            "l" => Register::L,
            "af" => Register::AF,
            "bc" => Register::BC,
            "de" => Register::DE,
            "hl" => Register::HL,
            "ix" => Register::IX,
            "iy" => Register::IY,
            "sp" => Register::SP,
            "pc" => Register::PC,
            _ => return None,
        };
        Some(register)
    }

    pub fn read(&self, regs: &Registers) -> u16 {
        match self {
            Register::A => regs.af >> 8,
            Register::F => regs.af & 0xFF,
            Register::B => regs.bc >> 8,
            Register::C => regs.bc & 0xFF,
            Register::D => regs.de >> 8,
            Register::E => regs.de & 0xFF,
            Register::H => regs.hl >> 8,
            Register::L => regs.hl & 0xFF,
            Register::AF => regs.af,
            Register::BC => regs.bc,
            Register::DE => regs.de,
            Register::HL => regs.hl,
            Register::IX => regs.ix,
            Register::IY => regs.iy,
            Register::SP => regs.sp,
            Register::PC => regs.pc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Register(Register),
    Value(u16),
}

impl Operand {
    fn parse(text: &str) -> Option<Operand> {
        if let Some(register) = Register::from_name(text) {
            return Some(Operand::Register(register));
        }
        parse_number(text)
            .and_then(|n| u16::try_from(n).ok())
            .map(Operand::Value)
    }

    fn value(&self, regs: &Registers) -> u16 {
        match self {
            Operand::Register(register) => register.read(regs),
            Operand::Value(value) => *value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    fn apply(&self, lhs: u16, rhs: u16) -> bool {
        match self {
            Comparison::Equal => lhs == rhs,
            Comparison::NotEqual => lhs != rhs,
            Comparison::Less => lhs < rhs,
            Comparison::LessOrEqual => lhs <= rhs,
            Comparison::Greater => lhs > rhs,
            Comparison::GreaterOrEqual => lhs >= rhs,
        }
    }
}

/// Flag tests, named after the Z80 condition codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTest {
    Zero,
    NotZero,
    Carry,
    NoCarry,
    ParityEven,
    ParityOdd,
    Positive,
    Minus,
}

impl FlagTest {
    const CARRY: u8 = 0x01;
    const PARITY: u8 = 0x04;
    const ZERO: u8 = 0x40;
    const SIGN: u8 = 0x80;

    fn from_name(name: &str) -> Option<FlagTest> {
        let flag = match name.to_ascii_lowercase().as_str() {
            "z" => FlagTest::Zero,
            "nz" => FlagTest::NotZero,
            "c" => FlagTest::Carry,
            "nc" => FlagTest::NoCarry,
            "pe" => FlagTest::ParityEven,
            "po" => FlagTest::ParityOdd,
            "p" => FlagTest::Positive,
            "m" => FlagTest::Minus,
            _ => return None,
        };
        Some(flag)
    }

    fn apply(&self, flags: u8) -> bool {
        match self {
            FlagTest::Zero => flags & Self::ZERO != 0,
            FlagTest::NotZero => flags & Self::ZERO == 0,
            FlagTest::Carry => flags & Self::CARRY != 0,
            FlagTest::NoCarry => flags & Self::CARRY == 0,
            FlagTest::ParityEven => flags & Self::PARITY != 0,
            FlagTest::ParityOdd => flags & Self::PARITY == 0,
            FlagTest::Positive => flags & Self::SIGN == 0,
            FlagTest::Minus => flags & Self::SIGN != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expr {
    Compare(Operand, Comparison, Operand),
    Flag(FlagTest),
}

/// A parsed break condition. Keeps its source text for display and
/// serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakCondition {
    text: String,
    expr: Expr,
}

impl BreakCondition {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn evaluate(&self, regs: &Registers) -> bool {
        match &self.expr {
            Expr::Compare(lhs, op, rhs) => op.apply(lhs.value(regs), rhs.value(regs)),
            Expr::Flag(flag) => flag.apply(regs.f()),
        }
    }
}

/// Find the comparison operator, longest spelling first.
fn split_comparison(text: &str) -> Option<(&str, Comparison, &str)> {
    const OPERATORS: [(&str, Comparison); 8] = [
        ("==", Comparison::Equal),
        ("!=", Comparison::NotEqual),
        ("<>", Comparison::NotEqual),
        ("<=", Comparison::LessOrEqual),
        (">=", Comparison::GreaterOrEqual),
        ("=", Comparison::Equal),
        ("<", Comparison::Less),
        (">", Comparison::Greater),
    ];

    let start = text.find(|c: char| matches!(c, '=' | '!' | '<' | '>'))?;
    let rest = &text[start..];
    OPERATORS
        .iter()
        .find(|(spelling, _)| rest.starts_with(spelling))
        .map(|(spelling, op)| (&text[..start], *op, &rest[spelling.len()..]))
}

impl FromStr for BreakCondition {
    type Err = DebuggerError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DebuggerError::invalid_condition(text, "empty condition"));
        }

        let expr = match split_comparison(trimmed) {
            Some((lhs, op, rhs)) => {
                let lhs = Operand::parse(lhs.trim()).ok_or_else(|| {
                    DebuggerError::invalid_condition(text, format!("bad operand {:?}", lhs.trim()))
                })?;
                let rhs = Operand::parse(rhs.trim()).ok_or_else(|| {
                    DebuggerError::invalid_condition(text, format!("bad operand {:?}", rhs.trim()))
                })?;
                Expr::Compare(lhs, op, rhs)
            }
            None => FlagTest::from_name(trimmed)
                .map(Expr::Flag)
                .ok_or_else(|| DebuggerError::invalid_condition(text, "expected a comparison or flag"))?,
        };

        Ok(BreakCondition {
            text: trimmed.to_string(),
            expr,
        })
    }
}

impl fmt::Display for BreakCondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl Serialize for BreakCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for BreakCondition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regs() -> Registers {
        Registers {
            af: 0x0541,
            bc: 0x1234,
            de: 0x0000,
            hl: 0x9D95,
            ix: 0,
            iy: 0x89F0,
            sp: 0xFFF0,
            pc: 0x4080,
        }
    }

    fn eval(text: &str) -> bool {
        text.parse::<BreakCondition>().unwrap().evaluate(&regs())
    }

    #[test]
    fn register_comparisons() {
        assert!(eval("a == 5"));
        assert!(eval("A=$05"));
        assert!(eval("hl >= $9D95"));
        assert!(eval("hl > 0x8000"));
        assert!(!eval("b != 12h"));
        assert!(eval("c <> b"));
        assert!(eval("de < 1"));
        assert!(eval("$4080 == pc"));
    }

    #[test]
    fn flag_tests() {
        assert!(eval("z"));
        assert!(eval("C"));
        assert!(!eval("nz"));
        assert!(eval("po"));
        assert!(eval("p"));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<BreakCondition>().is_err());
        assert!("q == 1".parse::<BreakCondition>().is_err());
        assert!("hl ==".parse::<BreakCondition>().is_err());
        assert!("hello".parse::<BreakCondition>().is_err());
    }

    #[test]
    fn serializes_as_text() {
        let condition: BreakCondition = " hl == $8000 ".parse().unwrap();
        let json = serde_json::to_string(&condition).unwrap();
        assert_eq!(json, "\"hl == $8000\"");
        let back: BreakCondition = serde_json::from_str(&json).unwrap();
        assert_eq!(back, condition);
    }
}
