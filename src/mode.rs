//! Interceptor operating mode and its shared toggle.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// How intercepted requests are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Forward everything to the live network untouched
    Disabled,
    /// Serve from scenarios only; unmatched requests fail
    #[default]
    Enabled,
    /// Serve from scenarios, fall back to the live network
    Mixed,
    /// Always go live and persist the exchange
    Record,
}

impl Mode {
    fn as_u8(self) -> u8 {
        match self {
            Mode::Disabled => 0,
            Mode::Enabled => 1,
            Mode::Mixed => 2,
            Mode::Record => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Mode::Disabled,
            2 => Mode::Mixed,
            3 => Mode::Record,
            _ => Mode::Enabled,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Disabled => "disabled",
            Mode::Enabled => "enabled",
            Mode::Mixed => "mixed",
            Mode::Record => "record",
        };
        f.write_str(name)
    }
}

/// Process-wide mode holder.
///
/// Reads are never torn. A request already being dispatched keeps the mode it
/// read; later requests observe the new value.
#[derive(Debug)]
pub struct ModeSwitch {
    current: AtomicU8,
}

impl ModeSwitch {
    pub fn new(mode: Mode) -> Self {
        Self {
            current: AtomicU8::new(mode.as_u8()),
        }
    }

    pub fn get(&self) -> Mode {
        Mode::from_u8(self.current.load(Ordering::Acquire))
    }

    /// Replace the mode, returning the previous one.
    pub fn set(&self, mode: Mode) -> Mode {
        Mode::from_u8(self.current.swap(mode.as_u8(), Ordering::AcqRel))
    }
}

impl Default for ModeSwitch {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}
