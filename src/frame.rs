//! The 8-channel pulse-width array and its wire encoding
//!
//! Wire format: decimal microseconds, comma separated, newline terminated:
//!
//! ```text
//! 2000,1500,1500,1500,1500,1500,1500,1500\n
//! ```

use std::fmt;
use std::ops::Index;

/// Number of PPM output channels
pub const CHANNEL_COUNT: usize = 8;

/// Default idle pulse width (µs)
pub const NEUTRAL_US: u16 = 1500;

/// One complete set of channel outputs; index = channel number - 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelFrame([u16; CHANNEL_COUNT]);

impl ChannelFrame {
    /// Every channel at `neutral`
    pub fn neutral(neutral: u16) -> Self {
        Self([neutral; CHANNEL_COUNT])
    }

    pub fn values(&self) -> &[u16; CHANNEL_COUNT] {
        &self.0
    }

    pub fn set(&mut self, index: usize, us: u16) {
        self.0[index] = us;
    }

    /// Wire line including the trailing newline
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }
}

impl Default for ChannelFrame {
    fn default() -> Self {
        Self::neutral(NEUTRAL_US)
    }
}

impl Index<usize> for ChannelFrame {
    type Output = u16;

    fn index(&self, index: usize) -> &u16 {
        &self.0[index]
    }
}

impl fmt::Display for ChannelFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{v}")?;
        }
        Ok(())
    }
}
