//! Card abstraction.
//!
//! The benchmark talks to a card through two narrow traits: [`DmaChannel`]
//! for superpage flow control and [`Bar`] for register access. The only
//! implementation shipped here is the software emulator; real cards are
//! recognised on the command line but need a DMA driver this build lacks.

mod emulator;
mod lock;

pub use emulator::{EmulatedBar, EmulatedChannel, DEFAULT_CHANNEL_QUEUE_CAPACITY};
pub use lock::ChannelLock;

use crate::buffer::DmaBuffer;
use crate::error::{Error, Result};
use crate::pattern::{GeneratorPattern, ReadoutMode};
use crate::superpage::Superpage;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// BAR register index of the debug read/write register.
pub const DEBUG_READ_WRITE: usize = 0x4;

/// Card hardware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardFamily {
    /// Older readout card. Page header carries the event counter.
    Crorc,
    /// Newer readout unit. Strided counter-derived payload.
    Cru,
}

impl CardFamily {
    /// Whether the register stress task may run on this family.
    pub const fn supports_bar_hammer(self) -> bool {
        match self {
            CardFamily::Cru => true,
            CardFamily::Crorc => false,
        }
    }

    /// Display name.
    pub const fn as_str(self) -> &'static str {
        match self {
            CardFamily::Crorc => "C-RORC",
            CardFamily::Cru => "CRU",
        }
    }
}

impl fmt::Display for CardFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a card is addressed on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CardId {
    /// PCI address, `bus:device.function` (e.g. `42:00.0`).
    PciAddress(String),
    /// Card serial number.
    Serial(u32),
    /// Software emulator of the given family.
    Emulated(CardFamily),
}

impl CardId {
    /// Family, when it is known without opening the card.
    pub fn known_family(&self) -> Option<CardFamily> {
        match self {
            CardId::Emulated(family) => Some(*family),
            CardId::PciAddress(_) | CardId::Serial(_) => None,
        }
    }
}

fn is_pci_address(s: &str) -> bool {
    let Some((bus, rest)) = s.split_once(':') else {
        return false;
    };
    let Some((device, function)) = rest.split_once('.') else {
        return false;
    };
    let hex = |part: &str, max_len: usize| {
        !part.is_empty() && part.len() <= max_len && part.chars().all(|c| c.is_ascii_hexdigit())
    };
    hex(bus, 4) && hex(device, 2) && function.len() == 1 && function.chars().all(|c| c.is_digit(8))
}

impl FromStr for CardId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.trim();
        match id.to_ascii_lowercase().as_str() {
            "emu-cru" | "emulator" => return Ok(CardId::Emulated(CardFamily::Cru)),
            "emu-crorc" => return Ok(CardId::Emulated(CardFamily::Crorc)),
            _ => {}
        }
        if is_pci_address(id) {
            return Ok(CardId::PciAddress(id.to_string()));
        }
        id.parse::<u32>()
            .map(CardId::Serial)
            .map_err(|_| Error::Config(format!("unrecognised card id '{s}'")))
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardId::PciAddress(address) => f.write_str(address),
            CardId::Serial(serial) => write!(f, "{serial}"),
            CardId::Emulated(CardFamily::Cru) => f.write_str("emu-cru"),
            CardId::Emulated(CardFamily::Crorc) => f.write_str("emu-crorc"),
        }
    }
}

/// Register access through a PCI base address register.
pub trait Bar: Send + Sync {
    /// Read a 32-bit register.
    fn read_register(&self, index: usize) -> u32;

    /// Write a 32-bit register.
    fn write_register(&self, index: usize, value: u32);

    /// Replace `width` bits starting at `position` with the low bits of `value`.
    fn modify_register(&self, index: usize, position: u32, width: u32, value: u32) {
        let mask = match width {
            0 => return,
            32.. => u32::MAX,
            w => (1u32 << w) - 1,
        };
        let mask = mask.checked_shl(position).unwrap_or(0);
        let current = self.read_register(index);
        let shifted = value.checked_shl(position).unwrap_or(0);
        self.write_register(index, (current & !mask) | (shifted & mask));
    }

    /// Card temperature in degrees Celsius, if the card reports it.
    fn temperature(&self) -> Option<f32> {
        None
    }
}

/// One DMA channel of a card.
///
/// Superpages pushed with [`push_superpage`](DmaChannel::push_superpage)
/// are owned by the card until popped again. They complete in push order.
pub trait DmaChannel: Send {
    /// Family of the card this channel belongs to.
    fn card_family(&self) -> CardFamily;

    /// Start the DMA engine.
    fn start_dma(&mut self) -> Result<()>;

    /// Stop the DMA engine. Superpages still queued complete with whatever
    /// they received so far.
    fn stop_dma(&mut self) -> Result<()>;

    /// Reset the channel's data path. Only valid while DMA is stopped.
    fn reset_channel(&mut self) -> Result<()>;

    /// Let the card make progress on queued superpages.
    fn fill_superpages(&mut self);

    /// Free slots in the channel's superpage queue.
    fn superpage_queue_available(&self) -> usize;

    /// Superpages currently owned by the channel.
    fn superpage_queue_count(&self) -> usize;

    /// Peek the oldest queued superpage.
    fn superpage(&self) -> Option<Superpage>;

    /// Hand a superpage to the card.
    fn push_superpage(&mut self, superpage: Superpage) -> Result<()>;

    /// Take back the oldest superpage, if it is complete.
    fn pop_superpage(&mut self) -> Option<Superpage>;

    /// Register access for this card.
    fn bar(&self) -> Arc<dyn Bar>;
}

/// Parameters for opening a channel.
#[derive(Debug, Clone)]
pub struct ChannelParams {
    pub card_id: CardId,
    pub channel: u32,
    pub page_size: usize,
    pub pattern: GeneratorPattern,
    pub readout_mode: Option<ReadoutMode>,
    pub buffer: Arc<DmaBuffer>,
    /// Directory holding per-channel lock files.
    pub lock_dir: PathBuf,
}

/// Open a DMA channel with exclusive ownership.
pub fn open_channel(params: ChannelParams) -> Result<Box<dyn DmaChannel>> {
    match params.card_id {
        CardId::Emulated(family) => {
            let lock = ChannelLock::acquire(&params.lock_dir, &params.card_id, params.channel)?;
            if let Some(mode) = params.readout_mode {
                tracing::debug!(%mode, "readout mode");
            }
            tracing::info!(card = %params.card_id, channel = params.channel, "opened emulated channel");
            Ok(Box::new(
                EmulatedChannel::new(family, params.buffer, params.page_size, params.pattern)?
                    .with_lock(lock),
            ))
        }
        CardId::PciAddress(_) | CardId::Serial(_) => Err(Error::Capability(format!(
            "no DMA driver available for card {}; use emu-cru or emu-crorc",
            params.card_id
        ))),
    }
}
